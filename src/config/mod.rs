//! Configuration management for the session engine.

use clap::Parser;
use std::time::Duration;

use crate::session::logging::LogLevel;
use crate::session::protocol::{ServerCapabilities, ServerInfo};
use crate::VERSION;

/// Command-line arguments for the session engine binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "session-engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bidirectional MCP session protocol engine over stdio")]
pub struct Args {
    /// Server name reported during the initialize handshake
    #[arg(long, default_value = "session-engine", env = "SESSION_ENGINE_NAME")]
    pub name: String,

    /// Deadline for server-initiated requests (milliseconds)
    #[arg(long, default_value = "30000", env = "SESSION_ENGINE_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Grace window before unmatched cancellation records are purged (milliseconds)
    #[arg(long, default_value = "5000", env = "SESSION_ENGINE_CANCELLATION_GRACE_MS")]
    pub cancellation_grace_ms: u64,

    /// Initial minimum severity for client log notifications
    #[arg(long, default_value = "info", value_parser = LogLevel::parse, env = "SESSION_ENGINE_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Enable debug logging on stderr
    #[arg(short, long, env = "SESSION_ENGINE_DEBUG")]
    pub debug: bool,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity reported during the initialize handshake
    pub server_info: ServerInfo,
    /// Capabilities advertised back to the client
    pub capabilities: ServerCapabilities,
    /// Deadline for server-initiated requests
    pub request_timeout: Duration,
    /// Grace window for unmatched cancellation records
    pub cancellation_grace: Duration,
    /// Initial minimum severity for client log notifications
    pub log_level: LogLevel,
    /// Debug mode
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_info: ServerInfo {
                name: "session-engine".to_string(),
                version: VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                logging: true,
                ..Default::default()
            },
            request_timeout: Duration::from_secs(30),
            cancellation_grace: Duration::from_secs(5),
            log_level: LogLevel::Info,
            debug: false,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            server_info: ServerInfo {
                name: args.name,
                version: VERSION.to_string(),
            },
            request_timeout: Duration::from_millis(args.request_timeout_ms),
            cancellation_grace: Duration::from_millis(args.cancellation_grace_ms),
            log_level: args.log_level,
            debug: args.debug,
            ..Default::default()
        }
    }
}
