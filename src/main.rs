//! Session engine binary.
//!
//! Serves the protocol engine over stdio with a pair of demo handlers,
//! enough to drive every engine feature end-to-end from a client.

use clap::Parser;
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use session_engine_rs::config::{Args, Config};
use session_engine_rs::error::Result;
use session_engine_rs::session::handler::{get_int_arg, get_string_arg, HandlerRegistry};
use session_engine_rs::session::{SessionEngine, StdioTransport};
use session_engine_rs::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging goes to stderr; stdout carries the wire.
    let default_directive = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config: Config = args.into();

    info!("Session engine v{}", VERSION);
    info!("Server name: {}", config.server_info.name);
    info!("Request timeout: {:?}", config.request_timeout);

    let mut registry = HandlerRegistry::new();
    register_demo_handlers(&mut registry);

    let engine = SessionEngine::new(registry, config);
    engine.run(StdioTransport::new()).await
}

/// Demo methods exercising the engine surface.
fn register_demo_handlers(registry: &mut HandlerRegistry) {
    // Echoes its params back verbatim.
    registry.register_fn("demo/echo", |ctx, params| async move {
        ctx.log().debug("echoing params");
        Ok(params.unwrap_or(Value::Null))
    });

    // Counts down `from` steps, reporting progress and honoring
    // cancellation between steps.
    registry.register_fn("demo/countdown", |ctx, params| async move {
        let from = get_int_arg(&params, "from")?;
        let delay_ms = get_int_arg(&params, "delayMs").unwrap_or(50) as u64;
        let label = get_string_arg(&params, "label").unwrap_or_else(|_| "countdown".to_string());

        let progress = ctx.progress(Some(from as f64));
        for step in 0..from {
            ctx.cancellation().skip_if_cancelled()?;
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            progress
                .advance(1.0, Some(&format!("{}: {}/{}", label, step + 1, from)))
                .await?;
        }
        progress.close().await;

        ctx.log().info(format!("{} finished", label));
        Ok(json!({"completed": from}))
    });
}
