use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ticketd::api::{start_server, AppState, ServerConfig};
use ticketd::contracts::{Engine, TicketdError};
use ticketd::registry::EngineRegistry;

const DEFAULT_ENGINE_URI: &str = "rocksdb://./data";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ticketd=info".parse()?))
        .init();

    tracing::info!("ticketd starting...");

    let registry = EngineRegistry::with_defaults();
    let uri = std::env::var("TICKETD_ENGINE_URI").unwrap_or_else(|_| DEFAULT_ENGINE_URI.into());
    let engine = registry.lookup(&uri)?;
    apply_env_overrides(engine.as_ref())?;

    let config = engine.config();
    tracing::info!(
        key = %config.key(),
        offset = config.offset(),
        increment = config.increment(),
        "Engine ready"
    );

    let state = Arc::new(AppState::new(Arc::clone(&engine)));
    start_server(ServerConfig::from_env(), state, shutdown_signal()).await?;

    engine.close()?;
    tracing::info!("ticketd stopped");
    Ok(())
}

/// `TICKETD_KEY`, `TICKETD_OFFSET` and `TICKETD_INCREMENT` override the URI parameters.
fn apply_env_overrides(engine: &dyn Engine) -> Result<(), TicketdError> {
    if let Ok(key) = std::env::var("TICKETD_KEY") {
        engine.set_key(&key)?;
    }
    if let Some(increment) = int_env("TICKETD_INCREMENT")? {
        engine.set_increment(increment)?;
    }
    if let Some(offset) = int_env("TICKETD_OFFSET")? {
        engine.set_offset(offset)?;
    }
    engine.config().validate()?;
    Ok(())
}

fn int_env(name: &'static str) -> Result<Option<i64>, TicketdError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e: std::num::ParseIntError| TicketdError::InvalidEnv {
                name,
                reason: format!("{:?}: {}", value, e),
            }),
        Err(_) => Ok(None),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
