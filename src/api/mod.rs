mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::contracts::TicketdError;

pub use handlers::{AppState, ErrorResponse, IntegerBody};

/// Creates the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/config", get(handlers::get_config))
        .route("/next", get(handlers::next_int))
        .route(
            "/last",
            get(handlers::last_int).post(handlers::set_last_int),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Reads `TICKETD_HOST` and `TICKETD_PORT`, falling back to defaults.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("TICKETD_HOST").unwrap_or(default.host),
            port: std::env::var("TICKETD_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(default.port),
        }
    }
}

/// Starts the HTTP server and runs until `shutdown` resolves.
pub async fn start_server<F>(
    config: ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), TicketdError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
