use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::contracts::{Engine, EngineConfig, TicketError};
use crate::metrics::{MetricsRegistry, Operation};

/// Application state shared across handlers.
pub struct AppState {
    pub engine: Arc<dyn Engine>,
    pub metrics: Arc<MetricsRegistry>,
}

impl AppState {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }
}

/// Body carrying one integer, both ways.
#[derive(Debug, Serialize, Deserialize)]
pub struct IntegerBody {
    pub integer: i64,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// API error type.
pub struct ApiError(TicketError);

impl From<TicketError> for ApiError {
    fn from(e: TicketError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            TicketError::MonotonicityViolation { .. } => StatusCode::CONFLICT,
            TicketError::NotFound { .. } => StatusCode::NOT_FOUND,
            TicketError::Configuration { .. } => StatusCode::BAD_REQUEST,
            TicketError::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
            TicketError::SettingsRejected { .. }
            | TicketError::Write { .. }
            | TicketError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
            code: self.0.code().into(),
        };
        (status, Json(body)).into_response()
    }
}

fn elapsed_us(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

/// GET /next
/// Issues the next integer.
pub async fn next_int(State(state): State<Arc<AppState>>) -> Result<Json<IntegerBody>, ApiError> {
    let start = Instant::now();
    let integer = state.engine.next_int().map_err(|e| {
        tracing::warn!(error = %e, "Failed to issue integer");
        state.metrics.engine.record_error(Operation::NextInt, &e);
        ApiError::from(e)
    })?;
    state.metrics.engine.record_next_int(integer, elapsed_us(start));
    Ok(Json(IntegerBody { integer }))
}

/// GET /last
/// Largest integer issued so far.
pub async fn last_int(State(state): State<Arc<AppState>>) -> Result<Json<IntegerBody>, ApiError> {
    let start = Instant::now();
    let integer = state.engine.last_int().map_err(|e| {
        state.metrics.engine.record_error(Operation::LastInt, &e);
        ApiError::from(e)
    })?;
    state.metrics.engine.record_last_int(elapsed_us(start));
    Ok(Json(IntegerBody { integer }))
}

/// POST /last
/// Raises the floor of the sequence. Maintenance only.
pub async fn set_last_int(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IntegerBody>,
) -> Result<StatusCode, ApiError> {
    state.engine.set_last_int(request.integer).map_err(|e| {
        state.metrics.engine.record_error(Operation::SetLastInt, &e);
        ApiError::from(e)
    })?;
    state.metrics.engine.record_set_last_int();
    Ok(StatusCode::NO_CONTENT)
}

/// GET /config
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<EngineConfig> {
    Json(state.engine.config())
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy"
    }))
}

/// GET /metrics
/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.format_prometheus(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::StoreError;

    fn status_of(err: TicketError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn caller_mistakes_are_client_errors() {
        assert_eq!(
            status_of(TicketError::Configuration {
                namespace: "integers".into(),
                reason: "increment must be at least 1".into(),
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(TicketError::MonotonicityViolation {
                namespace: "integers".into(),
                requested: 1,
                last: 5,
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn store_refusing_settings_is_a_server_error() {
        assert_eq!(
            status_of(TicketError::SettingsRejected {
                namespace: "integers".into(),
                source: StoreError::Unavailable("variable is read only".into()),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(TicketError::Connection {
                namespace: "integers".into(),
                source: StoreError::Unavailable("connection refused".into()),
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
