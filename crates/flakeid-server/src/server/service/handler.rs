//! `GET /generate` and `GET /healthz`.
//!
//! Generation may busy-wait on the clock (sequence exhaustion, regressions),
//! so it runs on the blocking pool rather than on a runtime worker.

use crate::server::config::IdFormat;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use flakeid::{GenerateError, SnowflakeGenerator, SnowflakeId, SystemClock, TimeSource, wire::ErrorResponse};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

/// Shared state handed to every request.
pub struct AppState<T: TimeSource = SystemClock> {
    generator: Arc<SnowflakeGenerator<T>>,
    id_format: IdFormat,
    shutdown: CancellationToken,
}

// Manual impl: `T` itself need not be `Clone`.
impl<T: TimeSource> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            id_format: self.id_format,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<T: TimeSource> AppState<T> {
    pub fn new(
        generator: Arc<SnowflakeGenerator<T>>,
        id_format: IdFormat,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            generator,
            id_format,
            shutdown,
        }
    }
}

/// Builds the public router.
///
/// Other methods on a known path get `405`, not `404`.
pub fn router<T>(state: AppState<T>) -> Router
where
    T: TimeSource + Send + Sync + 'static,
{
    Router::new()
        .route("/generate", get(generate::<T>))
        .route("/healthz", get(healthz))
        .layer(compression())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Brotli or gzip, as negotiated through `Accept-Encoding`. Bodies under the
/// layer's default size threshold are sent as is.
fn compression() -> CompressionLayer {
    CompressionLayer::new().br(true).gzip(true)
}

#[derive(Serialize)]
struct NumericId {
    id: SnowflakeId,
}

#[derive(Serialize)]
struct StringId {
    #[serde(with = "flakeid::as_string")]
    id: SnowflakeId,
}

enum ApiError {
    ShuttingDown,
    Generate(GenerateError),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                String::from("server is shutting down"),
            ),
            Self::Generate(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            Self::Internal(reason) => (StatusCode::INTERNAL_SERVER_ERROR, reason),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

async fn generate<T>(State(state): State<AppState<T>>) -> Result<Response, ApiError>
where
    T: TimeSource + Send + Sync + 'static,
{
    if state.shutdown.is_cancelled() {
        return Err(ApiError::ShuttingDown);
    }

    let generator = Arc::clone(&state.generator);
    let id = tokio::task::spawn_blocking(move || generator.generate_id())
        .await
        .map_err(|err| {
            tracing::error!("generation task failed: {err}");
            ApiError::Internal(String::from("id generation task failed"))
        })?
        .map_err(|err| {
            tracing::error!("failed to generate id: {err}");
            ApiError::Generate(err)
        })?;

    Ok(match state.id_format {
        IdFormat::Number => Json(NumericId { id }).into_response(),
        IdFormat::String => Json(StringId { id }).into_response(),
    })
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
