//! HTTP surface of the lease allocator.
//!
//! See [`flakeid::wire`] for the request and response bodies. Every handler
//! takes the table lock for the duration of one table operation only.

use crate::allocator::{AllocError, LeaseTable};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use flakeid::wire::{
    ErrorResponse, LEASES_PATH, LeaseResponse, LeaseView, RegisterRequest, RenewRequest,
};
use parking_lot::Mutex;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared handle on the lease table.
#[derive(Clone)]
pub struct AppState {
    table: Arc<Mutex<LeaseTable>>,
}

impl AppState {
    pub fn new(table: LeaseTable) -> Self {
        Self {
            table: Arc::new(Mutex::new(table)),
        }
    }
}

/// Builds the orchestrator router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(LEASES_PATH, post(register).get(list))
        .route("/v1/leases/{machine_id}", put(renew).delete(release))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically drops leases whose quarantine has ended.
///
/// Registration reaps on demand as well; this task only keeps `GET
/// /v1/leases` and the logs current on an idle orchestrator.
pub async fn reap_expired(state: AppState, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let freed = state.table.lock().reap(Instant::now());
                if !freed.is_empty() {
                    tracing::info!(?freed, "machine ids returned to the pool");
                }
            }
        }
    }
}

#[derive(Debug)]
enum ApiError {
    Alloc(AllocError),
    Body(JsonRejection),
}

impl From<AllocError> for ApiError {
    fn from(err: AllocError) -> Self {
        Self::Alloc(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self::Body(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Alloc(AllocError::Exhausted { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Alloc(AllocError::LeaseLost { .. }) => StatusCode::CONFLICT,
            Self::Alloc(AllocError::InvalidRequest { .. }) | Self::Body(_) => {
                StatusCode::BAD_REQUEST
            }
        };
        let error = match self {
            Self::Alloc(err) => err.to_string(),
            Self::Body(err) => err.body_text(),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

fn lease_response(machine_id: i64, ttl: Duration) -> LeaseResponse {
    LeaseResponse {
        machine_id,
        ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
    }
}

async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LeaseResponse>), ApiError> {
    let Json(req) = body?;
    let grant = state
        .table
        .lock()
        .register(&req.instance, req.max_machine_id, Instant::now())
        .inspect_err(|err| tracing::warn!(instance = %req.instance, %err, "registration refused"))?;

    tracing::info!(
        instance = %req.instance,
        machine_id = grant.machine_id,
        "lease granted"
    );
    Ok((
        StatusCode::CREATED,
        Json(lease_response(grant.machine_id, grant.ttl)),
    ))
}

async fn renew(
    State(state): State<AppState>,
    Path(machine_id): Path<i64>,
    body: Result<Json<RenewRequest>, JsonRejection>,
) -> Result<Json<LeaseResponse>, ApiError> {
    let Json(req) = body?;
    let grant = state
        .table
        .lock()
        .renew(&req.instance, machine_id, Instant::now())
        .inspect_err(|_| tracing::warn!(instance = %req.instance, machine_id, "renewal for a lost lease"))?;

    tracing::debug!(instance = %req.instance, machine_id, "lease renewed");
    Ok(Json(lease_response(grant.machine_id, grant.ttl)))
}

async fn release(
    State(state): State<AppState>,
    Path(machine_id): Path<i64>,
    body: Result<Json<RenewRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    state.table.lock().release(&req.instance, machine_id)?;
    tracing::info!(instance = %req.instance, machine_id, "lease released");
    Ok(StatusCode::NO_CONTENT)
}

async fn list(State(state): State<AppState>) -> Json<Vec<LeaseView>> {
    let leases = state
        .table
        .lock()
        .live(Instant::now())
        .into_iter()
        .map(|lease| LeaseView {
            machine_id: lease.machine_id,
            instance: lease.instance,
            expires_in_ms: u64::try_from(lease.expires_in.as_millis()).unwrap_or(u64::MAX),
        })
        .collect();
    Json(leases)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
