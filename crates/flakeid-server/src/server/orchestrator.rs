//! HTTP client for `flakeid-orchestrator`.
//!
//! Every call gets a per-request timeout. Outcomes classified as
//! [`OrchestratorError::Unavailable`] are retried with exponential backoff up
//! to the configured number of attempts; rejections and lost leases are
//! returned at once.

use core::{future::Future, time::Duration};
use flakeid::{
    Lease, MachineId, Orchestrator, OrchestratorError, Registration,
    wire::{ErrorResponse, LEASES_PATH, LeaseResponse, RegisterRequest, RenewRequest},
};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

/// Delay before the second attempt; doubled for each one after.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32) -> Self {
        Self {
            attempts,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpOrchestrator {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpOrchestrator {
    /// Creates a client for the orchestrator at `base_url`
    /// (e.g. `http://orch:9568`).
    ///
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn lease_url(&self, machine_id: MachineId) -> String {
        format!("{}{LEASES_PATH}/{machine_id}", self.base_url)
    }

    /// Runs `call` until it succeeds, fails permanently, or the attempts run
    /// out.
    async fn with_retries<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, OrchestratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OrchestratorError>>,
    {
        let attempts = self.retry.attempts.max(1);
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;
        loop {
            match call().await {
                Err(err) if err.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        op,
                        attempt,
                        attempts,
                        ?backoff,
                        "orchestrator call failed, retrying: {err}"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

impl Orchestrator for HttpOrchestrator {
    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = Result<Lease, OrchestratorError>> + Send {
        let url = format!("{}{LEASES_PATH}", self.base_url);
        let body = RegisterRequest {
            instance: registration.instance.clone(),
            max_machine_id: registration.max_machine_id,
        };
        async move {
            let (http, url, body) = (&self.http, &url, &body);
            self.with_retries("register", move || async move {
                let resp = http.post(url).json(body).send().await;
                decode::<LeaseResponse>(resp, None).await.map(Lease::from)
            })
            .await
        }
    }

    fn renew(
        &self,
        registration: &Registration,
        machine_id: MachineId,
    ) -> impl Future<Output = Result<Lease, OrchestratorError>> + Send {
        let url = self.lease_url(machine_id);
        let body = RenewRequest {
            instance: registration.instance.clone(),
        };
        async move {
            let (http, url, body) = (&self.http, &url, &body);
            self.with_retries("renew", move || async move {
                let resp = http.put(url).json(body).send().await;
                decode::<LeaseResponse>(resp, Some(machine_id))
                    .await
                    .map(Lease::from)
            })
            .await
        }
    }

    fn release(
        &self,
        registration: &Registration,
        machine_id: MachineId,
    ) -> impl Future<Output = Result<(), OrchestratorError>> + Send {
        let url = self.lease_url(machine_id);
        let body = RenewRequest {
            instance: registration.instance.clone(),
        };
        async move {
            let (http, url, body) = (&self.http, &url, &body);
            self.with_retries("release", move || async move {
                let resp = http.delete(url).json(body).send().await;
                check(resp, Some(machine_id)).await.map(drop)
            })
            .await
        }
    }
}

/// Maps transport failures and non-success statuses to [`OrchestratorError`].
///
/// - transport errors and 5xx other than 503 are `Unavailable`
/// - 409 on a lease path is `LeaseLost`
/// - 503 (pool exhausted) and other 4xx are `Rejected`
async fn check(
    resp: reqwest::Result<Response>,
    machine_id: Option<MachineId>,
) -> Result<Response, OrchestratorError> {
    let resp = resp.map_err(|err| OrchestratorError::Unavailable {
        reason: err.to_string(),
    })?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if let (StatusCode::CONFLICT, Some(machine_id)) = (status, machine_id) {
        return Err(OrchestratorError::LeaseLost {
            machine_id: machine_id.get(),
        });
    }

    let reason = error_reason(resp).await;
    if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
        Err(OrchestratorError::Unavailable {
            reason: format!("{status}: {reason}"),
        })
    } else {
        Err(OrchestratorError::Rejected {
            status: status.as_u16(),
            reason,
        })
    }
}

async fn decode<T: DeserializeOwned>(
    resp: reqwest::Result<Response>,
    machine_id: Option<MachineId>,
) -> Result<T, OrchestratorError> {
    let resp = check(resp, machine_id).await?;
    let status = resp.status();
    resp.json::<T>()
        .await
        .map_err(|err| OrchestratorError::Rejected {
            status: status.as_u16(),
            reason: format!("malformed response body: {err}"),
        })
}

/// The `error` field of an [`ErrorResponse`] body, or the raw body text.
async fn error_reason(resp: Response) -> String {
    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => body.error,
        Err(_) if text.is_empty() => String::from("no response body"),
        Err(_) => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode as AxumStatus, routing::post};
    use flakeid::{InstanceName, LayoutParams};
    use flakeid_orchestrator::{
        allocator::LeaseTable,
        service::{AppState, router},
    };
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };
    use tokio::net::TcpListener;

    const FAST: RetryPolicy = RetryPolicy {
        attempts: 3,
        initial_backoff: Duration::from_millis(5),
    };

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    async fn live_orchestrator(pool_max: i64) -> String {
        let ttl = Duration::from_secs(30);
        serve(router(AppState::new(LeaseTable::new(pool_max, ttl, ttl)))).await
    }

    /// A server that answers every register call with `status`, counting hits.
    async fn fixed_status(status: AxumStatus) -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            LEASES_PATH,
            post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { (status, "boom") }
            }),
        );
        (serve(app).await, hits)
    }

    fn registration(pid: u32) -> Registration {
        Registration {
            instance: InstanceName::new("test", pid, 0),
            max_machine_id: 1023,
        }
    }

    fn machine_id(raw: i64) -> MachineId {
        let config = LayoutParams::default().validate(1_760_000_000_000).unwrap();
        MachineId::new(raw, &config).unwrap()
    }

    #[tokio::test]
    async fn register_renew_release_against_live_orchestrator() {
        let base = live_orchestrator(1023).await;
        let client = HttpOrchestrator::new(base, Duration::from_secs(2), FAST).unwrap();

        let first = client.register(&registration(1)).await.unwrap();
        assert_eq!(first.machine_id, 0);
        assert_eq!(first.ttl, Duration::from_secs(30));
        let second = client.register(&registration(2)).await.unwrap();
        assert_eq!(second.machine_id, 1);

        // Idempotent re-registration.
        let again = client.register(&registration(1)).await.unwrap();
        assert_eq!(again.machine_id, 0);

        let renewed = client.renew(&registration(1), machine_id(0)).await.unwrap();
        assert_eq!(renewed.machine_id, 0);

        assert_eq!(
            client.renew(&registration(2), machine_id(0)).await,
            Err(OrchestratorError::LeaseLost { machine_id: 0 })
        );

        client.release(&registration(1), machine_id(0)).await.unwrap();
        assert_eq!(
            client.renew(&registration(1), machine_id(0)).await,
            Err(OrchestratorError::LeaseLost { machine_id: 0 })
        );
        assert_eq!(
            client.release(&registration(1), machine_id(0)).await,
            Err(OrchestratorError::LeaseLost { machine_id: 0 })
        );
    }

    #[tokio::test]
    async fn exhausted_pool_is_rejected() {
        let base = live_orchestrator(0).await;
        let client = HttpOrchestrator::new(base, Duration::from_secs(2), FAST).unwrap();

        client.register(&registration(1)).await.unwrap();
        let err = client.register(&registration(2)).await.unwrap_err();
        let OrchestratorError::Rejected { status, reason } = err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(status, 503);
        assert!(reason.contains("no machine id available"), "{reason}");
    }

    #[tokio::test]
    async fn unreachable_orchestrator_is_unavailable() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            HttpOrchestrator::new(format!("http://{addr}"), Duration::from_millis(500), FAST)
                .unwrap();
        let err = client.register(&registration(1)).await.unwrap_err();
        assert!(
            matches!(err, OrchestratorError::Unavailable { .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn server_errors_are_retried_up_to_the_limit() {
        let (base, hits) = fixed_status(AxumStatus::INTERNAL_SERVER_ERROR).await;
        let client = HttpOrchestrator::new(base, Duration::from_secs(2), FAST).unwrap();

        let err = client.register(&registration(1)).await.unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Unavailable {
                reason: "500 Internal Server Error: boom".into()
            }
        );
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejections_are_not_retried() {
        let (base, hits) = fixed_status(AxumStatus::BAD_REQUEST).await;
        let client = HttpOrchestrator::new(base, Duration::from_secs(2), FAST).unwrap();

        let err = client.register(&registration(1)).await.unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Rejected {
                status: 400,
                reason: "boom".into()
            }
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
