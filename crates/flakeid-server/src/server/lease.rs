//! Keeps an orchestrator lease alive while the server runs.
//!
//! The keeper renews every `ttl / 3`. It stops the server by cancelling the
//! shared [`CancellationToken`] when the orchestrator says the lease is gone,
//! or when no renewal has succeeded for a full ttl: past that point the
//! orchestrator may already have quarantined the id, and generating under it
//! could collide with the next holder once the quarantine ends.

use core::time::Duration;
use flakeid::{Lease, MachineId, Orchestrator, OrchestratorError, Registration};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;

/// Lower bound on the renewal period, for very short ttls.
const MIN_RENEW_PERIOD: Duration = Duration::from_millis(10);

/// Why [`keep_lease`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeeperExit {
    /// Shutdown was requested and the lease handed back (or left to expire
    /// if the release failed).
    Released,
    /// The orchestrator no longer recognizes the lease.
    Lost,
    /// No renewal succeeded within the lease ttl.
    Expired,
}

/// Renews `lease` until `shutdown` is cancelled, then releases it.
///
/// Cancels `shutdown` itself when the lease is lost or expires.
pub async fn keep_lease<O: Orchestrator>(
    orchestrator: &O,
    registration: &Registration,
    machine_id: MachineId,
    lease: Lease,
    shutdown: CancellationToken,
) -> KeeperExit {
    let mut ttl = lease.ttl;
    let mut deadline = Instant::now() + ttl;

    loop {
        let period = (ttl / 3).max(MIN_RENEW_PERIOD);
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                match orchestrator.release(registration, machine_id).await {
                    Ok(()) => tracing::info!(%machine_id, "lease released"),
                    Err(err) => tracing::warn!(%machine_id, "failed to release lease: {err}"),
                }
                return KeeperExit::Released;
            }
            () = sleep(period) => {}
        }

        let outcome = tokio::select! {
            biased;
            res = orchestrator.renew(registration, machine_id) => Some(res),
            () = sleep_until(deadline) => None,
        };

        match outcome {
            Some(Ok(renewed)) => {
                ttl = renewed.ttl;
                deadline = Instant::now() + ttl;
                tracing::debug!(%machine_id, ttl_ms = ttl.as_millis() as u64, "lease renewed");
            }
            Some(Err(OrchestratorError::LeaseLost { .. })) => {
                tracing::error!(%machine_id, "lease lost, shutting down");
                shutdown.cancel();
                return KeeperExit::Lost;
            }
            Some(Err(err)) if Instant::now() < deadline => {
                tracing::warn!(
                    %machine_id,
                    remaining_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "lease renewal failed: {err}"
                );
            }
            Some(Err(_)) | None => {
                tracing::error!(
                    %machine_id,
                    ttl_ms = ttl.as_millis() as u64,
                    "no successful renewal within the lease ttl, shutting down"
                );
                shutdown.cancel();
                return KeeperExit::Expired;
            }
        }
    }
}
