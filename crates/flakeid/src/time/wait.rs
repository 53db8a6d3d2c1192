//! Waiting for the clock to reach a target millisecond.
//!
//! Both clock regression and sequence exhaustion reduce to the same question:
//! "block until the clock reads at least `target`". [`wait_until`] answers it
//! by spinning briefly, then yielding, and once the wait has lasted longer
//! than [`ClockPolicy::stall_warn_after`] it logs once and backs off to short
//! sleeps.

use crate::TimeSource;
use core::time::Duration;
use std::{thread, time::Instant};

/// Number of tight spins between elapsed-time checks.
const SPINS_PER_CHECK: u32 = 64;

/// Sleep used once a wait has been reported as a stall.
const STALLED_SLEEP: Duration = Duration::from_millis(1);

/// How the generator behaves while waiting on the clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockPolicy {
    /// Waits longer than this are logged once at `warn` level.
    pub stall_warn_after: Duration,
    /// Upper bound on a clock-regression wait. `None` waits indefinitely.
    ///
    /// Sequence-exhaustion waits are never bounded: the clock is moving and
    /// the wait ends within a millisecond.
    pub regression_timeout: Option<Duration>,
}

impl Default for ClockPolicy {
    fn default() -> Self {
        Self {
            stall_warn_after: Duration::from_millis(100),
            regression_timeout: None,
        }
    }
}

impl ClockPolicy {
    #[must_use]
    pub const fn with_stall_warn_after(mut self, after: Duration) -> Self {
        self.stall_warn_after = after;
        self
    }

    #[must_use]
    pub const fn with_regression_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.regression_timeout = timeout;
        self
    }
}

/// Why a wait was entered. Only used for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitReason {
    ClockRegression,
    SequenceExhausted,
}

/// A wait gave up before the clock reached its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitTimedOut {
    /// The last clock reading observed.
    pub last_seen: i64,
    pub waited: Duration,
}

/// Blocks until `time` reads at least `target`, returning that reading.
///
/// `limit` bounds the wait; `None` waits for as long as it takes.
///
/// # Errors
///
/// Returns [`WaitTimedOut`] if `limit` elapses first.
pub fn wait_until<T>(
    time: &T,
    target: i64,
    policy: &ClockPolicy,
    limit: Option<Duration>,
    _reason: WaitReason,
) -> Result<i64, WaitTimedOut>
where
    T: TimeSource + ?Sized,
{
    let started = Instant::now();
    let mut stalled = false;
    let mut spins: u32 = 0;

    loop {
        let now = time.current_millis();
        if now >= target {
            if stalled {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    reason = ?_reason,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "clock caught up, resuming generation"
                );
            }
            return Ok(now);
        }

        if stalled {
            thread::sleep(STALLED_SLEEP);
        } else {
            spins = spins.wrapping_add(1);
            if spins % SPINS_PER_CHECK != 0 {
                core::hint::spin_loop();
                continue;
            }
            thread::yield_now();
        }

        let waited = started.elapsed();
        if !stalled && waited >= policy.stall_warn_after {
            stalled = true;
            #[cfg(feature = "tracing")]
            tracing::warn!(
                reason = ?_reason,
                behind_ms = target - now,
                waited_ms = waited.as_millis() as u64,
                "generation stalled waiting for the clock"
            );
        }

        if let Some(limit) = limit {
            if waited >= limit {
                return Err(WaitTimedOut {
                    last_seen: now,
                    waited,
                });
            }
        }
    }
}
