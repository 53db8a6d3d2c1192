use crate::{
    ClockPolicy, GenerateError, GeneratorConfig, MachineId, SnowflakeId, SnowflakeParts,
    SystemClock, TimeSource, WaitReason, wait_until,
};
use parking_lot::Mutex;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Marks a generator that has never issued an id.
const NEVER: i64 = -1;

/// Mutable generator state. Only touched inside [`SnowflakeGenerator::generate_id`]
/// while the lock is held.
#[derive(Debug)]
struct GeneratorState {
    last_timestamp_millis: i64,
    sequence: i64,
}

/// A lock-based Snowflake generator shared by every request handler of a
/// process.
///
/// One [`parking_lot::Mutex`] guards `{last timestamp, sequence}`; the lock is
/// held for the whole call, including any wait on the clock. Every caller is
/// delayed while one of them waits, but ids are issued strictly in order and
/// never collide.
///
/// ## Guarantees
/// - ✅ Strictly increasing ids across calls, including across clock
///   regressions and sequence exhaustion
/// - ✅ At most `max_sequence + 1` ids per millisecond; excess callers wait
/// - ✅ No allocation on the hot path
///
/// Uniqueness across a fleet holds only while no two live generators share a
/// machine id.
///
/// ## Example
/// ```
/// use flakeid::{LayoutParams, MachineId, SnowflakeGenerator, SystemClock, TimeSource};
///
/// let config = LayoutParams::default().validate(SystemClock.current_millis()).unwrap();
/// let machine_id = MachineId::new(7, &config).unwrap();
/// let generator = SnowflakeGenerator::new(config, machine_id);
///
/// let a = generator.generate_id().unwrap();
/// let b = generator.generate_id().unwrap();
/// assert!(b > a);
/// assert_eq!(config.decompose(b).machine_id, 7);
/// ```
#[derive(Debug)]
pub struct SnowflakeGenerator<T = SystemClock>
where
    T: TimeSource,
{
    config: GeneratorConfig,
    machine_id: MachineId,
    policy: ClockPolicy,
    state: Mutex<GeneratorState>,
    time: T,
}

impl SnowflakeGenerator<SystemClock> {
    /// Creates a generator reading the system wall clock with the default
    /// [`ClockPolicy`].
    pub fn new(config: GeneratorConfig, machine_id: MachineId) -> Self {
        Self::with_time(config, machine_id, SystemClock)
    }
}

impl<T> SnowflakeGenerator<T>
where
    T: TimeSource,
{
    /// Creates a generator with a custom [`TimeSource`].
    pub fn with_time(config: GeneratorConfig, machine_id: MachineId, time: T) -> Self {
        Self::with_policy(config, machine_id, time, ClockPolicy::default())
    }

    /// Creates a generator with a custom [`TimeSource`] and [`ClockPolicy`].
    pub fn with_policy(
        config: GeneratorConfig,
        machine_id: MachineId,
        time: T,
        policy: ClockPolicy,
    ) -> Self {
        Self {
            config,
            machine_id,
            policy,
            state: Mutex::new(GeneratorState {
                last_timestamp_millis: NEVER,
                sequence: 0,
            }),
            time,
        }
    }

    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub const fn machine_id(&self) -> MachineId {
        self.machine_id
    }

    pub const fn policy(&self) -> &ClockPolicy {
        &self.policy
    }

    /// Issues the next id.
    ///
    /// Blocks while the clock is behind the last issued timestamp, and while
    /// the current millisecond's sequence space is exhausted.
    ///
    /// # Errors
    ///
    /// - [`GenerateError::TimestampOverflow`] once the clock passes the
    ///   layout's last representable millisecond
    /// - [`GenerateError::ClockBeforeEpoch`] if the clock reads earlier than
    ///   the epoch
    /// - [`GenerateError::ClockRegressionTimeout`] if a regression timeout is
    ///   configured and the clock does not recover in time
    ///
    /// On error the generator state is left untouched.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn generate_id(&self) -> Result<SnowflakeId, GenerateError> {
        let mut state = self.state.lock();
        let last = state.last_timestamp_millis;

        let mut now = self.time.current_millis();
        if now < last {
            now = self.cold_clock_behind(now, last)?;
        }

        let sequence = if now == last {
            let next = (state.sequence + 1) & self.config.max_sequence();
            if next == 0 {
                now = self.wait_for_next_millis(last);
            }
            next
        } else {
            0
        };

        let delta = now - self.config.epoch_millis();
        if delta > self.config.max_timestamp_delta() {
            return Err(self.cold_overflow(delta));
        }
        if delta < 0 {
            return Err(GenerateError::ClockBeforeEpoch {
                now_millis: now,
                epoch_millis: self.config.epoch_millis(),
            });
        }

        state.last_timestamp_millis = now;
        state.sequence = sequence;

        Ok(self.config.compose(SnowflakeParts {
            timestamp_delta: delta,
            machine_id: self.machine_id.get(),
            sequence,
        }))
    }

    /// Spins until the clock moves past `last`.
    fn wait_for_next_millis(&self, last: i64) -> i64 {
        match wait_until(
            &self.time,
            last + 1,
            &self.policy,
            None,
            WaitReason::SequenceExhausted,
        ) {
            Ok(now) => now,
            Err(_) => unreachable!("unbounded wait cannot time out"),
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(&self, _now: i64, last: i64) -> Result<i64, GenerateError> {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            behind_ms = last - _now,
            machine_id = self.machine_id.get(),
            "clock moved backwards, waiting to generate id"
        );

        wait_until(
            &self.time,
            last,
            &self.policy,
            self.policy.regression_timeout,
            WaitReason::ClockRegression,
        )
        .map_err(|timed_out| GenerateError::ClockRegressionTimeout {
            behind_millis: last - timed_out.last_seen,
            waited: timed_out.waited,
        })
    }

    #[cold]
    #[inline(never)]
    fn cold_overflow(&self, delta: i64) -> GenerateError {
        #[cfg(feature = "tracing")]
        tracing::error!(
            delta,
            max = self.config.max_timestamp_delta(),
            "timestamp no longer fits the configured layout"
        );

        GenerateError::TimestampOverflow {
            delta,
            max: self.config.max_timestamp_delta(),
        }
    }
}
