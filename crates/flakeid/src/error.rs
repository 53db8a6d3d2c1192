//! Error types shared by the layout, generator and identity modules.
//!
//! - [`ConfigError`] is fatal at startup. A process that receives one must not
//!   begin serving.
//! - [`GenerateError`] is returned from [`SnowflakeGenerator::generate_id`] and
//!   never leaves the generator in a partially advanced state.
//! - [`OrchestratorError`] is produced by [`Orchestrator`] implementations and
//!   folded into [`ConfigError`] by the resolver.
//!
//! [`SnowflakeGenerator::generate_id`]: crate::SnowflakeGenerator::generate_id
//! [`Orchestrator`]: crate::Orchestrator

use core::time::Duration;

/// A result type defaulting to [`ConfigError`].
pub type Result<T, E = ConfigError> = core::result::Result<T, E>;

/// Invalid layout or identity configuration.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A bit width was configured below zero.
    #[error("{field} must be >= 0 (got {value})")]
    NegativeBitWidth { field: &'static str, value: i64 },

    /// Machine id and sequence bits leave no room for the timestamp.
    #[error(
        "machine_id_bits ({machine_id_bits}) + sequence_bits ({sequence_bits}) must be <= 62 \
         to leave at least one timestamp bit"
    )]
    NoTimestampBits {
        machine_id_bits: i64,
        sequence_bits: i64,
    },

    /// The epoch lies after the current time.
    #[error("epoch {epoch_millis} is in the future (now = {now_millis})")]
    EpochInFuture { epoch_millis: i64, now_millis: i64 },

    /// The layout's representable time range ended before `now`.
    #[error(
        "layout expired: epoch {epoch_millis} + max timestamp delta {max_timestamp_delta} \
         is not after now ({now_millis})"
    )]
    LayoutExpired {
        epoch_millis: i64,
        max_timestamp_delta: i64,
        now_millis: i64,
    },

    /// The resolved machine id does not fit the layout.
    #[error("machine id {machine_id} is out of range [0, {max_machine_id}]")]
    MachineIdOutOfRange {
        machine_id: i64,
        max_machine_id: i64,
    },

    /// Neither an orchestrator nor a static machine id was configured.
    #[error("machine identity is ambiguous: configure a static machine id or an orchestrator")]
    AmbiguousIdentity,

    /// The orchestrator could not be reached or failed to answer.
    #[error("orchestrator unavailable: {reason}")]
    OrchestratorUnavailable { reason: String },

    /// The orchestrator answered but refused to assign an id.
    #[error("orchestrator rejected registration: {reason}")]
    OrchestratorRejected { reason: String },
}

/// Failure of a single generation call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum GenerateError {
    /// `now - epoch` no longer fits the timestamp field.
    #[error("timestamp delta {delta} exceeds layout maximum {max}")]
    TimestampOverflow { delta: i64, max: i64 },

    /// The clock reads earlier than the layout's epoch.
    #[error("clock reads {now_millis}, before epoch {epoch_millis}")]
    ClockBeforeEpoch { now_millis: i64, epoch_millis: i64 },

    /// The clock stayed behind the last issued timestamp for longer than the
    /// configured regression timeout.
    #[error("clock stayed {behind_millis}ms behind for {waited:?}; giving up")]
    ClockRegressionTimeout {
        behind_millis: i64,
        waited: Duration,
    },
}

/// Failure reported by an [`Orchestrator`](crate::Orchestrator).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum OrchestratorError {
    /// Network failure, timeout or server-side error. Safe to retry.
    #[error("orchestrator unavailable: {reason}")]
    Unavailable { reason: String },

    /// The orchestrator refused the request. Not retried.
    #[error("orchestrator rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// The lease on `machine_id` is no longer held by this instance.
    #[error("lease on machine id {machine_id} was lost")]
    LeaseLost { machine_id: i64 },
}

impl OrchestratorError {
    /// Whether repeating the same request may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<OrchestratorError> for ConfigError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Unavailable { reason } => Self::OrchestratorUnavailable { reason },
            OrchestratorError::Rejected { status, reason } => Self::OrchestratorRejected {
                reason: format!("{status}: {reason}"),
            },
            OrchestratorError::LeaseLost { machine_id } => Self::OrchestratorRejected {
                reason: format!("lease on machine id {machine_id} lost during registration"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ConfigError::NoTimestampBits {
            machine_id_bits: 40,
            sequence_bits: 30,
        };
        assert_eq!(
            err.to_string(),
            "machine_id_bits (40) + sequence_bits (30) must be <= 62 to leave at least one timestamp bit"
        );

        let err = ConfigError::MachineIdOutOfRange {
            machine_id: 1024,
            max_machine_id: 1023,
        };
        assert_eq!(
            err.to_string(),
            "machine id 1024 is out of range [0, 1023]"
        );
    }

    #[test]
    fn orchestrator_errors_fold_into_config_errors() {
        let err: ConfigError = OrchestratorError::Unavailable {
            reason: "connection refused".into(),
        }
        .into();
        assert_eq!(
            err,
            ConfigError::OrchestratorUnavailable {
                reason: "connection refused".into()
            }
        );

        let err: ConfigError = OrchestratorError::Rejected {
            status: 503,
            reason: "exhausted".into(),
        }
        .into();
        assert!(matches!(err, ConfigError::OrchestratorRejected { .. }));
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(OrchestratorError::Unavailable { reason: String::new() }.is_transient());
        assert!(!OrchestratorError::LeaseLost { machine_id: 1 }.is_transient());
        assert!(
            !OrchestratorError::Rejected {
                status: 400,
                reason: String::new()
            }
            .is_transient()
        );
    }
}
