use crate::{ConfigError, Result, SnowflakeId, SnowflakeParts};

/// Unix milliseconds of 2024-01-01T00:00:00Z, the default epoch.
pub const DEFAULT_EPOCH_MILLIS: i64 = 1_704_067_200_000;

/// Default width of the machine id field.
pub const DEFAULT_MACHINE_ID_BITS: i64 = 10;

/// Default width of the sequence field.
pub const DEFAULT_SEQUENCE_BITS: i64 = 12;

/// Bits available below the sign bit.
const PAYLOAD_BITS: i64 = 63;

/// Unvalidated layout parameters as read from configuration.
///
/// Widths are signed so that a negative value supplied by an operator is
/// reported as [`ConfigError::NegativeBitWidth`] instead of failing to parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutParams {
    pub machine_id_bits: i64,
    pub sequence_bits: i64,
    pub epoch_millis: i64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            machine_id_bits: DEFAULT_MACHINE_ID_BITS,
            sequence_bits: DEFAULT_SEQUENCE_BITS,
            epoch_millis: DEFAULT_EPOCH_MILLIS,
        }
    }
}

impl LayoutParams {
    /// Validates the parameters against `now_millis` and derives the layout.
    ///
    /// Checks run in this order, and the first violation is returned:
    ///
    /// 1. both widths are non-negative
    /// 2. at least one timestamp bit remains (`machine + sequence <= 62`)
    /// 3. the epoch is not in the future
    /// 4. the epoch plus the largest representable delta is after `now`
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] naming the first violated constraint.
    ///
    /// # Example
    ///
    /// ```
    /// use flakeid::{ConfigError, LayoutParams};
    ///
    /// let now = 1_750_000_000_000;
    /// let config = LayoutParams::default().validate(now).unwrap();
    /// assert_eq!(config.max_machine_id(), 1023);
    /// assert_eq!(config.max_sequence(), 4095);
    ///
    /// let err = LayoutParams { machine_id_bits: 40, sequence_bits: 30, ..Default::default() }
    ///     .validate(now)
    ///     .unwrap_err();
    /// assert!(matches!(err, ConfigError::NoTimestampBits { .. }));
    /// ```
    pub fn validate(self, now_millis: i64) -> Result<GeneratorConfig> {
        let Self {
            machine_id_bits,
            sequence_bits,
            epoch_millis,
        } = self;

        if machine_id_bits < 0 {
            return Err(ConfigError::NegativeBitWidth {
                field: "machine_id_bits",
                value: machine_id_bits,
            });
        }
        if sequence_bits < 0 {
            return Err(ConfigError::NegativeBitWidth {
                field: "sequence_bits",
                value: sequence_bits,
            });
        }

        let timestamp_bits = PAYLOAD_BITS
            .checked_sub(machine_id_bits)
            .and_then(|rest| rest.checked_sub(sequence_bits))
            .filter(|bits| *bits >= 1)
            .ok_or(ConfigError::NoTimestampBits {
                machine_id_bits,
                sequence_bits,
            })?;

        if epoch_millis > now_millis {
            return Err(ConfigError::EpochInFuture {
                epoch_millis,
                now_millis,
            });
        }

        // All three widths are now within 0..=63.
        let machine_id_bits = machine_id_bits as u32;
        let sequence_bits = sequence_bits as u32;
        let timestamp_bits = timestamp_bits as u32;

        let max_timestamp_delta = mask(timestamp_bits);
        if epoch_millis.saturating_add(max_timestamp_delta) <= now_millis {
            return Err(ConfigError::LayoutExpired {
                epoch_millis,
                max_timestamp_delta,
                now_millis,
            });
        }

        Ok(GeneratorConfig {
            epoch_millis,
            machine_id_bits,
            sequence_bits,
            timestamp_bits,
            max_machine_id: mask(machine_id_bits),
            max_sequence: mask(sequence_bits),
            max_timestamp_delta,
            machine_id_shift: sequence_bits,
            timestamp_shift: sequence_bits + machine_id_bits,
        })
    }
}

/// `2^bits - 1` for `bits` in `0..=63`.
const fn mask(bits: u32) -> i64 {
    ((1u64 << bits) - 1) as i64
}

/// A validated, immutable bit layout.
///
/// Obtained from [`LayoutParams::validate`]. Every accessor is a precomputed
/// constant, so the generator's hot path does no arithmetic on widths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeneratorConfig {
    epoch_millis: i64,
    machine_id_bits: u32,
    sequence_bits: u32,
    timestamp_bits: u32,
    max_machine_id: i64,
    max_sequence: i64,
    max_timestamp_delta: i64,
    machine_id_shift: u32,
    timestamp_shift: u32,
}

impl GeneratorConfig {
    pub const fn epoch_millis(&self) -> i64 {
        self.epoch_millis
    }

    pub const fn machine_id_bits(&self) -> u32 {
        self.machine_id_bits
    }

    pub const fn sequence_bits(&self) -> u32 {
        self.sequence_bits
    }

    pub const fn timestamp_bits(&self) -> u32 {
        self.timestamp_bits
    }

    pub const fn max_machine_id(&self) -> i64 {
        self.max_machine_id
    }

    pub const fn max_sequence(&self) -> i64 {
        self.max_sequence
    }

    pub const fn max_timestamp_delta(&self) -> i64 {
        self.max_timestamp_delta
    }

    pub const fn machine_id_shift(&self) -> u32 {
        self.machine_id_shift
    }

    pub const fn timestamp_shift(&self) -> u32 {
        self.timestamp_shift
    }

    /// Last unix millisecond this layout can encode.
    pub const fn last_representable_millis(&self) -> i64 {
        self.epoch_millis.saturating_add(self.max_timestamp_delta)
    }

    /// Packs the components into an id.
    ///
    /// Components are masked to their field widths; callers are expected to
    /// pass in-range values.
    #[inline]
    pub const fn compose(&self, parts: SnowflakeParts) -> SnowflakeId {
        SnowflakeId::from_raw(
            ((parts.timestamp_delta & self.max_timestamp_delta) << self.timestamp_shift)
                | ((parts.machine_id & self.max_machine_id) << self.machine_id_shift)
                | (parts.sequence & self.max_sequence),
        )
    }

    /// Splits an id produced under this layout back into its components.
    #[inline]
    pub const fn decompose(&self, id: SnowflakeId) -> SnowflakeParts {
        let raw = id.to_raw();
        SnowflakeParts {
            timestamp_delta: (raw >> self.timestamp_shift) & self.max_timestamp_delta,
            machine_id: (raw >> self.machine_id_shift) & self.max_machine_id,
            sequence: raw & self.max_sequence,
        }
    }
}
