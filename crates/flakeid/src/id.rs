use core::fmt;

/// A 64-bit Snowflake identifier.
///
/// From the most significant bit: one sign bit fixed to zero, the timestamp
/// delta since the layout's epoch, the machine id, and the per-millisecond
/// sequence. Field widths are not part of the value; decode it with the same
/// [`GeneratorConfig`](crate::GeneratorConfig) that produced it.
///
/// Ids from one generator order the same way numerically and in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SnowflakeId(i64);

impl SnowflakeId {
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<SnowflakeId> for i64 {
    fn from(id: SnowflakeId) -> Self {
        id.0
    }
}

/// The decoded fields of a [`SnowflakeId`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SnowflakeParts {
    /// Milliseconds since the layout's epoch.
    pub timestamp_delta: i64,
    pub machine_id: i64,
    pub sequence: i64,
}
