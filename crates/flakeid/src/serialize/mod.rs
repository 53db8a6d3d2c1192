use crate::SnowflakeId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serializes as the native 64-bit integer.
impl Serialize for SnowflakeId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.to_raw().serialize(s)
    }
}

/// Accepts the native integer; negative values are rejected since the sign
/// bit of a valid id is always zero.
impl<'de> Deserialize<'de> for SnowflakeId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(d)?;
        if raw < 0 {
            return Err(serde::de::Error::custom(format!(
                "snowflake id must be non-negative, got {raw}"
            )));
        }
        Ok(Self::from_raw(raw))
    }
}

/// `#[serde(with = "as_string")]` for clients that cannot hold integers
/// above 2^53 losslessly (JavaScript, most JSON parsers).
pub mod as_string {
    use super::{Deserialize, Deserializer, Serializer};
    use crate::SnowflakeId;

    /// Serialize a snowflake ID as its decimal string.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying serializer fails.
    pub fn serialize<S>(id: &SnowflakeId, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.collect_str(id)
    }

    /// Deserialize a snowflake ID from its decimal string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a non-negative 64-bit integer.
    pub fn deserialize<'de, D>(d: D) -> Result<SnowflakeId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = <&str>::deserialize(d)?;
        let raw: i64 = text.parse().map_err(serde::de::Error::custom)?;
        if raw < 0 {
            return Err(serde::de::Error::custom(format!(
                "snowflake id must be non-negative, got {raw}"
            )));
        }
        Ok(SnowflakeId::from_raw(raw))
    }
}
