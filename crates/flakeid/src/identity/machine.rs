use crate::{ConfigError, GeneratorConfig, Result};
use core::fmt;

/// A machine id known to fit a specific [`GeneratorConfig`].
///
/// The only way to obtain one is [`MachineId::new`], so a generator can never
/// be built with an id its layout cannot encode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MachineId(i64);

impl MachineId {
    /// Checks `raw` against `[0, config.max_machine_id()]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MachineIdOutOfRange`] otherwise.
    pub fn new(raw: i64, config: &GeneratorConfig) -> Result<Self> {
        if raw < 0 || raw > config.max_machine_id() {
            return Err(ConfigError::MachineIdOutOfRange {
                machine_id: raw,
                max_machine_id: config.max_machine_id(),
            });
        }
        Ok(Self(raw))
    }

    /// Wraps an id the orchestrator granted but the layout cannot encode, so
    /// the lease can be handed back. Never reaches a generator.
    pub(crate) const fn for_release(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
