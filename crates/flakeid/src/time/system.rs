use crate::TimeSource;
use std::time::{SystemTime, UNIX_EPOCH};

/// The operating system's wall clock.
///
/// Follows NTP steps and manual adjustments, which is exactly why the
/// generator guards against regressions.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    #[inline]
    fn current_millis(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_millis() as i64,
            // A clock set before 1970 reads as negative rather than panicking.
            Err(e) => -(e.duration().as_millis() as i64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_EPOCH_MILLIS;

    #[test]
    fn system_clock_is_reasonable() {
        let now = SystemClock.current_millis();
        assert!(now > DEFAULT_EPOCH_MILLIS);
        // 2100-01-01
        assert!(now < 4_102_444_800_000);
    }
}
