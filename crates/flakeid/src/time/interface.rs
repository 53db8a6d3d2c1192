use alloc::sync::Arc;

/// A source of wall-clock time in unix milliseconds.
///
/// The generator never assumes this is monotonic: readings that move
/// backwards are detected and waited out.
///
/// # Example
///
/// ```
/// use flakeid::TimeSource;
///
/// struct Fixed(i64);
///
/// impl TimeSource for Fixed {
///     fn current_millis(&self) -> i64 {
///         self.0
///     }
/// }
///
/// assert_eq!(Fixed(42).current_millis(), 42);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since 1970-01-01 UTC.
    fn current_millis(&self) -> i64;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn current_millis(&self) -> i64 {
        (**self).current_millis()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn current_millis(&self) -> i64 {
        (**self).current_millis()
    }
}
