use chrono::Utc;

/// A source of wall-clock time in milliseconds since the Unix epoch.
///
/// [`SnowFlake`] reads the clock exclusively through this trait, so a mocked
/// implementation can drive the generator through saturated windows or
/// backward clock jumps in tests.
///
/// # Example
///
/// ```
/// use snowflake_cas::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> i64 {
///         1_700_000_000_000
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1_700_000_000_000);
/// ```
///
/// [`SnowFlake`]: crate::SnowFlake
pub trait TimeSource {
    /// Returns the current time in milliseconds since 1970-01-01 UTC.
    fn current_millis(&self) -> i64;
}

/// The system wall clock.
///
/// This is not monotonic: NTP steps or manual adjustments are visible to the
/// generator, which handles them as clock regressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    #[inline]
    fn current_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}
