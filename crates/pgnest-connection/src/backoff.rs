//! Capped exponential backoff

use std::time::Duration;

/// Delays that double with each attempt up to a cap.
///
/// ```
/// use pgnest_connection::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(50, 1_000);
/// assert_eq!(backoff.calculate_delay(0), Duration::from_millis(50));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_millis(100));
/// assert_eq!(backoff.calculate_delay(10), Duration::from_millis(1_000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffStrategy {
    initial_ms: u64,
    max_ms: u64,
}

impl BackoffStrategy {
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        let initial_ms = initial_ms.max(1);
        Self {
            initial_ms,
            max_ms: max_ms.max(initial_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = 2u64
            .checked_pow(attempt)
            .and_then(|factor| self.initial_ms.checked_mul(factor))
            .map_or(self.max_ms, |ms| ms.min(self.max_ms));
        Duration::from_millis(delay_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

impl Default for BackoffStrategy {
    /// 50ms initial, 1 second max
    fn default() -> Self {
        Self::new(50, 1_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_and_caps() {
        let backoff = BackoffStrategy::new(100, 500);

        assert_eq!(backoff.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(backoff.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(backoff.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(backoff.calculate_delay(3), Duration::from_millis(500));
        assert_eq!(backoff.calculate_delay(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_initial_delay_is_clamped() {
        let backoff = BackoffStrategy::new(0, 0);
        assert_eq!(backoff.initial_delay(), Duration::from_millis(1));
        assert_eq!(backoff.max_delay(), Duration::from_millis(1));
    }
}
