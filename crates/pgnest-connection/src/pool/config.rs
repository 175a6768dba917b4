use std::time::Duration;

use pgnest_core::{PgnestError, Result};

/// Sizing and timeouts for one [`ConnectionPool`](super::ConnectionPool)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    min_size: usize,
    max_size: usize,
    acquire_timeout: Duration,
    idle_timeout: Duration,
    max_lifetime: Option<Duration>,
}

impl PoolConfig {
    /// Sizes are clamped so that `1 <= max_size` and `min_size <= max_size`.
    /// Use [`PoolConfig::try_new`] to reject bad sizes instead.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            min_size: min_size.min(max_size),
            max_size,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
            max_lifetime: None,
        }
    }

    pub fn try_new(min_size: usize, max_size: usize) -> Result<Self> {
        match (min_size, max_size) {
            (_, 0) => Err(PgnestError::Configuration(
                "pool max_size must be greater than 0".to_string(),
            )),
            (min, max) if min > max => Err(PgnestError::Configuration(format!(
                "pool min_size ({min}) cannot exceed max_size ({max})"
            ))),
            (min, max) => Ok(Self::new(min, max)),
        }
    }

    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout = Duration::from_millis(timeout_ms);
        self
    }

    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout = Duration::from_millis(timeout_ms);
        self
    }

    /// Idle connections older than this are closed at checkout instead of reused
    pub fn with_max_lifetime_ms(mut self, lifetime_ms: u64) -> Self {
        self.max_lifetime = Some(Duration::from_millis(lifetime_ms));
        self
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// How long `get` waits for a free slot
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(0, 10)
    }
}
