//! Latency-based pool health classification

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a pool responded to its last health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    /// Answered, but slower than `healthy_within`
    Degraded,
    /// No answer, or slower than `degraded_within`
    Unhealthy,
}

impl HealthStatus {
    /// Queries can still be sent to a pool in this state
    pub fn is_usable(self) -> bool {
        self != HealthStatus::Unhealthy
    }
}

/// Latency cut-offs applied to health check round trips.
///
/// ```
/// use pgnest_connection::health::{HealthStatus, HealthThresholds};
/// use std::time::Duration;
///
/// let thresholds = HealthThresholds::default();
/// assert_eq!(thresholds.classify(Duration::from_millis(40)), HealthStatus::Healthy);
/// assert_eq!(thresholds.classify(Duration::from_millis(250)), HealthStatus::Degraded);
/// assert_eq!(thresholds.classify(Duration::from_secs(2)), HealthStatus::Unhealthy);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    pub healthy_within: Duration,
    pub degraded_within: Duration,
}

impl HealthThresholds {
    /// `degraded_ms` below `healthy_ms` is raised to it
    pub fn new(healthy_ms: u64, degraded_ms: u64) -> Self {
        Self {
            healthy_within: Duration::from_millis(healthy_ms),
            degraded_within: Duration::from_millis(degraded_ms.max(healthy_ms)),
        }
    }

    /// Both bounds are inclusive
    pub fn classify(&self, latency: Duration) -> HealthStatus {
        match latency {
            l if l <= self.healthy_within => HealthStatus::Healthy,
            l if l <= self.degraded_within => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self::new(100, 500)
    }
}
