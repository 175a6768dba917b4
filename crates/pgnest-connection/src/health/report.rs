//! Per-pool health reports

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::ping::{PingError, ping_connection};
use super::status::{HealthStatus, HealthThresholds};
use crate::pool::{ConnectionPool, PoolStats};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Upper bound for checkout plus ping query
    pub ping_timeout: Duration,
    pub thresholds: HealthThresholds,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            ping_timeout: Duration::from_secs(5),
            thresholds: HealthThresholds::default(),
        }
    }
}

/// Outcome of probing one pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolHealth {
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stats: PoolStats,
}

impl PoolHealth {
    fn reachable(latency: Duration, config: &HealthConfig, stats: PoolStats) -> Self {
        Self {
            reachable: true,
            latency_ms: Some(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX)),
            status: config.thresholds.classify(latency),
            error: None,
            stats,
        }
    }

    fn unreachable(error: String, stats: PoolStats) -> Self {
        Self {
            reachable: false,
            latency_ms: None,
            status: HealthStatus::Unhealthy,
            error: Some(error),
            stats,
        }
    }
}

/// Check a connection out of `pool` and ping it.
///
/// Checkout and ping share one `ping_timeout` budget. Failures are logged
/// and reported as an unreachable [`PoolHealth`].
#[tracing::instrument(skip_all, fields(database = %pool.key()))]
pub async fn check_pool(pool: &Arc<ConnectionPool>, config: &HealthConfig) -> PoolHealth {
    let check = async {
        let conn = pool.get().await.map_err(|e| e.to_string())?;
        ping_connection(&*conn, config.ping_timeout)
            .await
            .map_err(|e| e.to_string())
    };

    let outcome = match tokio::time::timeout(config.ping_timeout, check).await {
        Ok(outcome) => outcome,
        Err(_) => Err(PingError::Timeout.to_string()),
    };

    match outcome {
        Ok(latency) => {
            tracing::debug!(?latency, "pool health check succeeded");
            PoolHealth::reachable(latency, config, pool.stats())
        }
        Err(error) => {
            tracing::warn!(error = %error, "pool health check failed");
            PoolHealth::unreachable(error, pool.stats())
        }
    }
}
