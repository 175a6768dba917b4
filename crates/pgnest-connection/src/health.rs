//! Pool health checks and classification
//!
//! A health check takes a connection from a pool and runs `SELECT 1` under a
//! timeout. Health checks never fail: every problem is folded into the resulting
//! [`PoolHealth`].
//!
//! # Example
//!
//! ```ignore
//! use pgnest_connection::health::{HealthConfig, check_pool};
//!
//! let health = check_pool(&pool, &HealthConfig::default()).await;
//! println!("{}: {:?} in {:?}ms", pool.key(), health.status, health.latency_ms);
//! ```

mod ping;
mod report;
mod status;


pub use ping::{PING_QUERY, PingError, PingResult, ping_connection};
pub use report::{HealthConfig, PoolHealth, check_pool};
pub use status::{HealthStatus, HealthThresholds};
