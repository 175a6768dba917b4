//! Connection pooling for database connections
//!
//! A [`ConnectionPool`] hands out [`PooledConnection`] checkouts, bounded by
//! `max_size`, and takes connections back when a checkout is dropped.
//!
//! # Example
//!
//! ```ignore
//! use pgnest_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(0, 10)
//!     .with_acquire_timeout_ms(5_000)
//!     .with_idle_timeout_ms(30_000);
//!
//! let pool = Arc::new(ConnectionPool::new("neondb", config, factory));
//! let conn = pool.get().await?;
//! // Use connection...
//! // Connection returned to pool on drop
//! ```

mod config;
mod pool;
mod stats;

#[cfg(test)]
mod tests;

pub use config::PoolConfig;
pub use pool::{ConnectionFactory, ConnectionPool, PooledConnection};
pub use stats::PoolStats;
