//! pgnest Connection - pooling and resilient execution
//!
//! Turns "run this statement against database X" into a verified query on a
//! pooled connection, surviving a proxy that restarts underneath it:
//!
//! - [`ConnectionConfigResolver`] picks the identity to dial from the session
//! - [`PoolRegistry`] keeps one pool per database and tears broken ones down
//! - [`QueryExecutor`] verifies the attached database and retries once on
//!   connection loss
//! - [`ConnectionService`] is the surface callers use

mod backoff;
mod client;
mod executor;
pub mod health;
pub mod pool;
mod registry;
mod resolver;
mod service;
mod session;
mod settings;

#[cfg(test)]
mod test_support;

pub use backoff::BackoffStrategy;
pub use client::ManagedClient;
pub use executor::{QueryExecutor, VERIFY_QUERY};
pub use health::{HealthConfig, HealthStatus, HealthThresholds, PoolHealth};
pub use pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use registry::{PoolRegistry, PoolState, RegistrySettings};
pub use resolver::{ConnectionConfigResolver, DatabaseFallbackPolicy, ResolverSettings};
pub use service::ConnectionService;
pub use session::{BranchConnectionInfo, SessionSource, SessionState};
pub use settings::{HealthSettings, PoolSettings, RetrySettings, ServiceSettings};
