//! A checked-out connection, pooled or direct

use std::fmt;
use std::sync::Arc;

use pgnest_core::{Connection, QueryResult, Result, Value};

use crate::pool::{ConnectionPool, PooledConnection};

/// One connection used for a single logical operation.
///
/// [`release`](ManagedClient::release) consumes the client: a pooled
/// checkout goes back to its pool, a direct connection is closed.
pub enum ManagedClient {
    Pooled(PooledConnection),
    Direct(Arc<dyn Connection>),
}

impl ManagedClient {
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.connection().query(sql, params).await
    }

    pub fn connection(&self) -> &dyn Connection {
        match self {
            ManagedClient::Pooled(pooled) => &**pooled,
            ManagedClient::Direct(connection) => connection.as_ref(),
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self, ManagedClient::Pooled(_))
    }

    /// Pool the checkout came from, if any
    pub fn pool(&self) -> Option<&Arc<ConnectionPool>> {
        match self {
            ManagedClient::Pooled(pooled) => Some(pooled.pool()),
            ManagedClient::Direct(_) => None,
        }
    }

    pub async fn release(self) {
        match self {
            ManagedClient::Pooled(pooled) => drop(pooled),
            ManagedClient::Direct(connection) => {
                if let Err(e) = connection.close().await {
                    tracing::debug!(error = %e, "failed to close direct connection");
                }
            }
        }
    }
}

impl fmt::Debug for ManagedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedClient::Pooled(pooled) => f
                .debug_tuple("Pooled")
                .field(&pooled.pool().key())
                .finish(),
            ManagedClient::Direct(connection) => f
                .debug_tuple("Direct")
                .field(&connection.driver_name())
                .finish(),
        }
    }
}
