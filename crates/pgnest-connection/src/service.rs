//! The connection layer's public surface

use std::collections::BTreeMap;
use std::sync::Arc;

use pgnest_core::{Connector, QueryResult, Result, Value};

use crate::executor::QueryExecutor;
use crate::health::{HealthConfig, PING_QUERY, PoolHealth, check_pool};
use crate::pool::PoolStats;
use crate::registry::PoolRegistry;
use crate::resolver::ConnectionConfigResolver;
use crate::session::SessionSource;
use crate::settings::ServiceSettings;

/// Runs statements for callers that only know a database name.
///
/// Owns the pool registry; dropping the service does not close pools, call
/// [`close_all`](ConnectionService::close_all) on shutdown.
pub struct ConnectionService {
    executor: QueryExecutor,
    health: HealthConfig,
}

impl ConnectionService {
    pub fn new(
        settings: &ServiceSettings,
        session: Arc<dyn SessionSource>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        settings.validate()?;

        let resolver = ConnectionConfigResolver::new(session, settings.resolver_settings());
        let registry = PoolRegistry::new(connector, settings.registry_settings()?);
        let executor = QueryExecutor::new(
            resolver,
            registry,
            settings.retry.acquire_retries,
            settings.backoff(),
        );

        Ok(Self {
            executor,
            health: settings.health_config(),
        })
    }

    /// Run `sql` with `$n` parameters against `database`, or the selected
    /// database when `None`.
    pub async fn execute_query(
        &self,
        sql: &str,
        params: &[Value],
        database: Option<&str>,
    ) -> Result<QueryResult> {
        self.executor.execute_query(sql, params, database).await
    }

    /// Whether `SELECT 1` succeeds. Never fails; errors are logged.
    #[tracing::instrument(skip(self))]
    pub async fn test_connection(&self, database: Option<&str>) -> bool {
        match self.executor.execute_query(PING_QUERY, &[], database).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "connection test failed");
                false
            }
        }
    }

    /// Reachability of every active pool
    pub async fn health_check(&self) -> BTreeMap<String, bool> {
        self.health_report()
            .await
            .into_iter()
            .map(|(key, health)| (key, health.reachable))
            .collect()
    }

    /// Check every active pool concurrently
    pub async fn health_report(&self) -> BTreeMap<String, PoolHealth> {
        let pools = self.registry().active_pools();
        let checks = pools.iter().map(|(key, pool)| async move {
            (key.clone(), check_pool(pool, &self.health).await)
        });
        futures::future::join_all(checks).await.into_iter().collect()
    }

    pub fn pool_stats(&self) -> BTreeMap<String, PoolStats> {
        self.registry().stats().into_iter().collect()
    }

    pub async fn close_pool(&self, database: &str) {
        self.registry().close_pool(database).await;
    }

    pub async fn close_all(&self) {
        self.registry().close_all().await;
    }

    pub fn registry(&self) -> &PoolRegistry {
        self.executor.registry()
    }
}
