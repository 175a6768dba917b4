//! Resilient statement execution
//!
//! Every statement runs on a client that has been checked against the
//! intended database. Connection-class failures get exactly one retry on a
//! fresh pool; statement errors are returned as they are.

use pgnest_core::{ConnectionConfig, PgnestError, QueryResult, Result, Value};

use crate::backoff::BackoffStrategy;
use crate::client::ManagedClient;
use crate::pool::PooledConnection;
use crate::registry::PoolRegistry;
use crate::resolver::ConnectionConfigResolver;

pub const VERIFY_QUERY: &str = "SELECT current_database()";

pub struct QueryExecutor {
    resolver: ConnectionConfigResolver,
    registry: PoolRegistry,
    /// Extra checkout attempts before falling back to a direct connection
    acquire_retries: u32,
    backoff: BackoffStrategy,
}

impl QueryExecutor {
    pub fn new(
        resolver: ConnectionConfigResolver,
        registry: PoolRegistry,
        acquire_retries: u32,
        backoff: BackoffStrategy,
    ) -> Self {
        Self {
            resolver,
            registry,
            acquire_retries,
            backoff,
        }
    }

    pub fn resolver(&self) -> &ConnectionConfigResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    /// Run `sql` with positional parameters against `database` (or the
    /// selected database).
    ///
    /// A connection-class failure discards the pool for the database and
    /// runs the whole attempt once more. A second failure is returned.
    #[tracing::instrument(skip(self, sql, params), fields(requested = database.unwrap_or_default()))]
    pub async fn execute_query(
        &self,
        sql: &str,
        params: &[Value],
        database: Option<&str>,
    ) -> Result<QueryResult> {
        let config = self.resolver.resolve(database)?;

        match self.execute_once(&config, sql, params).await {
            Err(e) if e.is_connection_class() => {
                tracing::warn!(
                    database = %config.database,
                    error = %e,
                    "connection lost, retrying once on a fresh connection"
                );
                self.registry.close_pool(&config.database).await;
                self.execute_once(&config, sql, params).await
            }
            outcome => outcome,
        }
    }

    async fn execute_once(
        &self,
        config: &ConnectionConfig,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryResult> {
        let client = self.acquire_verified(config).await?;
        let outcome = client.query(sql, params).await;
        client.release().await;
        outcome
    }

    /// A client confirmed to be attached to `config.database`.
    ///
    /// A pooled client reporting another database invalidates its pool and
    /// the check is repeated once on a direct connection.
    pub async fn acquire_verified(&self, config: &ConnectionConfig) -> Result<ManagedClient> {
        let client = self.acquire(config).await?;

        let mismatch = match verify(&client, &config.database).await {
            Ok(()) => return Ok(client),
            Err(mismatch @ PgnestError::DatabaseMismatch { .. }) => mismatch,
            Err(e) => {
                client.release().await;
                return Err(e);
            }
        };

        tracing::warn!(error = %mismatch, pooled = client.is_pooled(), "connected to the wrong database");
        let pool = client.pool().cloned();
        client.release().await;
        if let Some(pool) = pool {
            self.registry.invalidate(&pool, "database mismatch");
        }

        let direct = self.connect_direct(config).await?;
        match verify(&direct, &config.database).await {
            Ok(()) => Ok(direct),
            Err(e) => {
                direct.release().await;
                Err(e)
            }
        }
    }

    /// Pooled client if the pool delivers one, otherwise a direct connection
    async fn acquire(&self, config: &ConnectionConfig) -> Result<ManagedClient> {
        match self.checkout(config).await {
            Ok(pooled) => Ok(ManagedClient::Pooled(pooled)),
            Err(e) => {
                tracing::warn!(
                    database = %config.database,
                    error = %e,
                    "pool unavailable, falling back to a direct connection"
                );
                self.connect_direct(config).await
            }
        }
    }

    async fn checkout(&self, config: &ConnectionConfig) -> Result<PooledConnection> {
        let pool = self.registry.get_pool(config).await?;

        let mut attempt = 0;
        loop {
            match pool.get().await {
                Ok(pooled) => return Ok(pooled),
                Err(e) if attempt < self.acquire_retries => {
                    let delay = self.backoff.calculate_delay(attempt);
                    tracing::debug!(attempt, ?delay, error = %e, "checkout failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.registry.invalidate(&pool, "checkout kept failing");
                    return Err(e);
                }
            }
        }
    }

    async fn connect_direct(&self, config: &ConnectionConfig) -> Result<ManagedClient> {
        let connection = self.registry.connector().connect(config, None).await?;
        tracing::debug!(database = %config.database, "opened direct connection");
        Ok(ManagedClient::Direct(connection))
    }
}

async fn verify(client: &ManagedClient, expected: &str) -> Result<()> {
    let result = client.query(VERIFY_QUERY, &[]).await?;
    let actual = result.scalar().and_then(Value::as_str).unwrap_or_default();

    if actual == expected {
        Ok(())
    } else {
        Err(PgnestError::DatabaseMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}
