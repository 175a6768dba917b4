//! PostgreSQL connector

use async_trait::async_trait;
use pgnest_core::{Connection, ConnectionConfig, Connector, ErrorListener, Result};
use std::sync::Arc;

use crate::PostgresConnection;

/// Opens tokio-postgres connections
#[derive(Debug, Clone, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    pub fn new() -> Self {
        tracing::debug!("PostgreSQL connector initialized");
        Self
    }

    /// Open a connection, run `SELECT 1` and close it again
    #[tracing::instrument(skip(self, config), fields(endpoint = %config.endpoint()))]
    pub async fn test_connection(&self, config: &ConnectionConfig) -> Result<()> {
        tracing::debug!("testing PostgreSQL connection");
        let conn = PostgresConnection::connect(config, None).await?;
        let outcome = conn.query("SELECT 1", &[]).await.map(|_| ());
        conn.close().await?;
        outcome
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn name(&self) -> &'static str {
        "postgres"
    }

    #[tracing::instrument(skip(self, config, on_error), fields(endpoint = %config.endpoint(), listener = on_error.is_some()))]
    async fn connect(
        &self,
        config: &ConnectionConfig,
        on_error: Option<ErrorListener>,
    ) -> Result<Arc<dyn Connection>> {
        let conn = PostgresConnection::connect(config, on_error).await?;
        Ok(Arc::new(conn))
    }
}
