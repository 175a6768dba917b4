//! Docker container management for integration tests.
//!
//! The container is started lazily by the first test that asks for it and
//! cached for the rest of the run.

use std::time::Duration;

use anyhow::Context;
use once_cell::sync::Lazy;
use pgnest_core::{Connection, ConnectionConfig, TlsConfig};
use pgnest_driver_postgres::PostgresConnection;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::Mutex;

/// Where the test server listens and how to log in
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

/// Databases created in the container, the first is the image default
pub const DATABASES: [&str; 2] = ["postgres", "analytics"];

struct PostgresContainer {
    #[allow(dead_code)]
    inner: ContainerAsync<Postgres>,
    info: ContainerInfo,
}

static POSTGRES_CONTAINER: Lazy<Mutex<Option<PostgresContainer>>> =
    Lazy::new(|| Mutex::new(None));

impl ContainerInfo {
    pub fn config(&self, database: &str) -> ConnectionConfig {
        ConnectionConfig::new(self.host.clone(), self.port, database, self.user.clone())
            .with_password(self.password.clone())
            .with_tls(TlsConfig::disabled())
            .with_connect_timeout(Duration::from_secs(5))
    }
}

/// Start the shared container if needed and return its address
pub async fn postgres_container() -> anyhow::Result<ContainerInfo> {
    let mut guard = POSTGRES_CONTAINER.lock().await;
    if let Some(container) = guard.as_ref() {
        return Ok(container.info.clone());
    }

    tracing::info!("starting PostgreSQL test container");
    let inner = Postgres::default()
        .start()
        .await
        .context("failed to start PostgreSQL container")?;

    let info = ContainerInfo {
        host: inner.get_host().await?.to_string(),
        port: inner.get_host_port_ipv4(5432).await?,
        user: "postgres".to_string(),
        password: "postgres".to_string(),
    };

    init_databases(&info).await?;

    *guard = Some(PostgresContainer {
        inner,
        info: info.clone(),
    });
    Ok(info)
}

async fn init_databases(info: &ContainerInfo) -> anyhow::Result<()> {
    let config = info.config(DATABASES[0]);

    // The server may accept TCP before it accepts logins
    let mut attempt = 0;
    let conn = loop {
        match PostgresConnection::connect(&config, None).await {
            Ok(conn) => break conn,
            Err(e) if attempt < 10 => {
                attempt += 1;
                tracing::warn!(attempt, error = %e, "PostgreSQL not ready, retrying");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => return Err(e).context("PostgreSQL never became ready"),
        }
    };

    for database in &DATABASES[1..] {
        conn.query(&format!("CREATE DATABASE {database}"), &[])
            .await
            .with_context(|| format!("failed to create database {database}"))?;
    }
    conn.close().await?;

    tracing::info!(databases = ?DATABASES, "PostgreSQL test container ready");
    Ok(())
}
