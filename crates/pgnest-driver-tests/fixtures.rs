//! Test fixtures shared by the Docker-backed tests.
//!
//! ```rust,ignore
//! use pgnest_driver_tests::fixtures::{test_connection, test_service};
//! use rstest::rstest;
//!
//! #[rstest]
//! #[case::postgres("postgres")]
//! #[case::analytics("analytics")]
//! #[tokio::test]
//! async fn test_select(#[case] database: &str) -> anyhow::Result<()> {
//!     let conn = test_connection(database).await?;
//!     assert_eq!(conn.query("SELECT 1", &[]).await?.row_count, 1);
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Once};

use anyhow::Context;
use pgnest_connection::{BranchConnectionInfo, ConnectionService, ServiceSettings, SessionState};
use pgnest_core::{Connection, Connector, ErrorListener, TlsMode};
use pgnest_driver_postgres::PostgresConnector;

use crate::test_containers::{ContainerInfo, DATABASES, postgres_container};

static TRACING: Once = Once::new();

/// Route test logs through the test harness; RUST_LOG selects the level
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A fresh connection to `database` on the test server
pub async fn test_connection(database: &str) -> anyhow::Result<Arc<dyn Connection>> {
    connect(database, None).await
}

pub async fn connect(
    database: &str,
    on_error: Option<ErrorListener>,
) -> anyhow::Result<Arc<dyn Connection>> {
    init_tracing();
    let info = postgres_container().await?;
    PostgresConnector::new()
        .connect(&info.config(database), on_error)
        .await
        .with_context(|| format!("failed to connect to {database}"))
}

pub fn identities(info: &ContainerInfo) -> Vec<BranchConnectionInfo> {
    DATABASES
        .iter()
        .map(|database| BranchConnectionInfo {
            host: info.host.clone(),
            database: database.to_string(),
            user: info.user.clone(),
            password: info.password.clone(),
        })
        .collect()
}

/// Settings that reach the test server: its mapped port, no TLS
pub fn settings_for(info: &ContainerInfo) -> ServiceSettings {
    ServiceSettings {
        proxy_port: info.port,
        application_name: "pgnest-driver-tests".to_string(),
        tls_mode: TlsMode::Disable,
        ..ServiceSettings::default()
    }
}

/// A service whose session is connected to every test database
pub async fn test_service() -> anyhow::Result<ConnectionService> {
    test_service_with(|_| {}).await
}

pub async fn test_service_with(
    customize: impl FnOnce(&mut ServiceSettings),
) -> anyhow::Result<ConnectionService> {
    init_tracing();
    let info = postgres_container().await?;

    let session = SessionState::new();
    session.connect(identities(&info));
    session.select_database(Some(DATABASES[0].to_string()));

    let mut settings = settings_for(&info);
    customize(&mut settings);

    Ok(ConnectionService::new(
        &settings,
        Arc::new(session),
        Arc::new(PostgresConnector::new()),
    )?)
}
