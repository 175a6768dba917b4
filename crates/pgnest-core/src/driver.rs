//! Connector trait and connection configuration

use crate::{Connection, ErrorListener, Result, TlsConfig};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_APPLICATION_NAME: &str = "pgnest";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to dial one database as one identity.
///
/// Derived from the session on every attempt and never persisted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub tls: TlsConfig,
    /// Reported to the server as `application_name`
    pub application_name: String,
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
            password: None,
            tls: TlsConfig::default(),
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `user@host:port/database`, safe to log
    pub fn endpoint(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls)
            .field("application_name", &self.application_name)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Opens connections for a `ConnectionConfig`
#[async_trait]
pub trait Connector: Send + Sync {
    /// Driver identifier, e.g. "postgres"
    fn name(&self) -> &'static str;

    /// Open a new connection.
    ///
    /// `on_error` is invoked at most once if the connection later fails in
    /// the background; pooled connections register one, one-off connections
    /// usually don't.
    async fn connect(
        &self,
        config: &ConnectionConfig,
        on_error: Option<ErrorListener>,
    ) -> Result<Arc<dyn Connection>>;
}
