//! `native-tls` connectors for tokio-postgres

use std::path::Path;

use native_tls::{Certificate, TlsConnector, TlsConnectorBuilder};
use pgnest_core::PgnestError;
use pgnest_core::security::{TlsConfig, TlsMode};
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::config::SslMode;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("TLS is disabled for this connection")]
    Disabled,

    #[error("invalid TLS settings: {0}")]
    InvalidSettings(String),

    #[error("failed to read CA certificate {path}: {source}")]
    ReadCaCert {
        path: String,
        source: std::io::Error,
    },

    #[error("CA certificate is not valid PEM: {0}")]
    ParseCaCert(String),

    #[error("failed to build TLS connector: {0}")]
    Build(String),
}

impl From<TlsError> for PgnestError {
    fn from(error: TlsError) -> Self {
        PgnestError::Configuration(error.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PostgresTlsConnector;

impl PostgresTlsConnector {
    /// Fails for [`TlsMode::Disable`], which connects with `NoTls` instead
    pub fn build(config: &TlsConfig) -> Result<MakeTlsConnector, TlsError> {
        config
            .validate()
            .map_err(|e| TlsError::InvalidSettings(e.to_string()))?;
        if !config.mode.uses_tls() {
            return Err(TlsError::Disabled);
        }

        let mut builder = TlsConnector::builder();
        if !config.verify_server {
            tracing::debug!(mode = ?config.mode, "TLS without certificate verification");
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        if let Some(path) = &config.ca_cert {
            trust_ca_cert(&mut builder, path)?;
        }

        let connector = builder.build().map_err(|e| TlsError::Build(e.to_string()))?;
        Ok(MakeTlsConnector::new(connector))
    }
}

fn trust_ca_cert(builder: &mut TlsConnectorBuilder, path: &Path) -> Result<(), TlsError> {
    let pem = std::fs::read(path).map_err(|source| TlsError::ReadCaCert {
        path: path.display().to_string(),
        source,
    })?;
    let cert = Certificate::from_pem(&pem).map_err(|e| TlsError::ParseCaCert(e.to_string()))?;
    builder.add_root_certificate(cert);
    Ok(())
}

/// libpq `sslmode` spelling, used in logs
pub fn sslmode_name(mode: TlsMode) -> &'static str {
    match mode {
        TlsMode::Disable => "disable",
        TlsMode::Prefer => "prefer",
        TlsMode::Require => "require",
    }
}

pub(crate) fn ssl_mode(mode: TlsMode) -> SslMode {
    match mode {
        TlsMode::Disable => SslMode::Disable,
        TlsMode::Prefer => SslMode::Prefer,
        TlsMode::Require => SslMode::Require,
    }
}
