//! Transport security settings shared by connectors

use crate::{PgnestError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// TLS/SSL mode, named after the libpq `sslmode` values it maps to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// Plain TCP; only suitable for local proxies and test servers
    Disable,
    /// Try TLS first, fall back to unencrypted if the server refuses
    Prefer,
    /// Fail the connection unless TLS is negotiated
    #[default]
    Require,
}

impl TlsMode {
    pub fn uses_tls(self) -> bool {
        self != TlsMode::Disable
    }
}

/// Transport security for one connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TlsConfig {
    pub mode: TlsMode,
    /// Verify the server certificate chain and host name
    #[serde(default)]
    pub verify_server: bool,
    /// Extra root certificate (PEM) trusted when verifying the server
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self::require()
    }
}

impl TlsConfig {
    pub fn new(mode: TlsMode) -> Self {
        Self {
            mode,
            verify_server: false,
            ca_cert: None,
        }
    }

    pub fn disabled() -> Self {
        Self::new(TlsMode::Disable)
    }

    /// Encrypted transport without certificate verification
    pub fn require() -> Self {
        Self::new(TlsMode::Require)
    }

    pub fn verify_server(mut self, verify: bool) -> Self {
        self.verify_server = verify;
        self
    }

    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Reject combinations the driver cannot honour
    pub fn validate(&self) -> Result<()> {
        let problem = match (&self.ca_cert, self.verify_server) {
            (_, true) if !self.mode.uses_tls() => {
                Some("server verification requested but TLS is disabled")
            }
            (Some(path), _) if path.as_os_str().is_empty() => {
                Some("CA certificate path cannot be empty")
            }
            (Some(_), false) => Some("CA certificate provided but server verification is off"),
            _ => None,
        };

        match problem {
            Some(message) => Err(PgnestError::Configuration(message.to_string())),
            None => Ok(()),
        }
    }
}
