//! The CLI's settings file: service settings plus the branch session

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use pgnest_connection::{BranchConnectionInfo, ServiceSettings, SessionState};
use serde::{Deserialize, Serialize};

/// Contents of `config.toml`.
///
/// Service keys sit at the top level; the session lives under `[session]`
/// with one `[[session.identities]]` table per database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(flatten)]
    pub service: ServiceSettings,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connected: bool,
    pub selected_database: Option<String>,
    pub identities: Vec<BranchConnectionInfo>,
}

impl SessionConfig {
    pub fn to_session(&self) -> Arc<SessionState> {
        let session = SessionState::new();
        if self.connected {
            session.connect(self.identities.clone());
            session.select_database(self.selected_database.clone());
        }
        Arc::new(session)
    }
}

impl CliConfig {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.service.validate()?;
        Ok(config)
    }

    /// Load `path`, or the default location when `None`.
    ///
    /// A missing default file yields the default (disconnected) config; a
    /// missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (default_path(), false),
        };

        if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config in {}", path.display()))
    }
}

pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pgnest")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgnest_connection::{DatabaseFallbackPolicy, SessionSource};
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
proxy_port = 55432
fallback_policy = "strict"

[pool]
max_size = 4

[session]
connected = true
selected_database = "analytics"

[[session.identities]]
host = "localhost"
database = "neondb"
user = "neon"
password = "npg"

[[session.identities]]
host = "localhost"
database = "analytics"
user = "neon"
password = "npg"
"#;

    #[test]
    fn test_parse_service_and_session() {
        let config = CliConfig::parse(SAMPLE).unwrap();

        assert_eq!(config.service.proxy_port, 55432);
        assert_eq!(config.service.fallback_policy, DatabaseFallbackPolicy::Strict);
        assert_eq!(config.service.pool.max_size, 4);
        assert_eq!(config.service.pool.idle_timeout_ms, 30_000);

        let session = config.session.to_session();
        assert!(session.is_connected());
        assert_eq!(session.selected_database().as_deref(), Some("analytics"));
        assert_eq!(session.connection_infos()[0].database, "neondb");
    }

    #[test]
    fn test_disconnected_session_ignores_identities() {
        let config = CliConfig::parse(&SAMPLE.replace("connected = true", "connected = false"))
            .unwrap();
        let session = config.session.to_session();

        assert!(!session.is_connected());
        assert!(session.connection_infos().is_empty());
    }

    #[test]
    fn test_invalid_pool_is_rejected() {
        assert!(CliConfig::parse("[pool]\nmax_size = 0\n").is_err());
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = CliConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.session.identities.len(), 2);
    }
}
