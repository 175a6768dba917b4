//! Turning a requested database into a dialable `ConnectionConfig`

use std::sync::Arc;
use std::time::Duration;

use pgnest_core::{
    ConnectionConfig, DEFAULT_APPLICATION_NAME, DEFAULT_CONNECT_TIMEOUT, PgnestError, Result,
    TlsConfig, TlsMode,
};
use serde::{Deserialize, Serialize};

use crate::session::{BranchConnectionInfo, SessionSource};

/// What to do when the requested database has no matching identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseFallbackPolicy {
    /// Dial the first candidate's database instead
    #[default]
    Substitute,
    /// Fail with `DatabaseNotFound`
    Strict,
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub port: u16,
    pub application_name: String,
    pub connect_timeout: Duration,
    pub tls_mode: TlsMode,
    pub fallback_policy: DatabaseFallbackPolicy,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            port: 5432,
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tls_mode: TlsMode::Require,
            fallback_policy: DatabaseFallbackPolicy::Substitute,
        }
    }
}

/// Resolves connection parameters from the current session
#[derive(Clone)]
pub struct ConnectionConfigResolver {
    session: Arc<dyn SessionSource>,
    settings: ResolverSettings,
}

impl ConnectionConfigResolver {
    pub fn new(session: Arc<dyn SessionSource>, settings: ResolverSettings) -> Self {
        Self { session, settings }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Build the config for `requested`, or for the selected database when
    /// no name is given.
    ///
    /// The dialed database always comes from a candidate identity, so an
    /// unknown name either resolves to the first candidate (logged) or fails,
    /// depending on the fallback policy.
    pub fn resolve(&self, requested: Option<&str>) -> Result<ConnectionConfig> {
        if !self.session.is_connected() {
            return Err(PgnestError::NotConnected);
        }

        let infos = self.session.connection_infos();
        let Some(first) = infos.first() else {
            return Err(PgnestError::NoConnectionInfo);
        };

        let explicit = requested.filter(|name| !name.is_empty());
        let target = explicit
            .map(str::to_string)
            .or_else(|| self.session.selected_database());

        let info = match target.as_deref() {
            Some(name) => match infos.iter().find(|info| info.database == name) {
                Some(info) => info,
                None if explicit.is_some()
                    && self.settings.fallback_policy == DatabaseFallbackPolicy::Strict =>
                {
                    return Err(PgnestError::DatabaseNotFound(name.to_string()));
                }
                None => {
                    tracing::warn!(
                        requested = name,
                        substitute = %first.database,
                        "database not found on branch, using the first available database"
                    );
                    first
                }
            },
            None => first,
        };

        Ok(self.config_for(info))
    }

    fn config_for(&self, info: &BranchConnectionInfo) -> ConnectionConfig {
        ConnectionConfig::new(
            info.host.clone(),
            self.settings.port,
            info.database.clone(),
            info.user.clone(),
        )
        .with_password(info.password.clone())
        .with_tls(TlsConfig::new(self.settings.tls_mode).verify_server(false))
        .with_application_name(self.settings.application_name.clone())
        .with_connect_timeout(self.settings.connect_timeout)
    }
}
