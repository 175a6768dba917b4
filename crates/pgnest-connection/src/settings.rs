//! Service settings loaded from TOML

use std::path::Path;
use std::time::Duration;

use pgnest_core::{DEFAULT_APPLICATION_NAME, PgnestError, Result, TlsMode};
use serde::{Deserialize, Serialize};

use crate::backoff::BackoffStrategy;
use crate::health::{HealthConfig, HealthThresholds};
use crate::pool::PoolConfig;
use crate::registry::RegistrySettings;
use crate::resolver::{DatabaseFallbackPolicy, ResolverSettings};

/// Everything the connection layer can be tuned with.
///
/// Every key is optional; missing keys take their defaults.
///
/// ```toml
/// proxy_port = 5432
/// fallback_policy = "strict"
///
/// [pool]
/// max_size = 4
///
/// [retry]
/// acquire_retries = 1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Port the local proxy listens on
    pub proxy_port: u16,
    pub application_name: String,
    pub fallback_policy: DatabaseFallbackPolicy,
    pub tls_mode: TlsMode,
    pub pool: PoolSettings,
    pub retry: RetrySettings,
    pub health: HealthSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            proxy_port: 5432,
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            fallback_policy: DatabaseFallbackPolicy::default(),
            tls_mode: TlsMode::Require,
            pool: PoolSettings::default(),
            retry: RetrySettings::default(),
            health: HealthSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_size: usize,
    pub min_size: usize,
    pub idle_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_size: 0,
            idle_timeout_ms: 30_000,
            acquire_timeout_ms: 5_000,
            connect_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Extra `pool.get()` attempts before falling back to a direct connection
    pub acquire_retries: u32,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    /// Polls of a key that is shutting down before giving up on its pool
    pub teardown_wait_attempts: u32,
    pub ended_grace_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            acquire_retries: 2,
            backoff_initial_ms: 50,
            backoff_max_ms: 1_000,
            teardown_wait_attempts: 8,
            ended_grace_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub ping_timeout_ms: u64,
    pub healthy_ms: u64,
    pub degraded_ms: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            ping_timeout_ms: 5_000,
            healthy_ms: 100,
            degraded_ms: 500,
        }
    }
}

impl ServiceSettings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)
            .map_err(|e| PgnestError::Configuration(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            PgnestError::Configuration(msg) => {
                PgnestError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PgnestError::Configuration(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.proxy_port == 0 {
            return Err(PgnestError::Configuration(
                "proxy_port must be greater than 0".to_string(),
            ));
        }
        self.pool_config().map(|_| ())
    }

    pub fn pool_config(&self) -> Result<PoolConfig> {
        Ok(PoolConfig::try_new(self.pool.min_size, self.pool.max_size)?
            .with_acquire_timeout_ms(self.pool.acquire_timeout_ms)
            .with_idle_timeout_ms(self.pool.idle_timeout_ms))
    }

    /// Backoff between acquire retries and between teardown polls
    pub fn backoff(&self) -> BackoffStrategy {
        BackoffStrategy::new(self.retry.backoff_initial_ms, self.retry.backoff_max_ms)
    }

    pub fn registry_settings(&self) -> Result<RegistrySettings> {
        Ok(RegistrySettings {
            pool: self.pool_config()?,
            wait_backoff: self.backoff(),
            wait_attempts: self.retry.teardown_wait_attempts,
            ended_grace: Duration::from_millis(self.retry.ended_grace_ms),
        })
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            port: self.proxy_port,
            application_name: self.application_name.clone(),
            connect_timeout: Duration::from_millis(self.pool.connect_timeout_ms),
            tls_mode: self.tls_mode,
            fallback_policy: self.fallback_policy,
        }
    }

    pub fn health_config(&self) -> HealthConfig {
        HealthConfig {
            ping_timeout: Duration::from_millis(self.health.ping_timeout_ms),
            thresholds: HealthThresholds::new(self.health.healthy_ms, self.health.degraded_ms),
        }
    }
}
