//! One pool per logical database, with an explicit teardown lifecycle

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pgnest_core::{
    Connection, ConnectionConfig, Connector, ErrorListener, PgnestError, Result,
};
use serde::Serialize;
use tokio::time::Instant;

use crate::backoff::BackoffStrategy;
use crate::pool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolStats};

/// Lifecycle of a registry entry; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Active,
    /// Teardown started; the pool is no longer handed out
    Ending,
    /// Teardown finished; the key stays reserved until the grace period passes
    Ended,
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub pool: PoolConfig,
    /// Delay between polls while a key is ending
    pub wait_backoff: BackoffStrategy,
    pub wait_attempts: u32,
    /// How long an ended key blocks recreation
    pub ended_grace: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            wait_backoff: BackoffStrategy::default(),
            wait_attempts: 8,
            ended_grace: Duration::from_millis(250),
        }
    }
}

struct PoolEntry {
    pool: Arc<ConnectionPool>,
    state: PoolState,
    generation: u64,
    config: ConnectionConfig,
    ended_at: Option<Instant>,
}

enum Lookup {
    Ready(Arc<ConnectionPool>),
    /// The active pool was built for different connection parameters
    Stale(u64),
    Wait,
}

struct RegistryInner {
    connector: Arc<dyn Connector>,
    settings: RegistrySettings,
    entries: Mutex<HashMap<String, PoolEntry>>,
    next_generation: AtomicU64,
}

/// Keyed pool registry.
///
/// At most one non-ended pool exists per key. Pools are created lazily by
/// [`get_pool`](PoolRegistry::get_pool) and torn down on explicit close, on
/// a background connection error, or when the parameters for their key
/// change. Cloning the registry shares its state.
#[derive(Clone)]
pub struct PoolRegistry {
    inner: Arc<RegistryInner>,
}

impl PoolRegistry {
    pub fn new(connector: Arc<dyn Connector>, settings: RegistrySettings) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connector,
                settings,
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.inner.connector
    }

    /// Active pool for `config.database`, created on first use.
    ///
    /// While the key is being torn down (or within the grace period after)
    /// this polls with backoff, then gives up with
    /// [`PgnestError::PoolAcquisition`]. A pool mid-teardown is never
    /// returned.
    #[tracing::instrument(skip(self, config), fields(database = %config.database))]
    pub async fn get_pool(&self, config: &ConnectionConfig) -> Result<Arc<ConnectionPool>> {
        let key = config.database.as_str();
        let settings = &self.inner.settings;

        for attempt in 0..=settings.wait_attempts {
            match self.inner.lookup_or_create(key, config) {
                Lookup::Ready(pool) => return Ok(pool),
                Lookup::Stale(generation) => {
                    tracing::info!(generation, "connection parameters changed, replacing pool");
                    self.inner
                        .begin_teardown(key, generation, "connection parameters changed");
                    continue;
                }
                Lookup::Wait => {}
            }

            if attempt < settings.wait_attempts {
                let delay = settings.wait_backoff.calculate_delay(attempt);
                tracing::debug!(attempt, ?delay, "pool is shutting down, waiting");
                tokio::time::sleep(delay).await;
            }
        }

        Err(PgnestError::PoolAcquisition(format!(
            "pool for {key} is still shutting down"
        )))
    }

    /// Start tearing down `pool` if it is still the active pool for its key.
    /// Returns immediately; the close runs in the background.
    pub fn invalidate(&self, pool: &Arc<ConnectionPool>, reason: &str) -> bool {
        let generation = {
            let entries = self.inner.entries.lock();
            match entries.get(pool.key()) {
                Some(entry) if Arc::ptr_eq(&entry.pool, pool) => entry.generation,
                _ => return false,
            }
        };
        self.inner.begin_teardown(pool.key(), generation, reason)
    }

    /// Tear down the pool for `key` and wait for it to close.
    /// No-op if the key has no active pool.
    #[tracing::instrument(skip(self))]
    pub async fn close_pool(&self, key: &str) {
        let Some((pool, generation)) = self.inner.mark_ending(key, "closed by request") else {
            return;
        };
        self.inner.finish_teardown(key, generation, pool).await;
    }

    pub async fn close_all(&self) {
        let keys = self.keys();
        futures::future::join_all(keys.iter().map(|key| self.close_pool(key))).await;
        tracing::debug!(count = keys.len(), "closed all pools");
    }

    /// Keys with an active pool, sorted
    pub fn keys(&self) -> Vec<String> {
        let entries = self.inner.entries.lock();
        let mut keys: Vec<_> = entries
            .iter()
            .filter(|(_, entry)| entry.state == PoolState::Active)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Active pools, sorted by key
    pub fn active_pools(&self) -> Vec<(String, Arc<ConnectionPool>)> {
        let entries = self.inner.entries.lock();
        let mut pools: Vec<_> = entries
            .iter()
            .filter(|(_, entry)| entry.state == PoolState::Active)
            .map(|(key, entry)| (key.clone(), Arc::clone(&entry.pool)))
            .collect();
        pools.sort_by(|a, b| a.0.cmp(&b.0));
        pools
    }

    pub fn stats(&self) -> Vec<(String, PoolStats)> {
        self.active_pools()
            .into_iter()
            .map(|(key, pool)| (key, pool.stats()))
            .collect()
    }

    pub fn state(&self, key: &str) -> Option<PoolState> {
        self.inner.entries.lock().get(key).map(|entry| entry.state)
    }

    pub fn generation(&self, key: &str) -> Option<u64> {
        self.inner.entries.lock().get(key).map(|entry| entry.generation)
    }
}

impl RegistryInner {
    /// Decide what a request for `key` gets. Runs entirely under the lock
    /// with no suspension point, so concurrent first requests agree on one
    /// pool.
    fn lookup_or_create(self: &Arc<Self>, key: &str, config: &ConnectionConfig) -> Lookup {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get(key) {
            match entry.state {
                PoolState::Active if entry.config == *config => {
                    return Lookup::Ready(Arc::clone(&entry.pool));
                }
                PoolState::Active => return Lookup::Stale(entry.generation),
                PoolState::Ending => return Lookup::Wait,
                PoolState::Ended => {
                    let within_grace = entry
                        .ended_at
                        .is_some_and(|ended_at| ended_at.elapsed() < self.settings.ended_grace);
                    if within_grace {
                        return Lookup::Wait;
                    }
                    entries.remove(key);
                }
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let factory = RegistryConnectionFactory {
            connector: Arc::clone(&self.connector),
            config: config.clone(),
            listener: self.error_listener(key, generation),
        };
        let pool = Arc::new(ConnectionPool::new(
            key,
            self.settings.pool.clone(),
            factory,
        ));

        entries.insert(
            key.to_string(),
            PoolEntry {
                pool: Arc::clone(&pool),
                state: PoolState::Active,
                generation,
                config: config.clone(),
                ended_at: None,
            },
        );
        tracing::debug!(database = key, generation, "created pool");

        Lookup::Ready(pool)
    }

    /// Listener handed to every connection of one pool generation. It holds
    /// the registry weakly and ignores reports for replaced generations.
    fn error_listener(self: &Arc<Self>, key: &str, generation: u64) -> ErrorListener {
        let registry: Weak<RegistryInner> = Arc::downgrade(self);
        let key = key.to_string();
        Arc::new(move |error: &PgnestError| {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            tracing::warn!(database = %key, generation, error = %error, "pool connection failed in the background");
            registry.begin_teardown(&key, generation, "background connection error");
        })
    }

    /// Move the entry to `Ending` if it is the active entry of `generation`
    fn mark_generation_ending(
        &self,
        key: &str,
        generation: u64,
    ) -> Option<Arc<ConnectionPool>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(key)?;
        if entry.generation != generation || entry.state != PoolState::Active {
            return None;
        }
        entry.state = PoolState::Ending;
        Some(Arc::clone(&entry.pool))
    }

    fn mark_ending(&self, key: &str, reason: &str) -> Option<(Arc<ConnectionPool>, u64)> {
        let generation = {
            let entries = self.entries.lock();
            let entry = entries.get(key)?;
            if entry.state != PoolState::Active {
                return None;
            }
            entry.generation
        };
        let pool = self.mark_generation_ending(key, generation)?;
        tracing::debug!(database = key, generation, reason, "pool ending");
        Some((pool, generation))
    }

    /// Start teardown in the background. Returns false if the generation is
    /// no longer the active one.
    fn begin_teardown(self: &Arc<Self>, key: &str, generation: u64, reason: &str) -> bool {
        let Some(pool) = self.mark_generation_ending(key, generation) else {
            return false;
        };
        tracing::debug!(database = key, generation, reason, "pool ending");

        let inner = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            inner.finish_teardown(&key, generation, pool).await;
        });
        true
    }

    async fn finish_teardown(&self, key: &str, generation: u64, pool: Arc<ConnectionPool>) {
        pool.close().await;

        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key)
            && entry.generation == generation
        {
            entry.state = PoolState::Ended;
            entry.ended_at = Some(Instant::now());
            tracing::debug!(database = key, generation, "pool ended");
        }
    }
}

/// Opens pool connections with the pool generation's error listener attached
struct RegistryConnectionFactory {
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    listener: ErrorListener,
}

#[async_trait]
impl ConnectionFactory for RegistryConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        self.connector
            .connect(&self.config, Some(Arc::clone(&self.listener)))
            .await
    }
}
