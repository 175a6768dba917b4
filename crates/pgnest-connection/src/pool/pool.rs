//! Connection pool implementation

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use pgnest_core::{Connection, PgnestError, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use super::config::PoolConfig;
use super::stats::PoolStats;

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Whether an idle connection may be handed out again
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

struct IdleConnection {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    idle_since: Instant,
}

/// A bounded set of connections to one database.
///
/// Connections are created on demand up to `max_size` and go back to the
/// idle queue when their [`PooledConnection`] is dropped. Once
/// [`close`](ConnectionPool::close) has been called the pool hands out
/// nothing and drops returned connections.
pub struct ConnectionPool {
    /// Registry key, the logical database name
    key: String,
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    idle: Mutex<VecDeque<IdleConnection>>,
    /// One permit per connection slot
    semaphore: Arc<Semaphore>,
    active_count: AtomicUsize,
    waiting_count: AtomicUsize,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new<F: ConnectionFactory>(key: impl Into<String>, config: PoolConfig, factory: F) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size()));
        Self {
            key: key.into(),
            config,
            factory: Arc::new(factory),
            idle: Mutex::new(VecDeque::new()),
            semaphore,
            active_count: AtomicUsize::new(0),
            waiting_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Check out a connection.
    ///
    /// Reuses a valid idle connection if there is one, otherwise opens a new
    /// one while under `max_size`, otherwise waits for a checkout to be
    /// returned. Waiting longer than the acquire timeout, or a pool that is
    /// closed, fails with [`PgnestError::PoolAcquisition`]. Failures to open
    /// a connection are returned as the connector reported them.
    pub async fn get(self: &Arc<Self>) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        self.waiting_count.fetch_add(1, Ordering::SeqCst);
        let result = tokio::time::timeout(self.config.acquire_timeout(), self.checkout()).await;
        self.waiting_count.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(checkout) => checkout,
            Err(_) => Err(PgnestError::PoolAcquisition(format!(
                "timed out waiting for a connection to {} (timeout: {:?})",
                self.key,
                self.config.acquire_timeout()
            ))),
        }
    }

    async fn checkout(self: &Arc<Self>) -> Result<PooledConnection> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| self.closed_error())?;

        let (connection, created_at) = match self.try_get_idle().await {
            Some(reused) => reused,
            None => (self.factory.create().await?, Instant::now()),
        };

        if self.is_closed() {
            let _ = connection.close().await;
            return Err(self.closed_error());
        }

        self.active_count.fetch_add(1, Ordering::SeqCst);

        Ok(PooledConnection {
            connection,
            created_at,
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Pop idle connections until one is young enough and still valid
    async fn try_get_idle(&self) -> Option<(Arc<dyn Connection>, Instant)> {
        loop {
            let idle = { self.idle.lock().pop_front() }?;

            let expired = self
                .config
                .max_lifetime()
                .is_some_and(|max_lifetime| idle.created_at.elapsed() > max_lifetime)
                || idle.idle_since.elapsed() > self.config.idle_timeout();

            if expired || !self.factory.validate(&*idle.connection).await {
                let _ = idle.connection.close().await;
                continue;
            }

            return Some((idle.connection, idle.created_at));
        }
    }

    fn return_connection(&self, connection: Arc<dyn Connection>, created_at: Instant) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);

        if self.is_closed() || connection.is_closed() {
            tracing::debug!(pool = %self.key, "dropping returned connection");
            return;
        }

        self.idle.lock().push_back(IdleConnection {
            connection,
            created_at,
            idle_since: Instant::now(),
        });
    }

    /// Close idle connections past the idle timeout, keeping `min_size`.
    /// Returns how many were closed.
    pub async fn evict_expired(&self) -> usize {
        let expired: Vec<_> = {
            let mut idle = self.idle.lock();
            let keep = self.config.min_size();
            let mut expired = Vec::new();
            let mut index = 0;
            while index < idle.len() && idle.len() > keep {
                if idle[index].idle_since.elapsed() > self.config.idle_timeout() {
                    expired.extend(idle.remove(index));
                } else {
                    index += 1;
                }
            }
            expired
        };

        let count = expired.len();
        for idle in expired {
            let _ = idle.connection.close().await;
        }
        count
    }

    /// Stop handing out connections and close the idle ones.
    ///
    /// Checked-out connections are dropped when they are returned.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.semaphore.close();
        self.close_idle().await;
        tracing::debug!(pool = %self.key, "pool closed");
    }

    pub async fn close_idle(&self) {
        let connections: Vec<_> = { self.idle.lock().drain(..).collect() };
        for idle in connections {
            let _ = idle.connection.close().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self.idle.lock().len();
        let active = self.active_count.load(Ordering::SeqCst);
        let waiting = self.waiting_count.load(Ordering::SeqCst);
        PoolStats::new(idle, active, waiting)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn closed_error(&self) -> PgnestError {
        PgnestError::PoolAcquisition(format!("pool for {} is closed", self.key))
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("key", &self.key)
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A connection checked out of a pool.
///
/// Dropping it returns the connection to the pool.
pub struct PooledConnection {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.pool
            .return_connection(Arc::clone(&self.connection), self.created_at);
    }
}
