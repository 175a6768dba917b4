//! Tests for connection pool functionality

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pgnest_core::{Connection, ConnectionErrorKind, PgnestError, Result};

use super::config::PoolConfig;
use super::pool::{ConnectionFactory, ConnectionPool};
use super::stats::PoolStats;
use crate::test_support::MockConnection;

/// Mock factory that counts connections created
struct MockConnectionFactory {
    counter: AtomicUsize,
    fail: AtomicBool,
}

impl MockConnectionFactory {
    fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PgnestError::connection(
                ConnectionErrorKind::Refused,
                "connect ECONNREFUSED",
            ));
        }
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection::standalone("neondb")))
    }
}

fn pool_with(config: PoolConfig, factory: Arc<MockConnectionFactory>) -> Arc<ConnectionPool> {
    Arc::new(ConnectionPool::new("neondb", config, factory))
}

// =============================================================================
// PoolConfig tests
// =============================================================================

#[test]
fn test_pool_config_defaults() {
    let config = PoolConfig::default();
    assert_eq!(config.min_size(), 0);
    assert_eq!(config.max_size(), 10);
    assert_eq!(config.acquire_timeout(), Duration::from_secs(5));
    assert_eq!(config.idle_timeout(), Duration::from_secs(30));
    assert!(config.max_lifetime().is_none());
}

#[test]
fn test_pool_config_with_timeouts() {
    let config = PoolConfig::new(1, 5)
        .with_acquire_timeout_ms(500)
        .with_idle_timeout_ms(60_000)
        .with_max_lifetime_ms(3_600_000);

    assert_eq!(config.acquire_timeout(), Duration::from_millis(500));
    assert_eq!(config.idle_timeout(), Duration::from_millis(60_000));
    assert_eq!(config.max_lifetime(), Some(Duration::from_millis(3_600_000)));
}

#[test]
fn test_pool_config_new_clamps_sizes() {
    let config = PoolConfig::new(0, 0);
    assert_eq!(config.max_size(), 1);

    let config = PoolConfig::new(8, 3);
    assert_eq!((config.min_size(), config.max_size()), (3, 3));
}

#[test]
fn test_pool_config_try_new_reports_configuration_errors() {
    assert!(matches!(
        PoolConfig::try_new(0, 0),
        Err(PgnestError::Configuration(_))
    ));
    assert!(matches!(
        PoolConfig::try_new(10, 5),
        Err(PgnestError::Configuration(msg)) if msg.contains("cannot exceed")
    ));
    assert!(PoolConfig::try_new(0, 1).is_ok());
}

// =============================================================================
// PoolStats tests
// =============================================================================

#[test]
fn test_pool_stats_total_counts_idle_and_active() {
    let stats = PoolStats::new(3, 2, 1);
    assert_eq!(stats.total(), 5);
    assert!(!stats.is_empty());
    assert!(PoolStats::default().is_empty());
    assert_eq!(
        serde_json::to_value(stats).unwrap(),
        serde_json::json!({"total": 5, "idle": 3, "active": 2, "waiting": 1})
    );
}

// =============================================================================
// ConnectionPool tests
// =============================================================================

#[tokio::test]
async fn test_pool_get_connection() {
    let pool = pool_with(PoolConfig::default(), Arc::new(MockConnectionFactory::new()));

    let conn = pool.get().await.expect("get connection");
    assert_eq!(conn.driver_name(), "mock");

    let stats = pool.stats();
    assert_eq!(stats.active(), 1);
    assert_eq!(stats.idle(), 0);
}

#[tokio::test]
async fn test_pool_connection_return_and_reuse() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = pool_with(PoolConfig::default(), factory.clone());

    {
        let _conn = pool.get().await.expect("get connection");
        assert_eq!(pool.stats().active(), 1);
    }

    assert_eq!(pool.stats().active(), 0);
    assert_eq!(pool.stats().idle(), 1);

    let _conn2 = pool.get().await.expect("get connection");
    assert_eq!(factory.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pool_max_size_limit() {
    let config = PoolConfig::new(0, 2).with_acquire_timeout_ms(100);
    let pool = pool_with(config, Arc::new(MockConnectionFactory::new()));

    let conn1 = pool.get().await.expect("get connection 1");
    let conn2 = pool.get().await.expect("get connection 2");
    assert_eq!(pool.stats().active(), 2);

    let err = pool.get().await.err().unwrap();
    assert!(matches!(err, PgnestError::PoolAcquisition(ref msg) if msg.contains("timed out")));
    assert_eq!(pool.stats().waiting(), 0);

    drop(conn1);
    drop(conn2);
}

#[tokio::test]
async fn test_pool_waiter_gets_returned_connection() {
    let config = PoolConfig::new(0, 1).with_acquire_timeout_ms(1_000);
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = pool_with(config, factory.clone());

    let held = pool.get().await.unwrap();
    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.get().await.map(|conn| conn.driver_name().to_string()) })
    };

    while pool.stats().waiting() == 0 {
        tokio::task::yield_now().await;
    }
    drop(held);

    assert_eq!(waiter.await.unwrap().unwrap(), "mock");
    assert_eq!(factory.count(), 1);
}

#[tokio::test]
async fn test_factory_errors_propagate_and_release_waiting_count() {
    let factory = Arc::new(MockConnectionFactory::new());
    factory.fail.store(true, Ordering::SeqCst);
    let pool = pool_with(PoolConfig::default(), factory);

    let err = pool.get().await.err().unwrap();
    assert!(err.is_connection_class());
    assert_eq!(pool.stats(), PoolStats::default());
}

#[tokio::test]
async fn test_closed_connections_are_not_returned() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = pool_with(PoolConfig::default(), factory.clone());

    {
        let conn = pool.get().await.unwrap();
        conn.close().await.unwrap();
    }

    assert_eq!(pool.stats().idle(), 0);
    let _conn = pool.get().await.unwrap();
    assert_eq!(factory.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_idle_connections_expire() {
    let config = PoolConfig::new(0, 5).with_idle_timeout_ms(1_000);
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = pool_with(config, factory.clone());

    drop(pool.get().await.unwrap());
    tokio::time::advance(Duration::from_millis(1_500)).await;

    let _conn = pool.get().await.unwrap();
    assert_eq!(factory.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_evict_expired_keeps_min_size() {
    let config = PoolConfig::new(1, 5).with_idle_timeout_ms(1_000);
    let pool = pool_with(config, Arc::new(MockConnectionFactory::new()));

    {
        let _a = pool.get().await.unwrap();
        let _b = pool.get().await.unwrap();
        let _c = pool.get().await.unwrap();
    }
    assert_eq!(pool.stats().idle(), 3);

    tokio::time::advance(Duration::from_millis(1_500)).await;
    assert_eq!(pool.evict_expired().await, 2);
    assert_eq!(pool.stats().idle(), 1);
}

#[tokio::test]
async fn test_close_rejects_new_checkouts_and_drops_returns() {
    let pool = pool_with(PoolConfig::default(), Arc::new(MockConnectionFactory::new()));

    let held = pool.get().await.unwrap();
    drop(pool.get().await.unwrap());
    assert_eq!(pool.stats().idle(), 1);

    pool.close().await;
    assert!(pool.is_closed());
    assert_eq!(pool.stats().idle(), 0);

    let err = pool.get().await.err().unwrap();
    assert!(matches!(err, PgnestError::PoolAcquisition(ref msg) if msg.contains("closed")));

    drop(held);
    assert_eq!(pool.stats(), PoolStats::default());
}

#[tokio::test]
async fn test_pool_close_idle() {
    let pool = pool_with(PoolConfig::default(), Arc::new(MockConnectionFactory::new()));

    {
        let _conn1 = pool.get().await.expect("get");
        let _conn2 = pool.get().await.expect("get");
    }
    assert_eq!(pool.stats().idle(), 2);

    pool.close_idle().await;
    assert_eq!(pool.stats().idle(), 0);
    assert!(!pool.is_closed());
}
