//! Single-connection round trip

use std::time::Duration;

use pgnest_core::Connection;
use tokio::time::Instant;

pub const PING_QUERY: &str = "SELECT 1";

pub type PingResult = Result<Duration, PingError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PingError {
    #[error("connection is closed")]
    ConnectionClosed,
    #[error("health query failed: {0}")]
    QueryFailed(String),
    #[error("health check timed out")]
    Timeout,
}

/// Time one [`PING_QUERY`] round trip on `conn`
pub async fn ping_connection(conn: &dyn Connection, timeout: Duration) -> PingResult {
    if conn.is_closed() {
        return Err(PingError::ConnectionClosed);
    }

    let started = Instant::now();
    tokio::time::timeout(timeout, conn.query(PING_QUERY, &[]))
        .await
        .map_err(|_| PingError::Timeout)?
        .map_err(|e| PingError::QueryFailed(e.to_string()))?;
    Ok(started.elapsed())
}
