//! Common test utilities: an in-process stand-in for the local proxy

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pgnest_connection::{BranchConnectionInfo, ConnectionService, ServiceSettings, SessionState};
use pgnest_core::{
    Connection, ConnectionConfig, ConnectionErrorKind, Connector, ErrorListener, PgnestError,
    QueryResult, Result, Row, Value,
};

/// Fake Postgres behind a proxy that can be stopped and restarted.
///
/// Connections opened before a restart are dead afterwards: their next
/// statement fails the way a reset socket does.
#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<ServerState>,
}

#[derive(Default)]
struct ServerState {
    stopped: AtomicBool,
    /// Bumped on every restart; connections from older epochs are dead
    epoch: AtomicUsize,
    pooled_connects: AtomicUsize,
    direct_connects: AtomicUsize,
    listeners: Mutex<Vec<ErrorListener>>,
    connect_delay: Mutex<Option<Duration>>,
    statements: Mutex<Vec<String>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(FakeConnector {
            state: Arc::clone(&self.state),
        })
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *self.state.connect_delay.lock() = Some(delay);
        self
    }

    pub fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        self.state.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn start(&self) {
        self.state.stopped.store(false, Ordering::SeqCst);
    }

    /// Restart without telling anyone; existing sockets die silently
    pub fn restart_silently(&self) {
        self.state.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Restart and deliver the backend termination to pool listeners
    pub fn restart(&self) {
        self.restart_silently();
        let listeners = std::mem::take(&mut *self.state.listeners.lock());
        for listener in listeners {
            listener(&PgnestError::connection(
                ConnectionErrorKind::Reset,
                "terminating connection due to administrator command",
            ));
        }
    }

    pub fn pooled_connects(&self) -> usize {
        self.state.pooled_connects.load(Ordering::SeqCst)
    }

    pub fn direct_connects(&self) -> usize {
        self.state.direct_connects.load(Ordering::SeqCst)
    }

    pub fn executed(&self, sql: &str) -> usize {
        self.state.statements.lock().iter().filter(|s| *s == sql).count()
    }
}

struct FakeConnector {
    state: Arc<ServerState>,
}

#[async_trait]
impl Connector for FakeConnector {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn connect(
        &self,
        config: &ConnectionConfig,
        on_error: Option<ErrorListener>,
    ) -> Result<Arc<dyn Connection>> {
        let delay = *self.state.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.stopped.load(Ordering::SeqCst) {
            return Err(PgnestError::connection(
                ConnectionErrorKind::Refused,
                format!("connect ECONNREFUSED {}", config.endpoint()),
            ));
        }

        match on_error {
            Some(listener) => {
                self.state.pooled_connects.fetch_add(1, Ordering::SeqCst);
                self.state.listeners.lock().push(listener);
            }
            None => {
                self.state.direct_connects.fetch_add(1, Ordering::SeqCst);
            }
        }

        Ok(Arc::new(FakeConnection {
            database: config.database.clone(),
            epoch: self.state.epoch.load(Ordering::SeqCst),
            closed: AtomicBool::new(false),
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeConnection {
    database: String,
    epoch: usize,
    closed: AtomicBool,
    state: Arc<ServerState>,
}

#[async_trait]
impl Connection for FakeConnection {
    fn driver_name(&self) -> &str {
        "fake"
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PgnestError::connection(
                ConnectionErrorKind::Closed,
                "Client was closed and is not queryable",
            ));
        }
        if self.epoch != self.state.epoch.load(Ordering::SeqCst) {
            return Err(PgnestError::connection(
                ConnectionErrorKind::Reset,
                "read ECONNRESET",
            ));
        }

        self.state.statements.lock().push(sql.to_string());

        let trimmed = sql.trim_start().to_ascii_uppercase();
        if trimmed == "SELECT CURRENT_DATABASE()" {
            return Ok(single("current_database", Value::from(self.database.as_str())));
        }
        if trimmed == "SELECT 1" {
            return Ok(single("?column?", Value::Int32(1)));
        }
        if trimmed.starts_with("UPDATE") || trimmed.starts_with("DELETE") {
            return Ok(QueryResult::empty());
        }
        if trimmed.starts_with("SELECT") {
            return Ok(QueryResult::empty());
        }

        let token = sql.split_whitespace().next().unwrap_or_default();
        Err(PgnestError::query(
            format!("syntax error at or near \"{token}\""),
            Some("42601".to_string()),
        ))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn single(column: &str, value: Value) -> QueryResult {
    let columns: Arc<[String]> = Arc::from(vec![column.to_string()]);
    let mut result = QueryResult::empty();
    result.rows.push(Row::new(columns, vec![value]));
    result.row_count = 1;
    result
}

pub fn identity(database: &str) -> BranchConnectionInfo {
    BranchConnectionInfo {
        host: "localhost".to_string(),
        database: database.to_string(),
        user: "neon".to_string(),
        password: "neon".to_string(),
    }
}

/// Session connected to a branch with `databases`, the first one selected
pub fn branch_session(databases: &[&str]) -> Arc<SessionState> {
    let session = SessionState::new();
    session.connect(databases.iter().map(|db| identity(db)).collect());
    session.select_database(databases.first().map(|db| db.to_string()));
    Arc::new(session)
}

pub fn service_with(
    server: &FakeServer,
    session: Arc<SessionState>,
    settings: &ServiceSettings,
) -> ConnectionService {
    ConnectionService::new(settings, session, server.connector()).expect("valid settings")
}

pub fn service(server: &FakeServer) -> ConnectionService {
    service_with(
        server,
        branch_session(&["neondb", "analytics"]),
        &ServiceSettings::default(),
    )
}
