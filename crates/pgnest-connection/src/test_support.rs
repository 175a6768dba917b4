//! Mock connector and connections for unit tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pgnest_core::{
    Connection, ConnectionConfig, ConnectionErrorKind, Connector, ErrorListener, PgnestError,
    QueryResult, Result, Row, Value,
};

use crate::session::{BranchConnectionInfo, SessionState};

/// Observable state shared by a [`MockConnector`] and every connection it opens
#[derive(Default)]
pub(crate) struct MockState {
    pub pooled_connects: AtomicUsize,
    pub direct_connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub statements: Mutex<Vec<String>>,
    /// Errors returned by the next non-verification statements, in order
    pub statement_failures: Mutex<VecDeque<PgnestError>>,
    /// Errors returned by the next `current_database()` checks, in order
    pub verify_failures: Mutex<VecDeque<PgnestError>>,
    /// Fail every connect that registers an error listener (pooled connects)
    pub fail_pooled_connects: AtomicBool,
    /// Database reported by `current_database()` on pooled connections
    pub pooled_database_override: Mutex<Option<String>>,
    /// Database reported by `current_database()` on direct connections
    pub direct_database_override: Mutex<Option<String>>,
    pub listeners: Mutex<Vec<ErrorListener>>,
    pub connect_delay: Mutex<Option<Duration>>,
    pub row_count: Mutex<u64>,
}

impl MockState {
    pub fn connects(&self) -> usize {
        self.pooled_connects.load(Ordering::SeqCst) + self.direct_connects.load(Ordering::SeqCst)
    }

    pub fn statements_matching(&self, sql: &str) -> usize {
        self.statements.lock().iter().filter(|s| *s == sql).count()
    }

    pub fn fail_next(&self, error: PgnestError) {
        self.statement_failures.lock().push_back(error);
    }

    pub fn fail_next_verify(&self, error: PgnestError) {
        self.verify_failures.lock().push_back(error);
    }

    /// Deliver a background error to every registered listener
    pub fn emit_background_error(&self) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(&PgnestError::connection(
                ConnectionErrorKind::Reset,
                "terminating connection due to administrator command",
            ));
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    pub state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &'static str {
        "mock"
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

        let pooled = on_error.is_some();
        let reported = if pooled {
            if self.state.fail_pooled_connects.load(Ordering::SeqCst) {
                return Err(PgnestError::connection(
                    ConnectionErrorKind::Refused,
                    "connect ECONNREFUSED",
                ));
            }
            self.state.pooled_connects.fetch_add(1, Ordering::SeqCst);
            self.state.pooled_database_override.lock().clone()
        } else {
            self.state.direct_connects.fetch_add(1, Ordering::SeqCst);
            self.state.direct_database_override.lock().clone()
        };

        if let Some(listener) = on_error {
            self.state.listeners.lock().push(listener);
        }

        Ok(Arc::new(MockConnection {
            database: reported.unwrap_or_else(|| config.database.clone()),
            closed: AtomicBool::new(false),
            state: Arc::clone(&self.state),
        }))
    }
}

pub(crate) struct MockConnection {
    database: String,
    closed: AtomicBool,
    state: Arc<MockState>,
}

impl MockConnection {
    pub fn standalone(database: &str) -> Self {
        Self {
            database: database.to_string(),
            closed: AtomicBool::new(false),
            state: Arc::default(),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        if self.is_closed() {
            return Err(PgnestError::connection(
                ConnectionErrorKind::Closed,
                "connection has been closed",
            ));
        }

        self.state.statements.lock().push(sql.to_string());

        if sql == "SELECT current_database()" {
            if let Some(error) = self.state.verify_failures.lock().pop_front() {
                return Err(error);
            }
            return Ok(single_value("current_database", Value::from(self.database.as_str())));
        }

        if let Some(error) = self.state.statement_failures.lock().pop_front() {
            return Err(error);
        }

        if sql == "SELECT 1" {
            return Ok(single_value("?column?", Value::Int32(1)));
        }

        let mut result = QueryResult::empty();
        result.row_count = *self.state.row_count.lock();
        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub(crate) fn single_value(column: &str, value: Value) -> QueryResult {
    let columns: Arc<[String]> = Arc::from(vec![column.to_string()]);
    let mut result = QueryResult::empty();
    result.rows.push(Row::new(columns, vec![value]));
    result.row_count = 1;
    result
}

pub(crate) fn info(database: &str) -> BranchConnectionInfo {
    BranchConnectionInfo {
        host: "localhost".to_string(),
        database: database.to_string(),
        user: "neon".to_string(),
        password: "secret".to_string(),
    }
}

/// Connected session offering `databases`, first one selected
pub(crate) fn connected_session(databases: &[&str]) -> Arc<SessionState> {
    let session = SessionState::new();
    session.connect(databases.iter().map(|db| info(db)).collect());
    if let Some(first) = databases.first() {
        session.select_database(Some(first.to_string()));
    }
    Arc::new(session)
}
