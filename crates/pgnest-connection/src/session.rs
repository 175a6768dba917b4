//! Where connection identities come from

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One identity able to reach a database on the connected branch
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchConnectionInfo {
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for BranchConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchConnectionInfo")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Read-only view of the user's branch session
pub trait SessionSource: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Candidate identities, one per database; the first is the fallback
    fn connection_infos(&self) -> Vec<BranchConnectionInfo>;

    /// Database the user last selected, if any
    fn selected_database(&self) -> Option<String>;
}

#[derive(Debug, Default)]
struct SessionSnapshot {
    connected: bool,
    infos: Vec<BranchConnectionInfo>,
    selected_database: Option<String>,
}

/// In-memory [`SessionSource`]
#[derive(Debug, Default)]
pub struct SessionState {
    inner: RwLock<SessionSnapshot>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session connected with the branch's identities
    pub fn connect(&self, infos: Vec<BranchConnectionInfo>) {
        let mut inner = self.inner.write();
        inner.connected = true;
        inner.infos = infos;
    }

    pub fn disconnect(&self) {
        let mut inner = self.inner.write();
        inner.connected = false;
        inner.infos.clear();
        inner.selected_database = None;
    }

    pub fn select_database(&self, database: Option<String>) {
        self.inner.write().selected_database = database;
    }
}

impl SessionSource for SessionState {
    fn is_connected(&self) -> bool {
        self.inner.read().connected
    }

    fn connection_infos(&self) -> Vec<BranchConnectionInfo> {
        self.inner.read().infos.clone()
    }

    fn selected_database(&self) -> Option<String> {
        self.inner.read().selected_database.clone()
    }
}
