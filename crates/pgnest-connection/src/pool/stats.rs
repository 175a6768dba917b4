use serde::{Deserialize, Serialize};

/// Point-in-time counts for one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    total: usize,
    idle: usize,
    active: usize,
    waiting: usize,
}

impl PoolStats {
    /// `total` is always `idle + active`
    pub fn new(idle: usize, active: usize, waiting: usize) -> Self {
        Self {
            total: idle + active,
            idle,
            active,
            waiting,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Checked out and not yet returned
    pub fn active(&self) -> usize {
        self.active
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
