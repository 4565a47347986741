use serde::{Deserialize, Serialize};

use crate::queue::QueueState;

/// Point-in-time view of a serial queue.
///
/// `pending` does not count the operation in flight; `in_flight` tells whether one is running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub state: QueueState,
    pub pending: usize,
    pub in_flight: bool,
    /// Operations that ran to completion, successful or not.
    pub settled: u64,
    pub panicked: u64,
    /// Operations discarded by `clear()`.
    pub cleared: u64,
}

impl QueueStats {
    pub fn is_draining(&self) -> bool {
        self.state.is_draining()
    }
}
