//! Drain state machine for the serial queue.

use serde::{Deserialize, Serialize};

/// Queue state.
///
/// State transitions:
/// - Idle -> Draining: `enqueue` is called while idle
/// - Draining -> Idle: the drain loop finds the pending list empty after an operation settled
///
/// There is no terminal state; a queue oscillates between the two for its whole life.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// No drain loop is running.
    #[default]
    Idle,

    /// A drain loop is consuming the pending list.
    Draining,
}

impl QueueState {
    pub fn is_draining(self) -> bool {
        matches!(self, QueueState::Draining)
    }
}
