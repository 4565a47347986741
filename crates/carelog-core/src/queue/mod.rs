//! Queue module: the serial write queue, its state machine, and per-key routing.

mod keyed;
mod serial;
mod state;

pub use keyed::{KeyedQueues, QueueScope};
pub use serial::{SerialWriteQueue, Ticket};
pub use state::QueueState;

pub use crate::error::QueueError;
