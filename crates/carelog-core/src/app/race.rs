//! Lost-update race demo.
//!
//! N writers concurrently run "read array, push own item, write array back" against one key.
//! Through a `SerialWriteQueue` every item survives; bypassing the queue, writers that read
//! before another writer's write-back overwrite each other.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;

use crate::app::repository::{read_collection, write_collection};
use crate::error::StoreError;
use crate::ports::KeyValueStore;
use crate::queue::SerialWriteQueue;

pub const RACE_KEY: &str = "@carelog:race";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RaceReport {
    pub serialized: bool,
    pub writers: usize,
    pub persisted: usize,
}

impl RaceReport {
    pub fn lost(&self) -> usize {
        self.writers.saturating_sub(self.persisted)
    }
}

/// Run `writers` concurrent appends to [`RACE_KEY`], through `queue` when given.
///
/// The key is reset before the run.
pub async fn run_append_race(
    store: Arc<dyn KeyValueStore>,
    writers: usize,
    queue: Option<SerialWriteQueue>,
) -> Result<RaceReport, StoreError> {
    store.remove_item(RACE_KEY).await?;

    let mut tasks = JoinSet::new();
    for writer in 0..writers {
        let store = Arc::clone(&store);
        let queue = queue.clone();
        tasks.spawn(async move {
            let append = move || async move {
                let mut items: Vec<usize> = read_collection(&*store, RACE_KEY).await?;
                items.push(writer);
                write_collection(&*store, RACE_KEY, &items).await
            };
            match queue {
                Some(queue) => queue.enqueue(append).await,
                None => append().await,
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| StoreError::Backend(format!("writer task failed: {e}")))??;
    }

    let persisted: Vec<usize> = read_collection(&*store, RACE_KEY).await?;
    let report = RaceReport {
        serialized: queue.is_some(),
        writers,
        persisted: persisted.len(),
    };
    tracing::info!(
        serialized = report.serialized,
        writers,
        persisted = report.persisted,
        lost = report.lost(),
        "append race finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryKvStore;
    use std::time::Duration;

    #[tokio::test]
    async fn zero_writers_persist_nothing() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKvStore::new());
        let report = run_append_race(store, 0, Some(SerialWriteQueue::new()))
            .await
            .unwrap();
        assert_eq!(report.persisted, 0);
        assert_eq!(report.lost(), 0);
    }

    #[tokio::test]
    async fn queued_writers_all_persist() {
        let store: Arc<dyn KeyValueStore> =
            Arc::new(InMemoryKvStore::with_latency(Duration::from_millis(2)));
        let report = run_append_race(store, 8, Some(SerialWriteQueue::new()))
            .await
            .unwrap();
        assert!(report.serialized);
        assert_eq!(report.persisted, 8);
    }
}
