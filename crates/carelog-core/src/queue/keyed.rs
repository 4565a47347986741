//! KeyedQueues - store key ごとの SerialWriteQueue
//!
//! # 学習ポイント
//! - namespace ごとにキューを分ける（無関係な key 同士は並行に進められる）
//! - global scope では全 key が同じキューを共有する

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::SerialWriteQueue;
use crate::observability::QueueStats;

/// How store keys map onto serial queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueScope {
    /// One queue serializes every key of the store.
    #[default]
    Global,

    /// Each key gets its own queue, created on first use.
    PerKey,
}

/// Registry of serial queues indexed by store key.
///
/// # 使用例
/// ```ignore
/// let queues = KeyedQueues::new(QueueScope::PerKey);
/// let patients = queues.for_key("@carelog:patients");
/// patients.enqueue(|| async { Ok::<_, StoreError>(()) }).await?;
/// ```
pub struct KeyedQueues {
    scope: QueueScope,
    global: SerialWriteQueue,
    by_key: Mutex<BTreeMap<String, SerialWriteQueue>>,
}

impl KeyedQueues {
    pub fn new(scope: QueueScope) -> Self {
        Self {
            scope,
            global: SerialWriteQueue::new(),
            by_key: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn scope(&self) -> QueueScope {
        self.scope
    }

    /// The queue that serializes access to `key`.
    pub fn for_key(&self, key: &str) -> SerialWriteQueue {
        match self.scope {
            QueueScope::Global => self.global.clone(),
            QueueScope::PerKey => {
                let mut by_key = self.by_key.lock().unwrap_or_else(PoisonError::into_inner);
                by_key
                    .entry(key.to_string())
                    .or_insert_with(|| {
                        tracing::debug!(key, "creating serial queue for key");
                        SerialWriteQueue::new()
                    })
                    .clone()
            }
        }
    }

    /// Stats per queue, keyed by store key (`"*"` for the global queue).
    pub fn stats(&self) -> BTreeMap<String, QueueStats> {
        match self.scope {
            QueueScope::Global => BTreeMap::from([("*".to_string(), self.global.stats())]),
            QueueScope::PerKey => self
                .by_key
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(key, queue)| (key.clone(), queue.stats()))
                .collect(),
        }
    }

    /// Wait until every known queue is idle at the same time.
    ///
    /// Queues are awaited one after another, so the pass repeats until none was restarted
    /// (or created) while a later one was being awaited.
    pub async fn wait_idle(&self) {
        loop {
            let queues = self.queues();
            for queue in &queues {
                queue.wait_idle().await;
            }
            if queues.iter().all(|q| !q.is_draining()) && self.queues().len() == queues.len() {
                return;
            }
        }
    }

    fn queues(&self) -> Vec<SerialWriteQueue> {
        match self.scope {
            QueueScope::Global => vec![self.global.clone()],
            QueueScope::PerKey => self
                .by_key
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .cloned()
                .collect(),
        }
    }
}

impl Default for KeyedQueues {
    fn default() -> Self {
        Self::new(QueueScope::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn global_scope_shares_one_queue() {
        let queues = KeyedQueues::new(QueueScope::Global);
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocker = queues.for_key("a").enqueue(move || async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
            Ok::<_, QueueError>(())
        });
        started_rx.await.unwrap();

        // a different key still waits behind the blocker
        let other = queues.for_key("b").enqueue(|| async { Ok::<_, QueueError>("b") });
        assert_eq!(queues.for_key("b").size(), 1);

        release_tx.send(()).unwrap();
        blocker.await.unwrap();
        assert_eq!(other.await, Ok("b"));
        assert_eq!(queues.stats().len(), 1);
    }

    #[tokio::test]
    async fn per_key_scope_lets_unrelated_keys_proceed() {
        let queues = KeyedQueues::new(QueueScope::PerKey);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocked = queues.for_key("a").enqueue(move || async move {
            let _ = release_rx.await;
            Ok::<_, QueueError>("a")
        });

        let free = queues.for_key("b").enqueue(|| async { Ok::<_, QueueError>("b") });
        let result = tokio::time::timeout(Duration::from_secs(1), free).await;
        assert_eq!(result.unwrap(), Ok("b"));

        release_tx.send(()).unwrap();
        assert_eq!(blocked.await, Ok("a"));

        queues.wait_idle().await;
        let stats = queues.stats();
        assert_eq!(stats.keys().cloned().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(stats.values().all(|s| !s.is_draining()));
    }

    #[tokio::test]
    async fn wait_idle_covers_a_queue_restarted_during_the_wait() {
        let queues = Arc::new(KeyedQueues::new(QueueScope::PerKey));
        queues
            .for_key("a")
            .enqueue(|| async { Ok::<_, QueueError>(()) })
            .await
            .unwrap();

        let (release_b_tx, release_b_rx) = oneshot::channel::<()>();
        let _b = queues.for_key("b").enqueue(move || async move {
            let _ = release_b_rx.await;
            Ok::<_, QueueError>(())
        });

        let waiter = tokio::spawn({
            let queues = Arc::clone(&queues);
            async move { queues.wait_idle().await }
        });
        // the waiter has passed "a" and sits on "b"
        tokio::time::sleep(Duration::from_millis(20)).await;

        let a_done = Arc::new(AtomicBool::new(false));
        let (release_a_tx, release_a_rx) = oneshot::channel::<()>();
        let _a = queues.for_key("a").enqueue({
            let a_done = Arc::clone(&a_done);
            move || async move {
                let _ = release_a_rx.await;
                a_done.store(true, Ordering::SeqCst);
                Ok::<_, QueueError>(())
            }
        });

        release_b_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        release_a_tx.send(()).unwrap();
        waiter.await.unwrap();
        assert!(a_done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn same_key_returns_the_same_queue() {
        let queues = KeyedQueues::new(QueueScope::PerKey);
        let first = queues.for_key("k");
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let _held = first.enqueue(move || async move {
            let _ = release_rx.await;
            Ok::<_, QueueError>(())
        });
        let _queued = queues.for_key("k").enqueue(|| async { Ok::<_, QueueError>(()) });

        assert_eq!(first.size() + usize::from(first.stats().in_flight), 2);
        release_tx.send(()).unwrap();
        queues.wait_idle().await;
    }
}
