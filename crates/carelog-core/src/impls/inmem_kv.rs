//! InMemoryKvStore - 開発・テスト用の key-value store
//!
//! # 学習ポイント
//! - tokio::sync::Mutex による排他（一回の get/set 単位）
//! - 遅延注入: get と set の間に他の呼び出しが割り込めるので、
//!   キューを通さない read-modify-write が更新を失う様子を再現できる

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::ports::KeyValueStore;

/// Map-backed store. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    items: Arc<Mutex<BTreeMap<String, String>>>,
    latency: Duration,
    writes: Arc<AtomicU64>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` plus up to 50% random jitter before touching the map.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Number of successful `set_item` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    async fn simulate_latency(&self) {
        if self.latency.is_zero() {
            return;
        }
        let max_jitter = (self.latency.as_micros() / 2) as u64;
        let jitter = Duration::from_micros(rand::thread_rng().gen_range(0..=max_jitter));
        tokio::time::sleep(self.latency + jitter).await;
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.simulate_latency().await;
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.simulate_latency().await;
        self.items.lock().await.insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.simulate_latency().await;
        self.items.lock().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.items.lock().await.keys().cloned().collect())
    }
}
