//! RepositoryBuilder - 永続化層の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: store が無ければ build() でエラー
//! - グローバルなシングルトンを使わず、queue を明示的に注入する

use std::sync::Arc;
use std::time::Duration;

use crate::app::Repository;
use crate::error::StoreError;
use crate::impls::{FileKvStore, InMemoryKvStore};
use crate::ports::{Clock, KeyValueStore, SystemClock};
use crate::queue::{KeyedQueues, QueueScope};
use crate::settings::{StorageBackend, StorageSettings};

/// RepositoryBuilder は Repository を構築
///
/// # 使用例
/// ```ignore
/// let repo = RepositoryBuilder::new()
///     .store(Arc::new(InMemoryKvStore::new()))
///     .scope(QueueScope::PerKey)
///     .build()?;
/// ```
#[derive(Default)]
pub struct RepositoryBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    queues: Option<Arc<KeyedQueues>>,
    scope: QueueScope,
}

/// BuildError は構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no key-value store configured; call store() or from_storage_settings() first")]
    MissingStore,

    #[error("failed to open storage: {0}")]
    Storage(#[from] StoreError),
}

impl RepositoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Open the store described by `settings` (file or memory backend).
    pub async fn from_storage_settings(
        self,
        settings: &StorageSettings,
    ) -> Result<Self, BuildError> {
        let store: Arc<dyn KeyValueStore> = match settings.backend {
            StorageBackend::File => {
                let store = FileKvStore::open(&settings.data_dir).await?;
                tracing::info!(dir = %store.dir().display(), "using file store");
                Arc::new(store)
            }
            StorageBackend::Memory => Arc::new(InMemoryKvStore::with_latency(
                Duration::from_millis(settings.simulated_latency_ms),
            )),
        };
        tracing::info!(backend = ?settings.backend, "storage ready");
        Ok(self.store(store))
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Queue scope for a freshly created queue registry. Ignored when `queues()` is set.
    pub fn scope(mut self, scope: QueueScope) -> Self {
        self.scope = scope;
        self
    }

    /// Share an existing queue registry, e.g. with another repository over the same store.
    pub fn queues(mut self, queues: Arc<KeyedQueues>) -> Self {
        self.queues = Some(queues);
        self
    }

    pub fn build(self) -> Result<Repository, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let queues = self
            .queues
            .unwrap_or_else(|| Arc::new(KeyedQueues::new(self.scope)));
        tracing::debug!(scope = ?queues.scope(), "repository built");
        Ok(Repository::new(store, queues, clock))
    }
}
