//! KeyValueStore port - 端末ローカルの key-value store
//!
//! 値は文字列（JSON）で、key ごとに丸ごと読み書きします。
//! read-modify-write は atomic ではないため、書き込み経路は必ず
//! `SerialWriteQueue` を通します（`app::Repository` が保証）。

use async_trait::async_trait;

use crate::error::StoreError;

/// Async string key-value store.
///
/// # 設計原則
/// - 一回の呼び出しは atomic だが、呼び出しをまたぐ一貫性は保証しない
/// - 存在しない key の読み込みは `Ok(None)`
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_item(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Removing a missing key is not an error.
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;

    /// All keys currently present, sorted.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}
