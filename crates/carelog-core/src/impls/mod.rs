//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryKvStore**: テスト・デモ用（遅延を注入して競合を再現できる）
//! - **FileKvStore**: key ごとに JSON ファイルを持つ永続ストア

pub mod file_kv;
pub mod inmem_kv;

pub use self::file_kv::FileKvStore;
pub use self::inmem_kv::InMemoryKvStore;
