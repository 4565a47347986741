//! carelog-core
//!
//! Persistence core of the carelog clinical-records app.
//!
//! # モジュール構成
//! - **queue**: SerialWriteQueue（FIFO・single-flight の書き込み直列化）と KeyedQueues
//! - **domain**: ドメインモデル（ids, patient, plan, session, snapshot）
//! - **ports**: 抽象化レイヤー（KeyValueStore, Clock）
//! - **impls**: 実装（InMemoryKvStore, FileKvStore）
//! - **app**: 永続化層（Repository, RepositoryBuilder, race デモ）
//! - **settings**: 設定の読み込み
//! - **observability**: キューの統計ビュー
//! - **error**: エラー型

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod settings;

pub use app::{Repository, RepositoryBuilder};
pub use error::{QueueError, StoreError};
pub use queue::{KeyedQueues, QueueScope, SerialWriteQueue, Ticket};
pub use settings::Settings;
