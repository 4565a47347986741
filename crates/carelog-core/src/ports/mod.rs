//! Ports - 抽象化レイヤー
//!
//! 永続化層が依存する外部システム（端末の key-value store、時計）への
//! インターフェースを定義します。実装は `impls` にあります。

pub mod clock;
pub mod kv_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::kv_store::KeyValueStore;
