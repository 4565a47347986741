//! App - アプリケーション層
//!
//! ports と queue を組み合わせて永続化ロジックを実装します。
//!
//! # 主要コンポーネント
//! - **RepositoryBuilder**: store / clock / queue のワイヤリング
//! - **Repository**: patients / plans / sessions の CRUD（すべて queue 経由）
//! - **race**: キューあり・なしで read-modify-write を競合させるデモ

pub mod builder;
pub mod race;
pub mod repository;

pub use self::builder::{BuildError, RepositoryBuilder};
pub use self::race::{RaceReport, run_append_race};
pub use self::repository::{
    Imported, PATIENTS_KEY, PLANS_KEY, Removed, Repository, SESSIONS_KEY,
};
