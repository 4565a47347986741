//! Domain identifiers (strongly-typed IDs).
//!
//! ULID (Universally Unique Lexicographically Sortable Identifier) ベースの ID を、
//! Phantom type パターンで型ごとに区別します。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: 生成順に並ぶので一覧表示の既定順として使える
//! - **端末ローカルで生成可能**: サーバーとの調整が要らない
//!
//! ## Phantom Type パターン
//! `Id<T>` で共通実装を提供し、`T` はマーカー型として
//! PatientId と SessionId の取り違えをコンパイル時に防ぎます。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"patient-", "plan-", "session-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// JSON では ULID 文字列そのもの（プレフィックスなし）として保存されます。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// 新しい ID を生成
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Accepts both the prefixed display form and a bare ULID.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Patient {}

impl IdMarker for Patient {
    fn prefix() -> &'static str {
        "patient-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plan {}

impl IdMarker for Plan {
    fn prefix() -> &'static str {
        "plan-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Session {}

impl IdMarker for Session {
    fn prefix() -> &'static str {
        "session-"
    }
}

/// Identifier of a patient record.
pub type PatientId = Id<Patient>;

/// Identifier of a therapeutic plan.
pub type PlanId = Id<Plan>;

/// Identifier of a treatment session.
pub type SessionId = Id<Session>;
