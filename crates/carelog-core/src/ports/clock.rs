//! Clock port - 時刻の抽象化

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Clock は現在時刻を提供
///
/// テストでは FixedClock を使って createdAt / updatedAt を決定的にします。
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 本番用: システム時刻
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// テスト用: 手で進める時計
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
