//! Therapeutic plan record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PatientId, PlanId};
use crate::error::StoreError;

/// Plan status.
///
/// State transitions:
/// - Active -> Completed (all planned sessions done, or set by hand)
/// - Active <-> Suspended
/// - Completed -> Active (reopened by hand)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Active,
    Completed,
    Suspended,
}

impl std::str::FromStr for PlanStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PlanStatus::Active),
            "completed" => Ok(PlanStatus::Completed),
            "suspended" => Ok(PlanStatus::Suspended),
            other => Err(StoreError::invalid("status", format!("unknown plan status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TherapeuticPlan {
    pub id: PlanId,
    pub patient_id: PatientId,
    pub title: String,
    #[serde(default)]
    pub goals: Vec<String>,
    /// Number of sessions the plan prescribes.
    pub total_sessions: u32,
    #[serde(default)]
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TherapeuticPlan {
    pub fn new(
        patient_id: PatientId,
        title: impl Into<String>,
        total_sessions: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PlanId::generate(),
            patient_id,
            title: title.into(),
            goals: Vec::new(),
            total_sessions,
            status: PlanStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.title.trim().is_empty() {
            return Err(StoreError::invalid("title", "plan title must not be empty"));
        }
        if self.total_sessions == 0 {
            return Err(StoreError::invalid("totalSessions", "a plan needs at least one session"));
        }
        Ok(())
    }
}

/// Completed sessions against the planned total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanProgress {
    pub plan_id: PlanId,
    pub completed: u32,
    pub total: u32,
}

impl PlanProgress {
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    /// Completion in percent, capped at 100.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = (u64::from(self.completed) * 100) / u64::from(self.total);
        pct.min(100) as u8
    }
}
