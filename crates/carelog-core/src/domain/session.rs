//! Treatment session record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PatientId, PlanId, SessionId};
use crate::error::StoreError;

/// Highest value of the 0-10 pain scale.
pub const MAX_PAIN: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentSession {
    pub id: SessionId,
    pub patient_id: PatientId,
    /// Sessions may exist outside a plan, and become detached when their plan is deleted.
    #[serde(default)]
    pub plan_id: Option<PlanId>,
    pub session_date: NaiveDate,
    #[serde(default)]
    pub pain_before: Option<u8>,
    #[serde(default)]
    pub pain_after: Option<u8>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl TreatmentSession {
    pub fn new(patient_id: PatientId, session_date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::generate(),
            patient_id,
            plan_id: None,
            session_date,
            pain_before: None,
            pain_after: None,
            notes: String::new(),
            created_at: now,
        }
    }

    pub fn with_plan(mut self, plan_id: PlanId) -> Self {
        self.plan_id = Some(plan_id);
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        for (field, value) in [("painBefore", self.pain_before), ("painAfter", self.pain_after)] {
            if let Some(pain) = value
                && pain > MAX_PAIN
            {
                return Err(StoreError::invalid(field, format!("{pain} is outside 0-{MAX_PAIN}")));
            }
        }
        Ok(())
    }

    /// Pain reduction reported for this session, if both scores were recorded.
    pub fn pain_delta(&self) -> Option<i16> {
        Some(i16::from(self.pain_before?) - i16::from(self.pain_after?))
    }
}
