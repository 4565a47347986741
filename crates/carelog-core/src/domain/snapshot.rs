//! Full backup of every collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Patient, TherapeuticPlan, TreatmentSession};

/// Format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub patients: Vec<Patient>,
    pub plans: Vec<TherapeuticPlan>,
    pub sessions: Vec<TreatmentSession>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty() && self.plans.is_empty() && self.sessions.is_empty()
    }
}
