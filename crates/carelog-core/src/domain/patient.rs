//! Patient record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ids::PatientId;
use crate::error::StoreError;

/// A patient as persisted under the patients key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: PatientId::generate(),
            name: name.into(),
            birth_date: None,
            phone: None,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::invalid("name", "patient name must not be empty"));
        }
        if let Some(phone) = &self.phone
            && !phone
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
        {
            return Err(StoreError::invalid("phone", format!("unexpected characters in {phone:?}")));
        }
        Ok(())
    }

    /// Apply a partial update. `updated_at` moves to `now`.
    pub fn apply(&mut self, patch: PatientPatch, now: DateTime<Utc>) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(birth_date) = patch.birth_date {
            self.birth_date = Some(birth_date);
        }
        if let Some(phone) = patch.phone {
            self.phone = Some(phone);
        }
        if let Some(notes) = patch.notes {
            self.notes = notes;
        }
        self.updated_at = now;
    }
}

/// Fields an update may change. `None` leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientPatch {
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}
