//! Repository - 永続化層
//!
//! 各コレクション（patients / plans / sessions）は固定 key の下に JSON 配列として保存されます。
//! すべての読み書きは key に対応する `SerialWriteQueue` を通るので、
//! 「配列を読む → 変更 → 書き戻す」が他の呼び出しと交錯しません。
//!
//! # 規約
//! - queued operation の中から別の operation を投入しない（global queue がデッドロックする）
//! - 複数 key にまたがる操作は patients → plans → sessions の順に、key ごとの operation を順番に実行する
//! - key をまたぐ atomicity は無い

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{
    Patient, PatientId, PatientPatch, PlanId, PlanProgress, PlanStatus, SNAPSHOT_VERSION,
    SessionId, Snapshot, TherapeuticPlan, TreatmentSession,
};
use crate::error::StoreError;
use crate::observability::QueueStats;
use crate::ports::{Clock, KeyValueStore};
use crate::queue::{KeyedQueues, Ticket};

pub const PATIENTS_KEY: &str = "@carelog:patients";
pub const PLANS_KEY: &str = "@carelog:plans";
pub const SESSIONS_KEY: &str = "@carelog:sessions";

/// Records removed by a cascading delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Removed {
    pub patients: usize,
    pub plans: usize,
    pub sessions: usize,
}

/// Record counts written by `import_snapshot`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Imported {
    pub patients: usize,
    pub plans: usize,
    pub sessions: usize,
}

pub struct Repository {
    store: Arc<dyn KeyValueStore>,
    queues: Arc<KeyedQueues>,
    clock: Arc<dyn Clock>,
}

impl Repository {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        queues: Arc<KeyedQueues>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            queues,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn queues(&self) -> &KeyedQueues {
        &self.queues
    }

    pub fn queue_stats(&self) -> BTreeMap<String, QueueStats> {
        self.queues.stats()
    }

    /// Resolve once no queued operation is pending or running.
    pub async fn wait_idle(&self) {
        self.queues.wait_idle().await;
    }

    // ========================================
    // Patients
    // ========================================

    pub async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        self.read(PATIENTS_KEY).await
    }

    pub async fn get_patient(&self, id: PatientId) -> Result<Patient, StoreError> {
        self.list_patients()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::not_found("patient", id))
    }

    pub async fn save_patient(&self, patient: Patient) -> Result<Patient, StoreError> {
        patient.validate()?;
        let saved = self
            .modify(PATIENTS_KEY, move |patients: &mut Vec<Patient>| {
                if patients.iter().any(|p| p.id == patient.id) {
                    return Err(StoreError::AlreadyExists {
                        kind: "patient",
                        id: patient.id.to_string(),
                    });
                }
                patients.push(patient.clone());
                Ok(patient)
            })
            .await?;
        tracing::debug!(patient = %saved.id, "patient saved");
        Ok(saved)
    }

    pub async fn update_patient(
        &self,
        id: PatientId,
        patch: PatientPatch,
    ) -> Result<Patient, StoreError> {
        let now = self.now();
        let updated = self
            .modify(PATIENTS_KEY, move |patients: &mut Vec<Patient>| {
                let slot = patients
                    .iter_mut()
                    .find(|p| p.id == id)
                    .ok_or_else(|| StoreError::not_found("patient", id))?;
                let mut candidate = slot.clone();
                candidate.apply(patch, now);
                candidate.validate()?;
                *slot = candidate.clone();
                Ok(candidate)
            })
            .await?;
        tracing::debug!(patient = %id, "patient updated");
        Ok(updated)
    }

    /// Delete a patient together with their plans and sessions.
    pub async fn delete_patient(&self, id: PatientId) -> Result<Removed, StoreError> {
        self.modify(PATIENTS_KEY, move |patients: &mut Vec<Patient>| {
            let before = patients.len();
            patients.retain(|p| p.id != id);
            if patients.len() == before {
                return Err(StoreError::not_found("patient", id));
            }
            Ok(())
        })
        .await?;

        let plans = self
            .modify(PLANS_KEY, move |plans: &mut Vec<TherapeuticPlan>| {
                Ok(retain_counting(plans, |plan| plan.patient_id != id))
            })
            .await?;
        let sessions = self
            .modify(SESSIONS_KEY, move |sessions: &mut Vec<TreatmentSession>| {
                Ok(retain_counting(sessions, |s| s.patient_id != id))
            })
            .await?;

        let removed = Removed {
            patients: 1,
            plans,
            sessions,
        };
        tracing::debug!(patient = %id, ?removed, "patient deleted");
        Ok(removed)
    }

    // ========================================
    // Plans
    // ========================================

    pub async fn list_plans(&self, patient_id: PatientId) -> Result<Vec<TherapeuticPlan>, StoreError> {
        let plans: Vec<TherapeuticPlan> = self.read(PLANS_KEY).await?;
        Ok(plans
            .into_iter()
            .filter(|plan| plan.patient_id == patient_id)
            .collect())
    }

    pub async fn get_plan(&self, id: PlanId) -> Result<TherapeuticPlan, StoreError> {
        let plans: Vec<TherapeuticPlan> = self.read(PLANS_KEY).await?;
        plans
            .into_iter()
            .find(|plan| plan.id == id)
            .ok_or_else(|| StoreError::not_found("plan", id))
    }

    pub async fn save_plan(&self, plan: TherapeuticPlan) -> Result<TherapeuticPlan, StoreError> {
        plan.validate()?;
        self.get_patient(plan.patient_id).await?;

        let saved = self
            .modify(PLANS_KEY, move |plans: &mut Vec<TherapeuticPlan>| {
                if plans.iter().any(|p| p.id == plan.id) {
                    return Err(StoreError::AlreadyExists {
                        kind: "plan",
                        id: plan.id.to_string(),
                    });
                }
                plans.push(plan.clone());
                Ok(plan)
            })
            .await?;
        tracing::debug!(plan = %saved.id, patient = %saved.patient_id, "plan saved");
        Ok(saved)
    }

    pub async fn update_plan_status(
        &self,
        id: PlanId,
        status: PlanStatus,
    ) -> Result<TherapeuticPlan, StoreError> {
        let now = self.now();
        let updated = self
            .modify(PLANS_KEY, move |plans: &mut Vec<TherapeuticPlan>| {
                let plan = plans
                    .iter_mut()
                    .find(|p| p.id == id)
                    .ok_or_else(|| StoreError::not_found("plan", id))?;
                plan.status = status;
                plan.updated_at = now;
                Ok(plan.clone())
            })
            .await?;
        tracing::debug!(plan = %id, ?status, "plan status changed");
        Ok(updated)
    }

    /// Delete a plan. Its sessions are kept but detached; returns how many were detached.
    pub async fn delete_plan(&self, id: PlanId) -> Result<usize, StoreError> {
        self.modify(PLANS_KEY, move |plans: &mut Vec<TherapeuticPlan>| {
            if retain_counting(plans, |p| p.id != id) == 0 {
                return Err(StoreError::not_found("plan", id));
            }
            Ok(())
        })
        .await?;

        let detached = self
            .modify(SESSIONS_KEY, move |sessions: &mut Vec<TreatmentSession>| {
                let mut detached = 0;
                for session in sessions.iter_mut().filter(|s| s.plan_id == Some(id)) {
                    session.plan_id = None;
                    detached += 1;
                }
                Ok(detached)
            })
            .await?;
        tracing::debug!(plan = %id, detached, "plan deleted");
        Ok(detached)
    }

    pub async fn plan_progress(&self, id: PlanId) -> Result<PlanProgress, StoreError> {
        let plan = self.get_plan(id).await?;
        let sessions = self.list_plan_sessions(id).await?;
        Ok(PlanProgress {
            plan_id: id,
            completed: sessions.len() as u32,
            total: plan.total_sessions,
        })
    }

    // ========================================
    // Sessions
    // ========================================

    /// Sessions of a patient, oldest first.
    pub async fn list_sessions(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<TreatmentSession>, StoreError> {
        self.sessions_where(move |s| s.patient_id == patient_id).await
    }

    /// Sessions recorded against a plan, oldest first.
    pub async fn list_plan_sessions(
        &self,
        plan_id: PlanId,
    ) -> Result<Vec<TreatmentSession>, StoreError> {
        self.sessions_where(move |s| s.plan_id == Some(plan_id)).await
    }

    /// Save a session. When it completes its plan's prescribed sessions, an active plan is
    /// marked completed.
    pub async fn save_session(
        &self,
        session: TreatmentSession,
    ) -> Result<TreatmentSession, StoreError> {
        session.validate()?;
        self.get_patient(session.patient_id).await?;

        if let Some(plan_id) = session.plan_id {
            let plan = self.get_plan(plan_id).await?;
            check_plan_owner(&plan, &session)?;
        }

        let (saved, plan_sessions) = self
            .modify(SESSIONS_KEY, move |sessions: &mut Vec<TreatmentSession>| {
                if sessions.iter().any(|s| s.id == session.id) {
                    return Err(StoreError::AlreadyExists {
                        kind: "session",
                        id: session.id.to_string(),
                    });
                }
                sessions.push(session.clone());
                let plan_sessions = session
                    .plan_id
                    .map(|plan_id| sessions.iter().filter(|s| s.plan_id == Some(plan_id)).count());
                Ok((session, plan_sessions))
            })
            .await?;
        tracing::debug!(session = %saved.id, patient = %saved.patient_id, "session saved");

        if let (Some(plan_id), Some(count)) = (saved.plan_id, plan_sessions) {
            self.complete_plan_if_done(plan_id, count).await?;
        }

        Ok(saved)
    }

    /// Mark an active plan completed once `count` sessions reach its total.
    ///
    /// The plan is re-read inside the plans queue: a status changed or a plan deleted after
    /// the session was written is respected. Returns whether the plan was completed.
    async fn complete_plan_if_done(&self, plan_id: PlanId, count: usize) -> Result<bool, StoreError> {
        let now = self.now();
        let completed = self
            .modify(PLANS_KEY, move |plans: &mut Vec<TherapeuticPlan>| {
                let Some(plan) = plans.iter_mut().find(|p| p.id == plan_id) else {
                    return Ok(false);
                };
                if plan.status != PlanStatus::Active || count < plan.total_sessions as usize {
                    return Ok(false);
                }
                plan.status = PlanStatus::Completed;
                plan.updated_at = now;
                Ok(true)
            })
            .await?;
        if completed {
            tracing::info!(plan = %plan_id, sessions = count, "plan reached its planned sessions");
        }
        Ok(completed)
    }

    pub async fn delete_session(&self, id: SessionId) -> Result<(), StoreError> {
        self.modify(SESSIONS_KEY, move |sessions: &mut Vec<TreatmentSession>| {
            if retain_counting(sessions, |s| s.id != id) == 0 {
                return Err(StoreError::not_found("session", id));
            }
            Ok(())
        })
        .await?;
        tracing::debug!(session = %id, "session deleted");
        Ok(())
    }

    // ========================================
    // Backup
    // ========================================

    pub async fn export_snapshot(&self) -> Result<Snapshot, StoreError> {
        let patients = self.read(PATIENTS_KEY).await?;
        let plans = self.read(PLANS_KEY).await?;
        let sessions = self.read(SESSIONS_KEY).await?;
        Ok(Snapshot {
            version: SNAPSHOT_VERSION,
            exported_at: self.now(),
            patients,
            plans,
            sessions,
        })
    }

    /// Replace every collection with the snapshot's content.
    pub async fn import_snapshot(&self, snapshot: Snapshot) -> Result<Imported, StoreError> {
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(StoreError::invalid(
                "version",
                format!("snapshot version {} is newer than {SNAPSHOT_VERSION}", snapshot.version),
            ));
        }
        check_snapshot(&snapshot)?;

        let Snapshot {
            patients,
            plans,
            sessions,
            ..
        } = snapshot;
        let imported = Imported {
            patients: patients.len(),
            plans: plans.len(),
            sessions: sessions.len(),
        };

        self.replace(PATIENTS_KEY, patients).await?;
        self.replace(PLANS_KEY, plans).await?;
        self.replace(SESSIONS_KEY, sessions).await?;

        tracing::info!(?imported, "snapshot imported");
        Ok(imported)
    }

    // ========================================
    // Queue plumbing
    // ========================================

    fn read<T>(&self, key: &'static str) -> Ticket<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        self.queues
            .for_key(key)
            .enqueue(move || async move { read_collection(&*store, key).await })
    }

    /// Read-modify-write of one collection as a single queued operation.
    /// Nothing is written back when `mutate` fails.
    fn modify<T, R, F>(&self, key: &'static str, mutate: F) -> Ticket<R, StoreError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        R: Send + 'static,
        F: FnOnce(&mut Vec<T>) -> Result<R, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        self.queues.for_key(key).enqueue(move || async move {
            let mut items = read_collection::<T>(&*store, key).await?;
            let out = mutate(&mut items)?;
            write_collection(&*store, key, &items).await?;
            Ok(out)
        })
    }

    fn replace<T>(&self, key: &'static str, items: Vec<T>) -> Ticket<(), StoreError>
    where
        T: Serialize + Send + Sync + 'static,
    {
        let store = Arc::clone(&self.store);
        self.queues
            .for_key(key)
            .enqueue(move || async move { write_collection(&*store, key, &items).await })
    }

    async fn sessions_where<P>(&self, predicate: P) -> Result<Vec<TreatmentSession>, StoreError>
    where
        P: Fn(&TreatmentSession) -> bool,
    {
        let sessions: Vec<TreatmentSession> = self.read(SESSIONS_KEY).await?;
        let mut matching: Vec<_> = sessions.into_iter().filter(|s| predicate(s)).collect();
        matching.sort_by_key(|s| (s.session_date, s.created_at));
        Ok(matching)
    }
}

/// Read a whole collection; a missing key is an empty collection.
pub async fn read_collection<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Vec<T>, StoreError> {
    match store.get_item(key).await? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}

pub async fn write_collection<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    items: &[T],
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(items)?;
    store.set_item(key, raw).await
}

/// Apply the rules `save_patient`, `save_plan` and `save_session` enforce to a whole snapshot.
fn check_snapshot(snapshot: &Snapshot) -> Result<(), StoreError> {
    let mut patients = BTreeSet::new();
    for patient in &snapshot.patients {
        patient.validate()?;
        if !patients.insert(patient.id) {
            return Err(StoreError::AlreadyExists {
                kind: "patient",
                id: patient.id.to_string(),
            });
        }
    }

    let mut plans = BTreeMap::new();
    for plan in &snapshot.plans {
        plan.validate()?;
        if !patients.contains(&plan.patient_id) {
            return Err(StoreError::not_found("patient", plan.patient_id));
        }
        if plans.insert(plan.id, plan).is_some() {
            return Err(StoreError::AlreadyExists {
                kind: "plan",
                id: plan.id.to_string(),
            });
        }
    }

    let mut sessions = BTreeSet::new();
    for session in &snapshot.sessions {
        session.validate()?;
        if !patients.contains(&session.patient_id) {
            return Err(StoreError::not_found("patient", session.patient_id));
        }
        if let Some(plan_id) = session.plan_id {
            let plan = plans
                .get(&plan_id)
                .ok_or_else(|| StoreError::not_found("plan", plan_id))?;
            check_plan_owner(plan, session)?;
        }
        if !sessions.insert(session.id) {
            return Err(StoreError::AlreadyExists {
                kind: "session",
                id: session.id.to_string(),
            });
        }
    }
    Ok(())
}

fn check_plan_owner(plan: &TherapeuticPlan, session: &TreatmentSession) -> Result<(), StoreError> {
    if plan.patient_id != session.patient_id {
        return Err(StoreError::invalid(
            "planId",
            format!("{} belongs to another patient", plan.id),
        ));
    }
    Ok(())
}

fn retain_counting<T>(items: &mut Vec<T>, keep: impl Fn(&T) -> bool) -> usize {
    let before = items.len();
    items.retain(|item| keep(item));
    before - items.len()
}
