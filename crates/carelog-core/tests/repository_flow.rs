//! End-to-end repository behaviour over the in-memory and file stores.

use std::sync::Arc;

use carelog_core::app::{Imported, Removed, Repository};
use carelog_core::domain::{
    Patient, PatientId, PatientPatch, PlanStatus, SNAPSHOT_VERSION, SessionId, Snapshot,
    TherapeuticPlan, TreatmentSession,
};
use carelog_core::impls::{FileKvStore, InMemoryKvStore};
use carelog_core::ports::FixedClock;
use carelog_core::{QueueScope, RepositoryBuilder, StoreError};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rstest::rstest;

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap(),
    ))
}

fn repo(scope: QueueScope) -> Repository {
    RepositoryBuilder::new()
        .store(Arc::new(InMemoryKvStore::new()))
        .clock(clock())
        .scope(scope)
        .build()
        .unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
}

#[rstest]
#[case::global(QueueScope::Global)]
#[case::per_key(QueueScope::PerKey)]
#[tokio::test]
async fn patient_lifecycle(#[case] scope: QueueScope) {
    let repo = repo(scope);
    let ana = repo.save_patient(Patient::new("Ana", repo.now())).await.unwrap();
    let bruno = repo.save_patient(Patient::new("Bruno", repo.now())).await.unwrap();

    let names: Vec<_> = repo
        .list_patients()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["Ana", "Bruno"]);

    let updated = repo
        .update_patient(
            ana.id,
            PatientPatch {
                notes: Some("post-op shoulder".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.notes, "post-op shoulder");
    assert_eq!(repo.get_patient(ana.id).await.unwrap(), updated);

    let removed = repo.delete_patient(bruno.id).await.unwrap();
    assert_eq!(
        removed,
        Removed {
            patients: 1,
            plans: 0,
            sessions: 0
        }
    );
    assert!(matches!(
        repo.get_patient(bruno.id).await,
        Err(StoreError::NotFound { kind: "patient", .. })
    ));
}

#[tokio::test]
async fn duplicate_and_invalid_patients_are_rejected_without_writing() {
    let repo = repo(QueueScope::Global);
    let ana = repo.save_patient(Patient::new("Ana", repo.now())).await.unwrap();

    let again = repo.save_patient(ana.clone()).await;
    assert!(matches!(again, Err(StoreError::AlreadyExists { kind: "patient", .. })));

    let blank = repo.save_patient(Patient::new("", repo.now())).await;
    assert!(matches!(blank, Err(StoreError::Invalid { field: "name", .. })));

    let bad_patch = repo
        .update_patient(
            ana.id,
            PatientPatch {
                name: Some("  ".into()),
                ..Default::default()
            },
        )
        .await;
    assert!(bad_patch.is_err());
    assert_eq!(repo.get_patient(ana.id).await.unwrap().name, "Ana");
    assert_eq!(repo.list_patients().await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_of_missing_patient_is_not_found() {
    let repo = repo(QueueScope::Global);
    let err = repo
        .update_patient(PatientId::generate(), PatientPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { kind: "patient", .. }));
}

#[tokio::test]
async fn plan_completes_when_its_sessions_are_done() {
    let repo = repo(QueueScope::PerKey);
    let patient = repo.save_patient(Patient::new("Carla", repo.now())).await.unwrap();
    let plan = repo
        .save_plan(TherapeuticPlan::new(patient.id, "Lumbar stabilization", 2, repo.now()))
        .await
        .unwrap();

    repo.save_session(TreatmentSession::new(patient.id, day(2), repo.now()).with_plan(plan.id))
        .await
        .unwrap();
    let progress = repo.plan_progress(plan.id).await.unwrap();
    assert_eq!((progress.completed, progress.total), (1, 2));
    assert_eq!(progress.percent(), 50);
    assert_eq!(repo.get_plan(plan.id).await.unwrap().status, PlanStatus::Active);

    repo.save_session(TreatmentSession::new(patient.id, day(4), repo.now()).with_plan(plan.id))
        .await
        .unwrap();
    assert!(repo.plan_progress(plan.id).await.unwrap().is_complete());
    assert_eq!(repo.get_plan(plan.id).await.unwrap().status, PlanStatus::Completed);
}

#[tokio::test]
async fn suspended_plan_is_not_completed_automatically() {
    let repo = repo(QueueScope::Global);
    let patient = repo.save_patient(Patient::new("Davi", repo.now())).await.unwrap();
    let plan = repo
        .save_plan(TherapeuticPlan::new(patient.id, "Gait training", 1, repo.now()))
        .await
        .unwrap();
    repo.update_plan_status(plan.id, PlanStatus::Suspended).await.unwrap();

    repo.save_session(TreatmentSession::new(patient.id, day(3), repo.now()).with_plan(plan.id))
        .await
        .unwrap();
    assert_eq!(repo.get_plan(plan.id).await.unwrap().status, PlanStatus::Suspended);
}

#[tokio::test]
async fn session_references_are_checked() {
    let repo = repo(QueueScope::Global);
    let eva = repo.save_patient(Patient::new("Eva", repo.now())).await.unwrap();
    let fabio = repo.save_patient(Patient::new("Fabio", repo.now())).await.unwrap();
    let evas_plan = repo
        .save_plan(TherapeuticPlan::new(eva.id, "Neck", 10, repo.now()))
        .await
        .unwrap();

    let orphan = repo
        .save_session(TreatmentSession::new(PatientId::generate(), day(1), repo.now()))
        .await;
    assert!(matches!(orphan, Err(StoreError::NotFound { kind: "patient", .. })));

    let wrong_owner = repo
        .save_session(TreatmentSession::new(fabio.id, day(1), repo.now()).with_plan(evas_plan.id))
        .await;
    assert!(matches!(wrong_owner, Err(StoreError::Invalid { field: "planId", .. })));

    let mut painful = TreatmentSession::new(eva.id, day(1), repo.now());
    painful.pain_after = Some(42);
    assert!(repo.save_session(painful).await.is_err());

    assert!(repo.list_sessions(eva.id).await.unwrap().is_empty());
    assert!(repo.delete_session(SessionId::generate()).await.is_err());
}

#[tokio::test]
async fn deleting_a_plan_detaches_its_sessions() {
    let repo = repo(QueueScope::Global);
    let patient = repo.save_patient(Patient::new("Gil", repo.now())).await.unwrap();
    let plan = repo
        .save_plan(TherapeuticPlan::new(patient.id, "Ankle", 5, repo.now()))
        .await
        .unwrap();
    for d in [1, 3] {
        repo.save_session(TreatmentSession::new(patient.id, day(d), repo.now()).with_plan(plan.id))
            .await
            .unwrap();
    }

    assert_eq!(repo.delete_plan(plan.id).await.unwrap(), 2);
    assert!(repo.list_plans(patient.id).await.unwrap().is_empty());
    let sessions = repo.list_sessions(patient.id).await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s.plan_id.is_none()));
}

#[tokio::test]
async fn deleting_a_patient_cascades() {
    let repo = repo(QueueScope::PerKey);
    let keep = repo.save_patient(Patient::new("Helena", repo.now())).await.unwrap();
    let gone = repo.save_patient(Patient::new("Igor", repo.now())).await.unwrap();

    for patient in [&keep, &gone] {
        let plan = repo
            .save_plan(TherapeuticPlan::new(patient.id, "Hip", 8, repo.now()))
            .await
            .unwrap();
        repo.save_session(TreatmentSession::new(patient.id, day(5), repo.now()).with_plan(plan.id))
            .await
            .unwrap();
        repo.save_session(TreatmentSession::new(patient.id, day(6), repo.now()))
            .await
            .unwrap();
    }

    let removed = repo.delete_patient(gone.id).await.unwrap();
    assert_eq!(
        removed,
        Removed {
            patients: 1,
            plans: 1,
            sessions: 2
        }
    );
    assert_eq!(repo.list_plans(keep.id).await.unwrap().len(), 1);
    assert_eq!(repo.list_sessions(keep.id).await.unwrap().len(), 2);
    assert!(repo.list_sessions(gone.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn snapshot_round_trips_between_repositories() {
    let clock = clock();
    let source = RepositoryBuilder::new()
        .store(Arc::new(InMemoryKvStore::new()))
        .clock(clock.clone())
        .build()
        .unwrap();
    let patient = source.save_patient(Patient::new("Julia", source.now())).await.unwrap();
    let plan = source
        .save_plan(TherapeuticPlan::new(patient.id, "Wrist", 6, source.now()))
        .await
        .unwrap();
    clock.advance(Duration::days(1));
    source
        .save_session(TreatmentSession::new(patient.id, day(7), source.now()).with_plan(plan.id))
        .await
        .unwrap();

    let snapshot = source.export_snapshot().await.unwrap();
    assert_eq!(snapshot.exported_at, clock_start() + Duration::days(1));

    let dir = tempfile::tempdir().unwrap();
    let target = RepositoryBuilder::new()
        .store(Arc::new(FileKvStore::open(dir.path()).await.unwrap()))
        .build()
        .unwrap();
    let imported = target.import_snapshot(snapshot.clone()).await.unwrap();
    assert_eq!(
        imported,
        Imported {
            patients: 1,
            plans: 1,
            sessions: 1
        }
    );

    let exported_again = target.export_snapshot().await.unwrap();
    assert_eq!(exported_again.patients, snapshot.patients);
    assert_eq!(exported_again.plans, snapshot.plans);
    assert_eq!(exported_again.sessions, snapshot.sessions);
}

#[tokio::test]
async fn snapshot_from_the_future_is_refused() {
    let repo = repo(QueueScope::Global);
    let mut snapshot = repo.export_snapshot().await.unwrap();
    assert!(snapshot.is_empty());
    snapshot.version += 1;

    let err = repo.import_snapshot(snapshot).await.unwrap_err();
    assert!(matches!(err, StoreError::Invalid { field: "version", .. }));
}

fn clock_start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap()
}

fn snapshot_with(
    patients: Vec<Patient>,
    plans: Vec<TherapeuticPlan>,
    sessions: Vec<TreatmentSession>,
) -> Snapshot {
    Snapshot {
        version: SNAPSHOT_VERSION,
        exported_at: clock_start(),
        patients,
        plans,
        sessions,
    }
}

#[tokio::test]
async fn snapshot_with_dangling_plan_reference_is_refused() {
    let repo = repo(QueueScope::Global);
    let kept = repo.save_patient(Patient::new("Kai", repo.now())).await.unwrap();

    let patient = Patient::new("Lara", clock_start());
    let missing_plan = TherapeuticPlan::new(patient.id, "Elbow", 4, clock_start());
    let session = TreatmentSession::new(patient.id, day(8), clock_start()).with_plan(missing_plan.id);

    let err = repo
        .import_snapshot(snapshot_with(vec![patient], vec![], vec![session]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { kind: "plan", .. }));
    // nothing was replaced
    assert_eq!(repo.list_patients().await.unwrap(), vec![kept]);
}

#[tokio::test]
async fn snapshot_session_on_another_patients_plan_is_refused() {
    let repo = repo(QueueScope::Global);
    let owner = Patient::new("Mia", clock_start());
    let other = Patient::new("Nuno", clock_start());
    let plan = TherapeuticPlan::new(owner.id, "Back", 3, clock_start());
    let session = TreatmentSession::new(other.id, day(9), clock_start()).with_plan(plan.id);

    let err = repo
        .import_snapshot(snapshot_with(vec![owner, other], vec![plan], vec![session]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid { field: "planId", .. }));
}

#[rstest]
#[case::patient("patient")]
#[case::plan("plan")]
#[case::session("session")]
#[tokio::test]
async fn snapshot_with_duplicate_ids_is_refused(#[case] duplicated: &'static str) {
    let repo = repo(QueueScope::Global);
    let patient = Patient::new("Olga", clock_start());
    let plan = TherapeuticPlan::new(patient.id, "Knee", 3, clock_start());
    let session = TreatmentSession::new(patient.id, day(10), clock_start()).with_plan(plan.id);

    let mut snapshot = snapshot_with(vec![patient.clone()], vec![plan.clone()], vec![session.clone()]);
    match duplicated {
        "patient" => snapshot.patients.push(patient),
        "plan" => snapshot.plans.push(plan),
        _ => snapshot.sessions.push(session),
    }

    let err = repo.import_snapshot(snapshot).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { kind, .. } if kind == duplicated));
    assert!(repo.list_patients().await.unwrap().is_empty());
}
