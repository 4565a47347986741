mod cli;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::json;

use carelog_core::app::run_append_race;
use carelog_core::domain::{Patient, PatientPatch, Snapshot, TherapeuticPlan, TreatmentSession};
use carelog_core::impls::InMemoryKvStore;
use carelog_core::ports::KeyValueStore;
use carelog_core::settings::StorageBackend;
use carelog_core::{Repository, RepositoryBuilder, SerialWriteQueue, Settings};

use crate::cli::{Cli, Command, PatientCommand, PlanCommand, SessionCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if cli.memory {
        settings.storage.backend = StorageBackend::Memory;
    }
    logging::init(&settings.log);
    tracing::debug!(backend = ?settings.storage.backend, scope = ?settings.queue.scope, "starting");

    let repo = RepositoryBuilder::new()
        .from_storage_settings(&settings.storage)
        .await?
        .scope(settings.queue.scope)
        .build()?;

    let outcome = run(&repo, cli.command).await;
    repo.wait_idle().await;
    outcome
}

async fn run(repo: &Repository, command: Command) -> Result<()> {
    match command {
        Command::Patient(cmd) => patient(repo, cmd).await,
        Command::Plan(cmd) => plan(repo, cmd).await,
        Command::Session(cmd) => session(repo, cmd).await,
        Command::Progress { plan } => print_json(&repo.plan_progress(plan).await?),
        Command::Export { out } => {
            let snapshot = repo.export_snapshot().await?;
            if snapshot.is_empty() {
                tracing::warn!("store is empty; exporting an empty snapshot");
            }
            let body = serde_json::to_string_pretty(&snapshot)?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, body)
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!(path = %path.display(), "snapshot exported");
                    Ok(())
                }
                None => {
                    println!("{body}");
                    Ok(())
                }
            }
        }
        Command::Import { file } => {
            let body = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&body)
                .with_context(|| format!("{} is not a carelog snapshot", file.display()))?;
            if snapshot.is_empty() {
                tracing::warn!(file = %file.display(), "empty snapshot; every collection will be cleared");
            }
            print_json(&repo.import_snapshot(snapshot).await?)
        }
        Command::Stats => {
            let snapshot = repo.export_snapshot().await?;
            print_json(&json!({
                "patients": snapshot.patients.len(),
                "plans": snapshot.plans.len(),
                "sessions": snapshot.sessions.len(),
                "queues": repo.queue_stats(),
            }))
        }
        Command::Race {
            writers,
            latency_ms,
        } => race(writers, latency_ms).await,
    }
}

async fn patient(repo: &Repository, cmd: PatientCommand) -> Result<()> {
    match cmd {
        PatientCommand::Add { name, details } => {
            let mut patient = Patient::new(name, repo.now());
            patient.phone = details.phone;
            patient.birth_date = details.birth_date;
            patient.notes = details.notes.unwrap_or_default();
            print_json(&repo.save_patient(patient).await?)
        }
        PatientCommand::List => print_json(&repo.list_patients().await?),
        PatientCommand::Show { id } => {
            let patient = repo.get_patient(id).await?;
            let plans = repo.list_plans(id).await?;
            let sessions = repo.list_sessions(id).await?;
            let relief: Vec<i16> = sessions.iter().filter_map(|s| s.pain_delta()).collect();
            let average_relief = (!relief.is_empty())
                .then(|| relief.iter().map(|d| f64::from(*d)).sum::<f64>() / relief.len() as f64);
            print_json(&json!({
                "patient": patient,
                "plans": plans,
                "sessions": sessions,
                "averagePainRelief": average_relief,
            }))
        }
        PatientCommand::Update { id, name, details } => {
            let patch = PatientPatch {
                name,
                birth_date: details.birth_date,
                phone: details.phone,
                notes: details.notes,
            };
            print_json(&repo.update_patient(id, patch).await?)
        }
        PatientCommand::Rm { id } => print_json(&repo.delete_patient(id).await?),
    }
}

async fn plan(repo: &Repository, cmd: PlanCommand) -> Result<()> {
    match cmd {
        PlanCommand::Add {
            patient,
            title,
            sessions,
            goals,
        } => {
            let mut plan = TherapeuticPlan::new(patient, title, sessions, repo.now());
            plan.goals = goals;
            print_json(&repo.save_plan(plan).await?)
        }
        PlanCommand::List { patient } => print_json(&repo.list_plans(patient).await?),
        PlanCommand::Status { id, status } => {
            print_json(&repo.update_plan_status(id, status).await?)
        }
        PlanCommand::Rm { id } => {
            let detached = repo.delete_plan(id).await?;
            print_json(&json!({ "deleted": id, "detachedSessions": detached }))
        }
    }
}

async fn session(repo: &Repository, cmd: SessionCommand) -> Result<()> {
    match cmd {
        SessionCommand::Add {
            patient,
            plan,
            date,
            pain_before,
            pain_after,
            notes,
        } => {
            let now = repo.now();
            let mut session =
                TreatmentSession::new(patient, date.unwrap_or_else(|| now.date_naive()), now);
            session.plan_id = plan;
            session.pain_before = pain_before;
            session.pain_after = pain_after;
            session.notes = notes.unwrap_or_default();
            print_json(&repo.save_session(session).await?)
        }
        SessionCommand::List { patient, plan } => {
            let sessions: Vec<_> = match plan {
                Some(plan) => repo
                    .list_plan_sessions(plan)
                    .await?
                    .into_iter()
                    .filter(|s| s.patient_id == patient)
                    .collect(),
                None => repo.list_sessions(patient).await?,
            };
            print_json(&sessions)
        }
        SessionCommand::Rm { id } => {
            repo.delete_session(id).await?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

/// Append race on a slow in-memory store, first without and then with the queue.
async fn race(writers: usize, latency_ms: u64) -> Result<()> {
    let store: Arc<dyn KeyValueStore> =
        Arc::new(InMemoryKvStore::with_latency(Duration::from_millis(latency_ms)));

    let unqueued = run_append_race(Arc::clone(&store), writers, None).await?;
    let queued = run_append_race(store, writers, Some(SerialWriteQueue::new())).await?;

    print_json(&json!({
        "unqueued": { "writers": unqueued.writers, "persisted": unqueued.persisted, "lost": unqueued.lost() },
        "queued": { "writers": queued.writers, "persisted": queued.persisted, "lost": queued.lost() },
    }))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
