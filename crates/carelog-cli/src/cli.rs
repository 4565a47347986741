use std::path::PathBuf;

use carelog_core::domain::{PatientId, PlanId, PlanStatus, SessionId};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// carelog: patients, therapeutic plans and treatment sessions on a local store.
#[derive(Debug, Parser)]
#[command(name = "carelog", version, about)]
pub struct Cli {
    /// Settings file (TOML). Defaults to ./carelog.toml when present.
    #[arg(long, global = true, env = "CARELOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use a throwaway in-memory store instead of the configured backend.
    #[arg(long, global = true)]
    pub memory: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage patients
    #[command(subcommand)]
    Patient(PatientCommand),

    /// Manage therapeutic plans
    #[command(subcommand)]
    Plan(PlanCommand),

    /// Record treatment sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// Show completed vs planned sessions of a plan
    Progress { plan: PlanId },

    /// Write every collection as a JSON snapshot
    Export {
        /// Output file; stdout when omitted
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Replace every collection with a JSON snapshot
    Import { file: PathBuf },

    /// Race concurrent appends with and without the serial queue
    Race {
        #[arg(long, default_value_t = 5)]
        writers: usize,

        /// Per-call latency of the in-memory store used for the race
        #[arg(long, default_value_t = 10)]
        latency_ms: u64,
    },

    /// Print queue statistics
    Stats,
}

#[derive(Debug, Subcommand)]
pub enum PatientCommand {
    Add {
        name: String,
        #[command(flatten)]
        details: PatientDetails,
    },
    List,
    Show { id: PatientId },
    Update {
        id: PatientId,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        details: PatientDetails,
    },
    /// Delete a patient with all of their plans and sessions
    Rm { id: PatientId },
}

#[derive(Debug, Args)]
pub struct PatientDetails {
    #[arg(long)]
    pub phone: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    pub birth_date: Option<NaiveDate>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum PlanCommand {
    Add {
        patient: PatientId,
        title: String,
        /// Number of prescribed sessions
        #[arg(long)]
        sessions: u32,
        /// Treatment goal (repeatable)
        #[arg(long = "goal")]
        goals: Vec<String>,
    },
    List { patient: PatientId },
    /// Set status: active, completed or suspended
    Status { id: PlanId, status: PlanStatus },
    /// Delete a plan; its sessions are kept but detached
    Rm { id: PlanId },
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    Add {
        patient: PatientId,
        #[arg(long)]
        plan: Option<PlanId>,
        /// YYYY-MM-DD, today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Pain before the session (0-10)
        #[arg(long)]
        pain_before: Option<u8>,
        /// Pain after the session (0-10)
        #[arg(long)]
        pain_after: Option<u8>,
        #[arg(long)]
        notes: Option<String>,
    },
    List {
        patient: PatientId,
        /// Only sessions of this plan
        #[arg(long)]
        plan: Option<PlanId>,
    },
    Rm { id: SessionId },
}
