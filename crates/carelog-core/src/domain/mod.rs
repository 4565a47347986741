//! Domain model (IDs and the records kept in the store).
//!
//! - ids: ULID ベースの型付き ID
//! - patient / plan / session: store に JSON 配列として保存されるレコード
//! - snapshot: 全コレクションのバックアップ

pub mod ids;
pub mod patient;
pub mod plan;
pub mod session;
pub mod snapshot;

pub use ids::{PatientId, PlanId, SessionId};
pub use patient::{Patient, PatientPatch};
pub use plan::{PlanProgress, PlanStatus, TherapeuticPlan};
pub use session::{MAX_PAIN, TreatmentSession};
pub use snapshot::{SNAPSHOT_VERSION, Snapshot};
