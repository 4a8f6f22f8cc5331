pub mod database;
pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod stats;
pub mod tiered;

use async_trait::async_trait;
use fitrelay_core::{ExerciseRecord, NewExercise};
use serde::{Deserialize, Serialize};

pub use database::Database;
pub use error::StoreError;
pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;
pub use stats::{ExerciseSummary, Statistics, Summary};
pub use tiered::{ExerciseStore, HealthSnapshot, History, StoreMode};

/// Which backend answered a read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreSource {
    Database,
    Memory,
}

impl StoreSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Memory => "memory",
        }
    }
}

/// Insert and list contract shared by the relational and in-memory backends.
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn source(&self) -> StoreSource;

    /// Persist `new`, assigning its id (and timestamp if absent).
    async fn insert(&self, new: NewExercise) -> Result<ExerciseRecord, StoreError>;

    /// Most recent first, at most `limit` records.
    async fn list(&self, limit: usize) -> Result<Vec<ExerciseRecord>, StoreError>;

    /// Every record, most recent first.
    async fn all(&self) -> Result<Vec<ExerciseRecord>, StoreError>;

    /// Highest id assigned so far, `0` when empty.
    async fn max_id(&self) -> Result<i64, StoreError>;
}

/// Newest-first ordering used by every backend; ties go to the higher id.
pub(crate) fn newest_first(a: &ExerciseRecord, b: &ExerciseRecord) -> std::cmp::Ordering {
    b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id))
}
