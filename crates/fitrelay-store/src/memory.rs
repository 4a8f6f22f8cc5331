use async_trait::async_trait;
use fitrelay_core::{ExerciseRecord, NewExercise};
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::{newest_first, RecordStore, StoreSource};

struct Inner {
    records: Vec<ExerciseRecord>,
    next_id: i64,
}

/// In-process backend. Contents are lost on restart.
pub struct MemoryRecordStore {
    inner: Mutex<Inner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Append synchronously; the id counter and the vector move together.
    pub fn push(&self, new: NewExercise) -> ExerciseRecord {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let record = new.into_record(id);
        inner.records.push(record.clone());
        record
    }

    /// Never hand out an id at or below `id`. Lowering is a no-op.
    pub fn reserve_through(&self, id: i64) {
        let mut inner = self.inner.lock();
        inner.next_id = inner.next_id.max(id.saturating_add(1));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sorted(&self) -> Vec<ExerciseRecord> {
        let mut records = self.inner.lock().records.clone();
        records.sort_by(newest_first);
        records
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn source(&self) -> StoreSource {
        StoreSource::Memory
    }

    async fn insert(&self, new: NewExercise) -> Result<ExerciseRecord, StoreError> {
        Ok(self.push(new))
    }

    async fn list(&self, limit: usize) -> Result<Vec<ExerciseRecord>, StoreError> {
        let mut records = self.sorted();
        records.truncate(limit);
        Ok(records)
    }

    async fn all(&self) -> Result<Vec<ExerciseRecord>, StoreError> {
        Ok(self.sorted())
    }

    async fn max_id(&self) -> Result<i64, StoreError> {
        Ok(self.inner.lock().next_id - 1)
    }
}
