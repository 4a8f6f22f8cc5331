//! Two-tier store: relational primary with an in-memory fallback.
//!
//! The first failed primary write flips the store into degraded mode. From
//! then on every write goes to memory until the process exits; there is no
//! automatic recovery. Callers never see the failure, only [`StoreHealth`] does.
//!
//! Reads while degraded merge both tiers, so fallback ids are seeded above
//! the primary's highest id before the first fallback write.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use fitrelay_core::{ExerciseRecord, NewExercise};
use fitrelay_telemetry::metrics::{STORE_DEGRADED, STORE_FALLBACK_WRITES_TOTAL};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::StoreError;
use crate::memory::MemoryRecordStore;
use crate::stats::Statistics;
use crate::{newest_first, RecordStore, StoreSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// Relational backend configured and accepting writes.
    Primary,
    /// Relational backend failed once; writes go to memory.
    Degraded,
    /// No relational backend configured.
    MemoryOnly,
}

#[derive(Default)]
struct StoreHealth {
    degraded: AtomicBool,
    fallback_writes: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl StoreHealth {
    fn mark_degraded(&self, err: &StoreError) {
        *self.last_error.lock() = Some(err.to_string());
        if !self.degraded.swap(true, Ordering::AcqRel) {
            gauge!(STORE_DEGRADED).set(1.0);
            error!(error = %err, "relational store failed, switching to in-memory fallback");
        }
    }

    fn record_fallback_write(&self) {
        let _ = self.fallback_writes.fetch_add(1, Ordering::Relaxed);
        counter!(STORE_FALLBACK_WRITES_TOTAL).increment(1);
    }
}

/// Point-in-time view of store health for operators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub mode: StoreMode,
    pub source: StoreSource,
    pub fallback_writes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A history page plus the backend that served it.
#[derive(Clone, Debug)]
pub struct History {
    pub records: Vec<ExerciseRecord>,
    pub source: StoreSource,
}

pub struct ExerciseStore {
    primary: Option<Arc<dyn RecordStore>>,
    fallback: MemoryRecordStore,
    health: StoreHealth,
}

impl ExerciseStore {
    pub fn memory_only() -> Self {
        Self {
            primary: None,
            fallback: MemoryRecordStore::new(),
            health: StoreHealth::default(),
        }
    }

    pub fn with_primary(primary: Arc<dyn RecordStore>) -> Self {
        gauge!(STORE_DEGRADED).set(0.0);
        Self {
            primary: Some(primary),
            ..Self::memory_only()
        }
    }

    pub fn mode(&self) -> StoreMode {
        match &self.primary {
            None => StoreMode::MemoryOnly,
            Some(_) if self.health.degraded.load(Ordering::Acquire) => StoreMode::Degraded,
            Some(_) => StoreMode::Primary,
        }
    }

    /// Backend that currently takes writes.
    pub fn source(&self) -> StoreSource {
        match self.mode() {
            StoreMode::Primary => StoreSource::Database,
            StoreMode::Degraded | StoreMode::MemoryOnly => StoreSource::Memory,
        }
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            mode: self.mode(),
            source: self.source(),
            fallback_writes: self.health.fallback_writes.load(Ordering::Relaxed),
            last_error: self.health.last_error.lock().clone(),
        }
    }

    /// Persist a record. A primary failure is absorbed by the fallback, so
    /// this only errors if the fallback itself does.
    pub async fn insert(&self, new: NewExercise) -> Result<ExerciseRecord, StoreError> {
        let primary = match self.mode() {
            StoreMode::Primary => self.primary.as_ref(),
            StoreMode::Degraded | StoreMode::MemoryOnly => None,
        };

        if let Some(primary) = primary {
            match primary.insert(new.clone()).await {
                Ok(record) => {
                    self.fallback.reserve_through(record.id);
                    return Ok(record);
                }
                Err(e) => {
                    self.seed_fallback_ids(primary.as_ref()).await;
                    self.health.mark_degraded(&e);
                }
            }
        }

        let record = self.fallback.insert(new).await?;
        if self.primary.is_some() {
            self.health.record_fallback_write();
            warn!(record_id = record.id, "record saved to in-memory fallback");
        }
        Ok(record)
    }

    /// Lift fallback ids above rows the primary held before this process
    /// wrote to it. Runs before the degraded flag is set, so no fallback
    /// write precedes it.
    async fn seed_fallback_ids(&self, primary: &dyn RecordStore) {
        match primary.max_id().await {
            Ok(max) => self.fallback.reserve_through(max),
            Err(e) => warn!(error = %e, "primary max id unavailable, fallback ids follow observed writes"),
        }
    }

    /// Newest-first page across whichever backends hold records.
    pub async fn history(&self, limit: usize) -> Result<History, StoreError> {
        let records = match self.mode() {
            StoreMode::Primary => self.primary_records(Some(limit)).await?,
            StoreMode::MemoryOnly => self.fallback.list(limit).await?,
            StoreMode::Degraded => self.merged(Some(limit)).await?,
        };
        Ok(History {
            records,
            source: self.source(),
        })
    }

    pub async fn statistics(&self) -> Result<Statistics, StoreError> {
        let records = match self.mode() {
            StoreMode::Primary => self.primary_records(None).await?,
            StoreMode::MemoryOnly => self.fallback.all().await?,
            StoreMode::Degraded => self.merged(None).await?,
        };
        Ok(Statistics::from_records(&records))
    }

    async fn primary_records(&self, limit: Option<usize>) -> Result<Vec<ExerciseRecord>, StoreError> {
        let Some(primary) = &self.primary else {
            return Ok(Vec::new());
        };
        match limit {
            Some(limit) => primary.list(limit).await,
            None => primary.all().await,
        }
    }

    /// Degraded reads: primary rows if it still answers, plus fallback rows.
    async fn merged(&self, limit: Option<usize>) -> Result<Vec<ExerciseRecord>, StoreError> {
        let mut records = match self.primary_records(limit).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "primary read failed while degraded, serving memory only");
                Vec::new()
            }
        };
        records.extend(match limit {
            Some(limit) => self.fallback.list(limit).await?,
            None => self.fallback.all().await?,
        });
        records.sort_by(newest_first);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }
}
