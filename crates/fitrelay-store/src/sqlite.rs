use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use fitrelay_core::{ExerciseRecord, NewExercise, Reading};
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;
use crate::schema::RECORD_COLUMNS;
use crate::{RecordStore, StoreSource};

/// Relational backend over a SQLite [`Database`].
///
/// Statements run on the blocking pool so callers suspend instead of
/// holding a runtime worker while SQLite works.
#[derive(Clone)]
pub struct SqliteRecordStore {
    db: Database,
}

impl SqliteRecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn run<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f)).await?
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    fn source(&self) -> StoreSource {
        StoreSource::Database
    }

    #[instrument(skip_all, fields(exercise = %new.exercise_name))]
    async fn insert(&self, new: NewExercise) -> Result<ExerciseRecord, StoreError> {
        let recorded_at = new
            .timestamp
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        self.run(move |conn| {
            let sql = format!(
                "INSERT INTO exercises (recorded_at, exercise_name, target, completed, duration_seconds, device_label)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 RETURNING {RECORD_COLUMNS}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params![
                recorded_at,
                new.exercise_name,
                new.target.value(),
                new.completed.value(),
                new.duration_seconds.and_then(Reading::value),
                new.device_label,
            ])?;
            let row = rows
                .next()?
                .ok_or_else(|| StoreError::Database("insert returned no row".into()))?;
            row_to_record(row)
        })
        .await
    }

    async fn list(&self, limit: usize) -> Result<Vec<ExerciseRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM exercises ORDER BY recorded_at DESC, id DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query([limit])?;
            collect_rows(rows)
        })
        .await
    }

    async fn all(&self) -> Result<Vec<ExerciseRecord>, StoreError> {
        self.run(|conn| {
            let sql = format!("SELECT {RECORD_COLUMNS} FROM exercises ORDER BY recorded_at DESC, id DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query([])?;
            collect_rows(rows)
        })
        .await
    }

    async fn max_id(&self) -> Result<i64, StoreError> {
        self.run(|conn| {
            let max = conn.query_row("SELECT COALESCE(MAX(id), 0) FROM exercises", [], |row| {
                row.get(0)
            })?;
            Ok(max)
        })
        .await
    }
}

fn collect_rows(mut rows: rusqlite::Rows<'_>) -> Result<Vec<ExerciseRecord>, StoreError> {
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_record(row)?);
    }
    Ok(records)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<ExerciseRecord, StoreError> {
    let recorded_at: String = get(row, 1, "recorded_at")?;
    let timestamp = DateTime::parse_from_rfc3339(&recorded_at)
        .map_err(|e| StoreError::CorruptRow {
            table: "exercises",
            column: "recorded_at",
            detail: e.to_string(),
        })?
        .with_timezone(&Utc);

    Ok(ExerciseRecord {
        id: get(row, 0, "id")?,
        timestamp,
        exercise_name: get(row, 2, "exercise_name")?,
        target: Reading::Value(get(row, 3, "target")?),
        completed: Reading::Value(get(row, 4, "completed")?),
        duration_seconds: get::<Option<i64>>(row, 5, "duration_seconds")?.map(Reading::Value),
        device_label: get(row, 6, "device_label")?,
    })
}

fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table: "exercises",
        column,
        detail: e.to_string(),
    })
}
