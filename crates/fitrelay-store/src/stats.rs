//! Aggregates for the statistics endpoint.
//!
//! `completed` is treated as a percentage here: a record counts as finished
//! when `completed >= 100`, whatever its `target`.

use std::collections::BTreeMap;

use fitrelay_core::{ExerciseRecord, Reading};
use serde::{Serialize, Serializer};

pub const COMPLETION_THRESHOLD: i64 = 100;

/// Aggregate over a set of records. Keys match the browser client.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub completados: usize,
    #[serde(serialize_with = "serialize_average")]
    pub promedio_general: f64,
    pub tiempo_total_segundos: i64,
}

/// Per-exercise breakdown row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExerciseSummary {
    pub ejercicio: String,
    #[serde(flatten)]
    pub resumen: Summary,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub resumen: Summary,
    pub por_ejercicio: Vec<ExerciseSummary>,
}

impl Summary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ExerciseRecord>) -> Self {
        let mut total = 0usize;
        let mut completados = 0usize;
        let mut completed_sum = 0.0f64;
        let mut tiempo_total_segundos = 0i64;

        for record in records {
            total += 1;
            if matches!(record.completed, Reading::Value(n) if n >= COMPLETION_THRESHOLD) {
                completados += 1;
            }
            completed_sum += record.completed.as_f64();
            // Missing and unparseable durations count as zero. Device input
            // is unbounded, so the total pins at the i64 range.
            if let Some(Reading::Value(secs)) = record.duration_seconds {
                tiempo_total_segundos = tiempo_total_segundos.saturating_add(secs);
            }
        }

        let promedio_general = if total == 0 {
            0.0
        } else {
            completed_sum / total as f64
        };

        Self {
            total,
            completados,
            promedio_general,
            tiempo_total_segundos,
        }
    }
}

impl Statistics {
    pub fn from_records(records: &[ExerciseRecord]) -> Self {
        let mut groups: BTreeMap<&str, Vec<&ExerciseRecord>> = BTreeMap::new();
        for record in records {
            groups
                .entry(record.exercise_name.as_str())
                .or_default()
                .push(record);
        }

        Self {
            resumen: Summary::from_records(records),
            por_ejercicio: groups
                .into_iter()
                .map(|(name, group)| ExerciseSummary {
                    ejercicio: name.to_string(),
                    resumen: Summary::from_records(group),
                })
                .collect(),
        }
    }
}

/// Whole averages go out as JSON integers, non-finite ones as `null`.
fn serialize_average<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if !value.is_finite() {
        serializer.serialize_none()
    } else if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}
