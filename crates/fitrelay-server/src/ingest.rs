//! REST insert path. Shares the store and the saved notification with the
//! device path, but canonicalizes its input differently: names are
//! upper-cased and the device label defaults to `"Arduino"`.

use fitrelay_core::record::DEFAULT_DEVICE_LABEL;
use fitrelay_core::{ExerciseRecord, NewExercise, Reading};
use serde::Deserialize;

use crate::error::ApiError;
use crate::hub::{ConnectionHub, IngestPath};

/// Body of `POST /api/ejercicio`. The Spanish field names used by the
/// browser client are accepted as aliases.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSubmission {
    #[serde(alias = "ejercicio")]
    pub exercise_name: Option<String>,
    #[serde(alias = "objetivo")]
    pub target: Option<Reading>,
    #[serde(alias = "completado")]
    pub completed: Option<Reading>,
    #[serde(alias = "duracion", alias = "durationSeconds")]
    pub duration: Option<Reading>,
    #[serde(alias = "dispositivo", alias = "deviceLabel")]
    pub device: Option<String>,
}

impl ExerciseSubmission {
    /// Check required fields and canonicalize.
    ///
    /// `exerciseName` must be non-empty and `target` non-zero. `completed`
    /// only has to be present, so `0` is accepted. A zero duration is
    /// stored as absent.
    pub fn validate(self) -> Result<NewExercise, ApiError> {
        let exercise_name = self
            .exercise_name
            .filter(|name| !name.is_empty())
            .ok_or(ApiError::MissingFields)?;
        let target = self
            .target
            .filter(|t| *t != Reading::Value(0))
            .ok_or(ApiError::MissingFields)?;
        let completed = self.completed.ok_or(ApiError::MissingFields)?;

        Ok(NewExercise {
            exercise_name: exercise_name.to_uppercase(),
            target,
            completed,
            duration_seconds: self.duration.filter(|d| *d != Reading::Value(0)),
            device_label: self
                .device
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_DEVICE_LABEL.to_string()),
            timestamp: None,
        })
    }
}

/// Validate, persist and announce an API submission.
pub async fn submit(
    hub: &ConnectionHub,
    submission: ExerciseSubmission,
) -> Result<ExerciseRecord, ApiError> {
    let new = submission.validate()?;
    hub.persist(new, IngestPath::Api)
        .await
        .map_err(ApiError::internal("Error interno del servidor"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fitrelay_store::ExerciseStore;
    use serde_json::json;

    use super::*;

    fn parse(value: serde_json::Value) -> ExerciseSubmission {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn english_body_is_canonicalized() {
        let new = parse(json!({
            "exerciseName": "squat",
            "target": 10,
            "completed": 10,
            "duration": 30
        }))
        .validate()
        .unwrap();
        assert_eq!(new.exercise_name, "SQUAT");
        assert_eq!(new.target, Reading::Value(10));
        assert_eq!(new.duration_seconds, Some(Reading::Value(30)));
        assert_eq!(new.device_label, "Arduino");
        assert!(new.timestamp.is_none());
    }

    #[test]
    fn spanish_aliases_are_accepted() {
        let new = parse(json!({
            "ejercicio": "flexiones",
            "objetivo": "20",
            "completado": 15,
            "duracion": 45,
            "dispositivo": "ESP32"
        }))
        .validate()
        .unwrap();
        assert_eq!(new.exercise_name, "FLEXIONES");
        assert_eq!(new.target, Reading::Value(20));
        assert_eq!(new.completed, Reading::Value(15));
        assert_eq!(new.device_label, "ESP32");
    }

    #[test]
    fn completed_zero_is_valid() {
        let new = parse(json!({"exerciseName": "plank", "target": 1, "completed": 0}))
            .validate()
            .unwrap();
        assert_eq!(new.completed, Reading::Value(0));
        assert_eq!(new.duration_seconds, None);
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        for body in [
            json!({"target": 10, "completed": 10}),
            json!({"exerciseName": "", "target": 10, "completed": 10}),
            json!({"exerciseName": "squat", "completed": 10}),
            json!({"exerciseName": "squat", "target": 0, "completed": 10}),
            json!({"exerciseName": "squat", "target": 10}),
            json!({"exerciseName": "squat", "target": 10, "completed": null}),
        ] {
            let err = parse(body.clone()).validate().unwrap_err();
            assert!(matches!(err, ApiError::MissingFields), "{body}");
        }
    }

    #[test]
    fn zero_duration_and_empty_device_default() {
        let new = parse(json!({
            "exerciseName": "squat",
            "target": 10,
            "completed": 5,
            "duration": 0,
            "device": ""
        }))
        .validate()
        .unwrap();
        assert_eq!(new.duration_seconds, None);
        assert_eq!(new.device_label, "Arduino");
    }

    #[tokio::test]
    async fn submit_persists_and_notifies() {
        let hub = ConnectionHub::new(Arc::new(ExerciseStore::memory_only()));
        let (_id, mut rx) = hub.open().await;
        let _greeting = rx.try_recv().unwrap();

        let record = submit(
            &hub,
            parse(json!({"exerciseName": "squat", "target": 10, "completed": 10, "duration": 30})),
        )
        .await
        .unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.exercise_name, "SQUAT");

        let saved = rx.try_recv().unwrap();
        assert!(saved.starts_with("EJERCICIO_GUARDADO:"));
        assert!(saved.contains("\"exerciseName\":\"SQUAT\""));
    }

    #[tokio::test]
    async fn rejected_submission_stores_nothing() {
        let hub = ConnectionHub::new(Arc::new(ExerciseStore::memory_only()));
        let err = submit(&hub, parse(json!({"exerciseName": "squat"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingFields));
        assert!(hub.store().history(20).await.unwrap().records.is_empty());
    }
}
