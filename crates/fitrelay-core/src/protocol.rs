//! Line protocol between the browser bridge and the relay.
//!
//! Frames are free-form UTF-8 strings. Three prefixes carry meaning; only the
//! completion frame has a payload, as colon-separated fields:
//!
//! ```text
//! EJERCICIO_COMPLETADO:<name>:<target>:<completed>:<duration>
//! ```
//!
//! Classification never fails. Unknown text is [`Frame::Opaque`] and is still
//! relayed to peers.

use crate::record::{ExerciseRecord, NewExercise, Reading, BRIDGE_DEVICE_LABEL};

/// Greeting queued for every connection as soon as it opens.
pub const READY_GREETING: &str = "WEB_BLUETOOTH_READY";

/// Prefix of the notification broadcast after a record is persisted.
pub const SAVED_PREFIX: &str = "EJERCICIO_GUARDADO";

/// Minimum colon-separated fields in a usable completion frame.
pub const COMPLETION_FIELDS: usize = 5;

/// Event kinds recognized by literal prefix, in match priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    BluetoothConnected,
    ExerciseStarted,
    ExerciseCompleted,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::BluetoothConnected,
        EventKind::ExerciseStarted,
        EventKind::ExerciseCompleted,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Self::BluetoothConnected => "BLUETOOTH_CONNECTED",
            Self::ExerciseStarted => "EJERCICIO_INICIADO",
            Self::ExerciseCompleted => "EJERCICIO_COMPLETADO",
        }
    }

    /// Short label for logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BluetoothConnected => "bluetooth_connected",
            Self::ExerciseStarted => "exercise_started",
            Self::ExerciseCompleted => "exercise_completed",
        }
    }
}

/// Result of classifying one inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame<'a> {
    /// No known prefix.
    Opaque(&'a str),
    /// Known prefix without a payload the relay acts on.
    Recognized(EventKind),
    /// Completion prefix. `None` when the frame has too few fields to build
    /// a record; such frames are dropped without any error signal.
    Completion(Option<NewExercise>),
}

impl Frame<'_> {
    /// Label for logs and metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Frame::Opaque(_) => "opaque",
            Frame::Recognized(kind) => kind.as_str(),
            Frame::Completion(Some(_)) => "exercise_completed",
            Frame::Completion(None) => "exercise_completed_short",
        }
    }
}

/// Classify a frame by prefix and extract the completion payload.
pub fn classify(text: &str) -> Frame<'_> {
    let kind = EventKind::ALL
        .into_iter()
        .find(|kind| text.starts_with(kind.prefix()));

    match kind {
        None => Frame::Opaque(text),
        Some(EventKind::ExerciseCompleted) => Frame::Completion(parse_completion(text)),
        Some(kind) => Frame::Recognized(kind),
    }
}

fn parse_completion(text: &str) -> Option<NewExercise> {
    let fields: Vec<&str> = text.split(':').collect();
    if fields.len() < COMPLETION_FIELDS {
        return None;
    }

    Some(NewExercise {
        exercise_name: fields[1].to_string(),
        target: Reading::parse_lenient(fields[2]),
        completed: Reading::parse_lenient(fields[3]),
        duration_seconds: Some(Reading::parse_lenient(fields[4])),
        device_label: BRIDGE_DEVICE_LABEL.to_string(),
        timestamp: None,
    })
}

/// Build the `EJERCICIO_GUARDADO:<json>` notification for a stored record.
pub fn saved_notification(record: &ExerciseRecord) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(record)?;
    Ok(format!("{SAVED_PREFIX}:{json}"))
}
