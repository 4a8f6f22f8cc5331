//! Domain types shared by every fitrelay crate: the persisted exercise record
//! and the colon-delimited text protocol spoken by the browser bridge.

pub mod protocol;
pub mod record;

pub use protocol::{classify, EventKind, Frame};
pub use record::{ExerciseRecord, NewExercise, Reading};
