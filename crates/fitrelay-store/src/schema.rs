/// SQL DDL for the exercise database. Creation is idempotent; there are no
/// migrations beyond it.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS exercises (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    exercise_name TEXT NOT NULL CHECK (length(exercise_name) <= 50),
    target INTEGER NOT NULL,
    completed INTEGER NOT NULL,
    duration_seconds INTEGER,
    device_label TEXT NOT NULL DEFAULT 'Arduino' CHECK (length(device_label) <= 100)
);

CREATE INDEX IF NOT EXISTS idx_exercises_recorded_at ON exercises(recorded_at);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;

pub const RECORD_COLUMNS: &str =
    "id, recorded_at, exercise_name, target, completed, duration_seconds, device_label";
