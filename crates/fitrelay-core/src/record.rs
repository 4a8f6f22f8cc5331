use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Device label stamped on records relayed from the browser bridge.
pub const BRIDGE_DEVICE_LABEL: &str = "Arduino-BLE";

/// Device label used when an API caller does not name one.
pub const DEFAULT_DEVICE_LABEL: &str = "Arduino";

/// A numeric field as reported by a device or API caller.
///
/// Device frames are parsed leniently, so text without leading digits does
/// not fail the frame; it becomes [`Reading::NotANumber`] and travels with the
/// record. On the wire the sentinel is JSON `null`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reading {
    Value(i64),
    NotANumber,
}

impl Reading {
    /// Lenient integer parse: optional leading whitespace and sign, then the
    /// longest run of ASCII digits. Anything after the digits is ignored.
    pub fn parse_lenient(raw: &str) -> Self {
        let s = raw.trim_start();
        let (negative, digits) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let end = digits
            .bytes()
            .position(|b| !b.is_ascii_digit())
            .unwrap_or(digits.len());
        if end == 0 {
            return Self::NotANumber;
        }
        match digits[..end].parse::<i64>() {
            Ok(n) if negative => Self::Value(-n),
            Ok(n) => Self::Value(n),
            Err(_) => Self::NotANumber,
        }
    }

    pub fn value(self) -> Option<i64> {
        match self {
            Self::Value(n) => Some(n),
            Self::NotANumber => None,
        }
    }

    /// `0` and the sentinel are both "falsy" for API-side defaulting.
    pub fn is_zero_or_nan(self) -> bool {
        matches!(self, Self::Value(0) | Self::NotANumber)
    }

    /// Float view used by aggregates; the sentinel poisons sums like NaN does.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Value(n) => n as f64,
            Self::NotANumber => f64::NAN,
        }
    }
}

impl From<i64> for Reading {
    fn from(n: i64) -> Self {
        Self::Value(n)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(n) => write!(f, "{n}"),
            Self::NotANumber => f.write_str("NaN"),
        }
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(n) => serializer.serialize_i64(*n),
            Self::NotANumber => serializer.serialize_none(),
        }
    }
}

struct ReadingVisitor;

impl Visitor<'_> for ReadingVisitor {
    type Value = Reading;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer or numeric string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Reading, E> {
        Ok(Reading::Value(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Reading, E> {
        Ok(i64::try_from(v).map_or(Reading::NotANumber, Reading::Value))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Reading, E> {
        if v.is_finite() {
            Ok(Reading::Value(v.trunc() as i64))
        } else {
            Ok(Reading::NotANumber)
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Reading, E> {
        Ok(Reading::parse_lenient(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Reading, E> {
        Ok(Reading::NotANumber)
    }
}

impl<'de> Deserialize<'de> for Reading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ReadingVisitor)
    }
}

/// A record as submitted for storage, before the store assigns an id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewExercise {
    pub exercise_name: String,
    pub target: Reading,
    pub completed: Reading,
    pub duration_seconds: Option<Reading>,
    pub device_label: String,
    /// Left `None` to let the store stamp the write time.
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewExercise {
    /// Materialize the record with a store-assigned id. A not-a-number
    /// duration becomes absent, matching the nullable relational column.
    pub fn into_record(self, id: i64) -> ExerciseRecord {
        ExerciseRecord {
            id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            exercise_name: self.exercise_name,
            target: self.target,
            completed: self.completed,
            duration_seconds: self.duration_seconds.filter(|d| *d != Reading::NotANumber),
            device_label: self.device_label,
        }
    }
}

/// One durable completed (or partial) exercise attempt. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub exercise_name: String,
    pub target: Reading,
    pub completed: Reading,
    pub duration_seconds: Option<Reading>,
    pub device_label: String,
}
