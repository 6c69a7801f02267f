//! Loosely typed documents as the store holds them, and the write-side
//! field values that may ask the store to stamp its own clock.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document body: an untyped JSON object.
pub type Fields = serde_json::Map<String, Value>;

/// A record read from the store.  Nothing about `fields` is guaranteed;
/// readers validate into the strict types in [`crate::models`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The field as a string, or `None` when missing or not a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(Value::as_bool)
    }

    /// The field parsed as a store timestamp.
    pub fn timestamp_field(&self, name: &str) -> Option<DateTime<Utc>> {
        self.str_field(name).and_then(parse_timestamp)
    }
}

/// A value to write.  `ServerTimestamp` is replaced by the store's clock
/// when the write is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    ServerTimestamp,
    Map(WriteFields),
}

/// Field set for a write.
pub type WriteFields = BTreeMap<String, FieldValue>;

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Value(Value::String(s.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Value(Value::String(s))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Value(Value::Bool(b))
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        Self::Value(Value::Array(items.into_iter().map(Value::String).collect()))
    }
}

impl From<Option<String>> for FieldValue {
    fn from(v: Option<String>) -> Self {
        Self::Value(v.map(Value::String).unwrap_or(Value::Null))
    }
}

impl From<WriteFields> for FieldValue {
    fn from(m: WriteFields) -> Self {
        Self::Map(m)
    }
}

/// How a `set` combines with an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Overwrite the whole document.
    Replace,
    /// Overwrite only the written top-level fields; create if absent.
    Merge,
}

/// Resolve every `ServerTimestamp` to `now`.
pub fn resolve_fields(fields: &WriteFields, now: DateTime<Utc>) -> Fields {
    resolve_with(fields, &|| Value::String(format_timestamp(now)))
}

/// Resolve every `ServerTimestamp` to `null`, the shape a locally pending
/// write has before the server has stamped it.
pub fn pending_fields(fields: &WriteFields) -> Fields {
    resolve_with(fields, &|| Value::Null)
}

fn resolve_with(fields: &WriteFields, stamp: &dyn Fn() -> Value) -> Fields {
    fields
        .iter()
        .map(|(name, value)| {
            let resolved = match value {
                FieldValue::Value(v) => v.clone(),
                FieldValue::ServerTimestamp => stamp(),
                FieldValue::Map(inner) => Value::Object(resolve_with(inner, stamp)),
            };
            (name.clone(), resolved)
        })
        .collect()
}

/// Apply a write to an existing body.
pub fn apply_write(existing: Option<Fields>, incoming: Fields, mode: SetMode) -> Fields {
    match (existing, mode) {
        (Some(mut current), SetMode::Merge) => {
            current.extend(incoming);
            current
        }
        _ => incoming,
    }
}

/// Fixed-width RFC 3339 (UTC, microseconds), so string order is time order.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Monotonic server clock: every reading is strictly later than the last
/// at the precision timestamps are stored with.
#[derive(Debug, Default)]
pub struct ServerClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let mut now = truncate_micros(Utc::now());
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

fn truncate_micros(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(t.timestamp_micros()).unwrap_or(t)
}
