//! Typed cell values
//!
//! [`Value`] is the normalized form of a cell. Values are produced only by
//! [`PropertyTypeRegistry`](crate::PropertyTypeRegistry) from raw JSON; the
//! stored form carries no type tag, so a value is always reinterpreted through
//! the owning property's type when read back.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Attachment reference held by `file` properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRef {
    pub name: String,
    pub url: String,
}

/// Normalized cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `text` and `long_text`
    Text(String),
    /// Finite number
    Number(f64),
    /// Calendar date
    Date(NaiveDate),
    /// Instant, normalized to UTC
    DateTime(DateTime<Utc>),
    Checkbox(bool),
    /// Option id
    Select(String),
    /// Option ids, de-duplicated, in submitted order
    MultiSelect(Vec<String>),
    /// User id
    User(String),
    Url(String),
    Email(String),
    Files(Vec<FileRef>),
}

/// Largest integer exactly representable in an f64
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Value {
    /// Untagged JSON form, as stored and as returned to clients
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Text(s) | Value::Select(s) | Value::User(s) | Value::Url(s) | Value::Email(s) => {
                Json::String(s.clone())
            }
            Value::Number(n) => number_to_json(*n),
            Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Json::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Checkbox(b) => Json::Bool(*b),
            Value::MultiSelect(ids) => Json::Array(ids.iter().cloned().map(Json::String).collect()),
            Value::Files(files) => Json::Array(
                files
                    .iter()
                    .map(|f| serde_json::json!({"name": f.name, "url": f.url}))
                    .collect(),
            ),
        }
    }

    /// Number of elements for list values, 1 for scalars
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Value::MultiSelect(ids) => ids.len(),
            Value::Files(files) => files.len(),
            _ => 1,
        }
    }

    /// Empty text or empty list
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Text(s) => s.is_empty(),
            Value::MultiSelect(ids) => ids.is_empty(),
            Value::Files(files) => files.is_empty(),
            _ => false,
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        #[allow(clippy::cast_possible_truncation)]
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
