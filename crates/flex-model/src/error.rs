//! Validation and storage errors
//!
//! Validation is never fail-fast: every problem found for a single write is
//! collected into [`ValidationErrors`] so a form can show all of them at once.

use crate::property::PropertyType;
use serde::Serialize;
use std::fmt;

/// Problem with a single field or property definition
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationError {
    /// Required property absent or null
    #[error("required property is missing")]
    MissingRequired,

    /// Value cannot be coerced to the property type
    #[error("expected {expected}, got {found}")]
    TypeMismatch {
        expected: PropertyType,
        found: String,
    },

    /// Property config is not valid for its type
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    /// Key is not part of the live schema
    #[error("unknown property")]
    UnknownProperty,

    /// Key does not match `^[a-z][a-z0-9_]*$`
    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },

    /// Number outside configured bounds
    #[error("value {value} outside bounds (min: {min:?}, max: {max:?})")]
    OutOfRange {
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },

    /// Select option id not declared in config
    #[error("unknown option '{option}'")]
    InvalidOption { option: String },
}

impl ValidationError {
    /// Build a type mismatch from the offending JSON value
    #[must_use]
    pub fn mismatch(expected: PropertyType, found: &serde_json::Value) -> Self {
        Self::TypeMismatch {
            expected,
            found: json_kind(found).to_string(),
        }
    }

    #[inline]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Validation error attached to a field name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    #[serde(flatten)]
    pub error: ValidationError,
}

impl FieldError {
    #[inline]
    pub fn new(field: impl Into<String>, error: ValidationError) -> Self {
        Self {
            field: field.into(),
            error,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.error)
    }
}

/// All field errors found for one write
#[derive(Debug, Clone, PartialEq, Default, thiserror::Error, Serialize)]
#[error("validation failed: {}", render(.0))]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

fn render(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-error collection
    #[must_use]
    pub fn single(field: impl Into<String>, error: ValidationError) -> Self {
        Self(vec![FieldError::new(field, error)])
    }

    pub fn push(&mut self, field: impl Into<String>, error: ValidationError) {
        self.0.push(FieldError::new(field, error));
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Errors reported for `field`
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.0
            .iter()
            .filter(move |e| e.field == field)
            .map(|e| &e.error)
    }

    /// `Ok(value)` when nothing was collected
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl IntoIterator for ValidationErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Failure in the storage layer behind a repository trait
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);
