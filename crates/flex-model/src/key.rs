//! Property keys
//!
//! Provides [`PropertyKey`], the immutable identifier of a column within a table.

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

static KEY_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid key regex"));

/// Maximum key length in bytes
pub const MAX_KEY_LEN: usize = 64;

/// Column key, lowercase snake_case
///
/// Keys are assigned once when a property is created and never change.
/// Display names are the mutable, user-facing label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PropertyKey(String);

impl PropertyKey {
    /// Key as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn check(raw: &str) -> Result<(), ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::InvalidKey {
                reason: "empty key".to_string(),
            });
        }
        if raw.len() > MAX_KEY_LEN {
            return Err(ValidationError::InvalidKey {
                reason: format!("longer than {MAX_KEY_LEN} bytes"),
            });
        }
        if !KEY_FORMAT.is_match(raw) {
            return Err(ValidationError::InvalidKey {
                reason: format!("'{raw}' must match ^[a-z][a-z0-9_]*$"),
            });
        }
        Ok(())
    }
}

impl FromStr for PropertyKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::check(s)?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for PropertyKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::check(&value)?;
        Ok(Self(value))
    }
}

impl From<PropertyKey> for String {
    fn from(key: PropertyKey) -> Self {
        key.0
    }
}

impl AsRef<str> for PropertyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for PropertyKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Display for PropertyKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How incoming key strings are matched against the schema
///
/// With `case_insensitive` set, keys are lowercased before validation, so
/// imports that spell `Amount` land on `amount` and collide with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyPolicy {
    pub case_insensitive: bool,
}

impl KeyPolicy {
    /// Strict policy: keys must already be lowercase
    #[inline]
    #[must_use]
    pub fn strict() -> Self {
        Self {
            case_insensitive: false,
        }
    }

    /// Lowercase-folding policy
    #[inline]
    #[must_use]
    pub fn case_insensitive() -> Self {
        Self {
            case_insensitive: true,
        }
    }

    /// Turn a raw key string into a [`PropertyKey`] under this policy
    pub fn normalize(&self, raw: &str) -> Result<PropertyKey, ValidationError> {
        if self.case_insensitive {
            PropertyKey::from_str(&raw.to_lowercase())
        } else {
            PropertyKey::from_str(raw)
        }
    }
}
