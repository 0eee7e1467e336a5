//! Property type registry
//!
//! The single place where "dynamic typing" lives. Each [`PropertyType`] owns
//! four rules, all defined here:
//!
//! - coercion of raw JSON into a normalized [`Value`] ([`validate`](PropertyTypeRegistry::validate))
//! - config validity ([`config_is_valid`](PropertyTypeRegistry::config_is_valid))
//! - a total order for sorting ([`compare`](PropertyTypeRegistry::compare))
//! - the stored form ([`serialize`](PropertyTypeRegistry::serialize) / [`deserialize`](PropertyTypeRegistry::deserialize))
//!
//! New types are added by extending [`PropertyType`] and the matches below;
//! the registry is not user-pluggable.

use crate::error::ValidationError;
use crate::operator::FilterOperator;
use crate::property::{PropertyConfig, PropertyDefinition, PropertyType};
use crate::value::{FileRef, Value};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::HashSet;

static EMAIL_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

const TEXT_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Equals,
    FilterOperator::NotEquals,
    FilterOperator::Contains,
    FilterOperator::In,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const ORDERED_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Equals,
    FilterOperator::NotEquals,
    FilterOperator::Range,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const CHECKBOX_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Equals,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const SELECT_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Equals,
    FilterOperator::NotEquals,
    FilterOperator::In,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const MULTI_SELECT_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Contains,
    FilterOperator::In,
    FilterOperator::IsEmpty,
    FilterOperator::IsNotEmpty,
];

const EMPTINESS_OPERATORS: &[FilterOperator] = &[FilterOperator::IsEmpty, FilterOperator::IsNotEmpty];

/// Validation, coercion, ordering and serialization rules per property type
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyTypeRegistry;

impl PropertyTypeRegistry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Coerce a raw client value and check it against the property config
    ///
    /// # Errors
    /// - `TypeMismatch` if the value cannot be coerced to the type
    /// - `OutOfRange` if a number violates `min`/`max`
    /// - `InvalidOption` if a select id is not declared
    pub fn validate(&self, def: &PropertyDefinition, raw: &Json) -> Result<Value, ValidationError> {
        let value = self.coerce(def.property_type, raw)?;
        self.check_constraints(&def.config, &value)?;
        Ok(value)
    }

    /// Stored (untagged JSON) form of a value
    #[inline]
    #[must_use]
    pub fn serialize(&self, value: &Value) -> Json {
        value.to_json()
    }

    /// Read a stored value back as `property_type`
    ///
    /// Structural only: config constraints are not re-checked, so values
    /// written under an earlier config (a since-removed option, an old bound)
    /// still read.
    pub fn deserialize(&self, property_type: PropertyType, stored: &Json) -> Result<Value, ValidationError> {
        self.coerce(property_type, stored)
    }

    /// Check that `config` only sets fields meaningful for `property_type`
    /// and that those fields are consistent
    pub fn config_is_valid(
        &self,
        property_type: PropertyType,
        config: &PropertyConfig,
    ) -> Result<(), ValidationError> {
        let is_number = property_type == PropertyType::Number;
        let is_date = matches!(property_type, PropertyType::Date | PropertyType::Datetime);

        if !is_number && (config.min.is_some() || config.max.is_some()) {
            return Err(ValidationError::invalid_config(format!(
                "min/max not supported for {property_type}"
            )));
        }
        if !property_type.has_options() && config.options.is_some() {
            return Err(ValidationError::invalid_config(format!(
                "options not supported for {property_type}"
            )));
        }
        if !is_date && config.date_format.is_some() {
            return Err(ValidationError::invalid_config(format!(
                "dateFormat not supported for {property_type}"
            )));
        }

        if is_number {
            Self::check_bounds(config)?;
        }
        if property_type.has_options() {
            Self::check_options(config)?;
        }
        if let Some(format) = &config.date_format {
            Self::check_date_format(format)?;
        }
        Ok(())
    }

    /// Total order of two values of the property
    ///
    /// - number, date, datetime: ascending numeric / chronological
    /// - text-like: case-insensitive lexicographic, exact bytes as tiebreak
    /// - checkbox: `false < true`
    /// - select: declared option order, undeclared ids last
    /// - multi_select, file: element count, then first element
    #[must_use]
    pub fn compare(&self, def: &PropertyDefinition, a: &Value, b: &Value) -> Ordering {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x.total_cmp(y),
            (Value::Date(x), Value::Date(y)) => x.cmp(y),
            (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
            (Value::Checkbox(x), Value::Checkbox(y)) => x.cmp(y),
            (Value::Select(x), Value::Select(y)) => option_cmp(&def.config, x, y),
            (Value::MultiSelect(x), Value::MultiSelect(y)) => x.len().cmp(&y.len()).then_with(|| {
                match (x.first(), y.first()) {
                    (Some(fx), Some(fy)) => option_cmp(&def.config, fx, fy),
                    _ => Ordering::Equal,
                }
            }),
            (Value::Files(x), Value::Files(y)) => x.len().cmp(&y.len()).then_with(|| {
                match (x.first(), y.first()) {
                    (Some(fx), Some(fy)) => text_cmp(&fx.name, &fy.name),
                    _ => Ordering::Equal,
                }
            }),
            _ => match (text_of(a), text_of(b)) {
                (Some(x), Some(y)) => text_cmp(x, y),
                _ => variant_rank(a).cmp(&variant_rank(b)),
            },
        }
    }

    /// Filter operators allowed on `property_type`
    #[must_use]
    pub fn operators(&self, property_type: PropertyType) -> &'static [FilterOperator] {
        match property_type {
            PropertyType::Text | PropertyType::LongText | PropertyType::Url | PropertyType::Email => {
                TEXT_OPERATORS
            }
            PropertyType::Number | PropertyType::Date | PropertyType::Datetime => ORDERED_OPERATORS,
            PropertyType::Checkbox => CHECKBOX_OPERATORS,
            PropertyType::Select | PropertyType::User => SELECT_OPERATORS,
            PropertyType::MultiSelect => MULTI_SELECT_OPERATORS,
            PropertyType::File => EMPTINESS_OPERATORS,
        }
    }

    /// Whether `operator` may be applied to `property_type`
    #[inline]
    #[must_use]
    pub fn allows(&self, property_type: PropertyType, operator: FilterOperator) -> bool {
        self.operators(property_type).contains(&operator)
    }

    fn coerce(&self, property_type: PropertyType, raw: &Json) -> Result<Value, ValidationError> {
        let mismatch = || ValidationError::mismatch(property_type, raw);

        match property_type {
            PropertyType::Text | PropertyType::LongText => {
                raw.as_str().map(|s| Value::Text(s.to_string())).ok_or_else(mismatch)
            }
            PropertyType::Number => {
                let n = match raw {
                    Json::Number(n) => n.as_f64(),
                    Json::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                // Adding +0.0 folds -0.0 into +0.0
                n.filter(|n| n.is_finite())
                    .map(|n| Value::Number(n + 0.0))
                    .ok_or_else(mismatch)
            }
            PropertyType::Date => raw
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
                .map(Value::Date)
                .ok_or_else(mismatch),
            PropertyType::Datetime => raw
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .ok_or_else(mismatch),
            PropertyType::Checkbox => raw.as_bool().map(Value::Checkbox).ok_or_else(mismatch),
            PropertyType::Select => non_empty_str(raw)
                .map(|s| Value::Select(s.to_string()))
                .ok_or_else(mismatch),
            PropertyType::MultiSelect => {
                let items = raw.as_array().ok_or_else(mismatch)?;
                let mut seen = HashSet::new();
                let mut ids = Vec::with_capacity(items.len());
                for item in items {
                    let id = non_empty_str(item).ok_or_else(mismatch)?;
                    if seen.insert(id) {
                        ids.push(id.to_string());
                    }
                }
                Ok(Value::MultiSelect(ids))
            }
            PropertyType::User => non_empty_str(raw)
                .map(|s| Value::User(s.trim().to_string()))
                .ok_or_else(mismatch),
            PropertyType::Url => raw
                .as_str()
                .map(str::trim)
                .filter(|s| url::Url::parse(s).is_ok())
                .map(|s| Value::Url(s.to_string()))
                .ok_or_else(mismatch),
            PropertyType::Email => raw
                .as_str()
                .map(str::trim)
                .filter(|s| EMAIL_FORMAT.is_match(s))
                .map(|s| Value::Email(s.to_string()))
                .ok_or_else(mismatch),
            PropertyType::File => {
                let items = raw.as_array().ok_or_else(mismatch)?;
                items
                    .iter()
                    .map(|item| {
                        serde_json::from_value::<FileRef>(item.clone())
                            .ok()
                            .filter(|f| !f.name.trim().is_empty())
                            .ok_or_else(mismatch)
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Files)
            }
        }
    }

    fn check_constraints(&self, config: &PropertyConfig, value: &Value) -> Result<(), ValidationError> {
        match value {
            Value::Number(n) => {
                let below = config.min.is_some_and(|min| *n < min);
                let above = config.max.is_some_and(|max| *n > max);
                if below || above {
                    return Err(ValidationError::OutOfRange {
                        value: *n,
                        min: config.min,
                        max: config.max,
                    });
                }
                Ok(())
            }
            Value::Select(id) => check_option(config, id),
            Value::MultiSelect(ids) => ids.iter().try_for_each(|id| check_option(config, id)),
            _ => Ok(()),
        }
    }

    fn check_bounds(config: &PropertyConfig) -> Result<(), ValidationError> {
        for bound in [config.min, config.max].into_iter().flatten() {
            if !bound.is_finite() {
                return Err(ValidationError::invalid_config("bounds must be finite"));
            }
        }
        if let (Some(min), Some(max)) = (config.min, config.max) {
            if min > max {
                return Err(ValidationError::invalid_config(format!(
                    "min ({min}) greater than max ({max})"
                )));
            }
        }
        Ok(())
    }

    fn check_options(config: &PropertyConfig) -> Result<(), ValidationError> {
        let options = match &config.options {
            Some(options) if !options.is_empty() => options,
            _ => return Err(ValidationError::invalid_config("at least one option required")),
        };

        let mut ids = HashSet::new();
        for option in options {
            if option.id.trim().is_empty() {
                return Err(ValidationError::invalid_config("option id must not be empty"));
            }
            if option.label.trim().is_empty() {
                return Err(ValidationError::invalid_config(format!(
                    "option '{}' has an empty label",
                    option.id
                )));
            }
            if !ids.insert(option.id.as_str()) {
                return Err(ValidationError::invalid_config(format!(
                    "duplicate option id '{}'",
                    option.id
                )));
            }
        }
        Ok(())
    }

    fn check_date_format(format: &str) -> Result<(), ValidationError> {
        if format.trim().is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(ValidationError::invalid_config(format!(
                "unparseable date format '{format}'"
            )));
        }
        Ok(())
    }
}

fn non_empty_str(raw: &Json) -> Option<&str> {
    raw.as_str().filter(|s| !s.trim().is_empty())
}

fn check_option(config: &PropertyConfig, id: &str) -> Result<(), ValidationError> {
    if config.option_position(id).is_some() {
        Ok(())
    } else {
        Err(ValidationError::InvalidOption {
            option: id.to_string(),
        })
    }
}

fn option_cmp(config: &PropertyConfig, a: &str, b: &str) -> Ordering {
    let rank = |id: &str| config.option_position(id).unwrap_or(usize::MAX);
    rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
}

fn text_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::Text(s) | Value::Url(s) | Value::Email(s) | Value::User(s) => Some(s),
        _ => None,
    }
}

fn variant_rank(value: &Value) -> u8 {
    match value {
        Value::Text(_) => 0,
        Value::Number(_) => 1,
        Value::Date(_) => 2,
        Value::DateTime(_) => 3,
        Value::Checkbox(_) => 4,
        Value::Select(_) => 5,
        Value::MultiSelect(_) => 6,
        Value::User(_) => 7,
        Value::Url(_) => 8,
        Value::Email(_) => 9,
        Value::Files(_) => 10,
    }
}
