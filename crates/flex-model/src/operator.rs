//! Filter operators
//!
//! Which operator applies to which property type is decided by
//! [`PropertyTypeRegistry::operators`](crate::PropertyTypeRegistry::operators).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Predicate operator of a query filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    /// Substring for text, membership for multi_select
    Contains,
    /// Bounds object `{gt, gte, lt, lte}`
    Range,
    /// Value is one of a list
    In,
    IsEmpty,
    IsNotEmpty,
}

impl FilterOperator {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::Contains => "contains",
            FilterOperator::Range => "range",
            FilterOperator::In => "in",
            FilterOperator::IsEmpty => "is_empty",
            FilterOperator::IsNotEmpty => "is_not_empty",
        }
    }

    /// Whether the operator takes an operand value
    #[inline]
    #[must_use]
    pub fn takes_operand(&self) -> bool {
        !matches!(self, FilterOperator::IsEmpty | FilterOperator::IsNotEmpty)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
