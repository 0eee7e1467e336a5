//! Filters
//!
//! A [`Filter`] arrives as `(key, op, value)` and is compiled against the
//! current schema into a [`Predicate`]. Compilation rejects operators the
//! property type does not allow and operands that do not decode as the
//! property type. Operands are checked structurally only, so a filter may
//! still name a select option that has since been removed from the config.

use crate::error::QueryError;
use flex_model::{FilterOperator, KeyPolicy, PropertyDefinition, PropertyKey, PropertyType, PropertyTypeRegistry, Value};
use flex_record::ResolvedRecord;
use flex_schema::Table;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::cmp::Ordering;

/// One filter clause; clauses are AND-combined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub op: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,
}

impl Filter {
    pub fn new(key: impl Into<String>, op: FilterOperator, value: Json) -> Self {
        Self {
            key: key.into(),
            op,
            value: Some(value),
        }
    }

    /// Operand-less filter (`is_empty`, `is_not_empty`)
    pub fn unary(key: impl Into<String>, op: FilterOperator) -> Self {
        Self {
            key: key.into(),
            op,
            value: None,
        }
    }
}

/// Inclusive and exclusive bounds of a `range` filter
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bounds {
    pub gt: Option<Value>,
    pub gte: Option<Value>,
    pub lt: Option<Value>,
    pub lte: Option<Value>,
}

/// Decoded filter operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    One(Value),
    /// Lowercased needle for text `contains`
    Needle(String),
    Many(Vec<Value>),
    Range(Bounds),
}

/// Filter compiled against one schema snapshot
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Key is not in the live schema; nothing matches
    Never,
    Test {
        def: PropertyDefinition,
        op: FilterOperator,
        operand: Operand,
    },
}

impl Predicate {
    /// Compile `filter` (at position `index`) against `table`
    pub fn compile(
        filter: &Filter,
        index: usize,
        table: &Table,
        registry: &PropertyTypeRegistry,
        policy: KeyPolicy,
    ) -> Result<Self, QueryError> {
        let Some(def) = policy
            .normalize(&filter.key)
            .ok()
            .and_then(|key| table.property(key.as_str()))
        else {
            return Ok(Self::Never);
        };

        let field = format!("filters[{index}]");
        if !registry.allows(def.property_type, filter.op) {
            return Err(QueryError::invalid(
                format!("{field}.op"),
                format!("operator {} not allowed on {} property '{}'", filter.op, def.property_type, def.key),
            ));
        }

        let operand = compile_operand(def, filter.op, filter.value.as_ref(), registry)
            .map_err(|reason| QueryError::invalid(format!("{field}.value"), reason))?;

        Ok(Self::Test {
            def: def.clone(),
            op: filter.op,
            operand,
        })
    }

    /// Whether the record satisfies this predicate
    #[must_use]
    pub fn matches(&self, record: &ResolvedRecord, registry: &PropertyTypeRegistry) -> bool {
        let Self::Test { def, op, operand } = self else {
            return false;
        };
        let value = record.get(def.key.as_str());
        let empty = value.map_or(true, Value::is_empty);

        match op {
            FilterOperator::IsEmpty => empty,
            FilterOperator::IsNotEmpty => !empty,
            // Absent never equals anything, so it always differs
            FilterOperator::NotEquals => match (value, operand) {
                (Some(v), Operand::One(x)) => registry.compare(def, v, x) != Ordering::Equal,
                _ => true,
            },
            _ => value.is_some_and(|v| test_present(def, *op, operand, v, registry)),
        }
    }

    /// Key the predicate tests, if any
    #[must_use]
    pub fn key(&self) -> Option<&PropertyKey> {
        match self {
            Self::Never => None,
            Self::Test { def, .. } => Some(&def.key),
        }
    }
}

fn test_present(
    def: &PropertyDefinition,
    op: FilterOperator,
    operand: &Operand,
    value: &Value,
    registry: &PropertyTypeRegistry,
) -> bool {
    let eq = |x: &Value| registry.compare(def, value, x) == Ordering::Equal;

    match (op, operand, value) {
        (FilterOperator::Equals, Operand::One(x), _) => eq(x),
        (FilterOperator::Contains, Operand::Needle(needle), _) => {
            text_of(value).is_some_and(|s| s.to_lowercase().contains(needle.as_str()))
        }
        (FilterOperator::Contains, Operand::One(Value::Select(id)), Value::MultiSelect(ids)) => ids.contains(id),
        (FilterOperator::In, Operand::Many(candidates), Value::MultiSelect(ids)) => candidates
            .iter()
            .any(|c| matches!(c, Value::Select(id) if ids.contains(id))),
        (FilterOperator::In, Operand::Many(candidates), _) => candidates.iter().any(eq),
        (FilterOperator::Range, Operand::Range(bounds), _) => {
            let cmp = |x: &Value| registry.compare(def, value, x);
            bounds.gt.as_ref().map_or(true, |x| cmp(x) == Ordering::Greater)
                && bounds.gte.as_ref().map_or(true, |x| cmp(x) != Ordering::Less)
                && bounds.lt.as_ref().map_or(true, |x| cmp(x) == Ordering::Less)
                && bounds.lte.as_ref().map_or(true, |x| cmp(x) != Ordering::Greater)
        }
        _ => false,
    }
}

fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::Text(s) | Value::Url(s) | Value::Email(s) | Value::User(s) => Some(s),
        _ => None,
    }
}

/// Element type of list-valued properties for `contains` / `in` operands
fn element_type(property_type: PropertyType) -> PropertyType {
    match property_type {
        PropertyType::MultiSelect => PropertyType::Select,
        other => other,
    }
}

fn compile_operand(
    def: &PropertyDefinition,
    op: FilterOperator,
    raw: Option<&Json>,
    registry: &PropertyTypeRegistry,
) -> Result<Operand, String> {
    let raw = raw.filter(|v| !v.is_null());
    if !op.takes_operand() {
        return match raw {
            None => Ok(Operand::None),
            Some(_) => Err(format!("{op} takes no value")),
        };
    }
    let raw = raw.ok_or_else(|| format!("{op} requires a value"))?;
    let decode = |ty: PropertyType, json: &Json| registry.deserialize(ty, json).map_err(|e| e.to_string());

    match op {
        FilterOperator::Equals | FilterOperator::NotEquals => decode(def.property_type, raw).map(Operand::One),
        FilterOperator::Contains if def.property_type == PropertyType::MultiSelect => {
            decode(PropertyType::Select, raw).map(Operand::One)
        }
        FilterOperator::Contains => raw
            .as_str()
            .map(|s| Operand::Needle(s.to_lowercase()))
            .ok_or_else(|| "contains requires a string".to_string()),
        FilterOperator::In => {
            let items = raw.as_array().ok_or_else(|| "in requires an array".to_string())?;
            let ty = element_type(def.property_type);
            items
                .iter()
                .map(|item| decode(ty, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Operand::Many)
        }
        FilterOperator::Range => {
            let obj = raw
                .as_object()
                .ok_or_else(|| "range requires an object of gt/gte/lt/lte".to_string())?;
            let mut bounds = Bounds::default();
            for (name, bound) in obj {
                let slot = match name.as_str() {
                    "gt" => &mut bounds.gt,
                    "gte" => &mut bounds.gte,
                    "lt" => &mut bounds.lt,
                    "lte" => &mut bounds.lte,
                    other => return Err(format!("unknown range bound '{other}'")),
                };
                if !bound.is_null() {
                    *slot = Some(decode(def.property_type, bound)?);
                }
            }
            if bounds == Bounds::default() {
                return Err("range needs at least one bound".to_string());
            }
            Ok(Operand::Range(bounds))
        }
        FilterOperator::IsEmpty | FilterOperator::IsNotEmpty => Ok(Operand::None),
    }
}
