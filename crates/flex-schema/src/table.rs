//! Table definitions
//!
//! A [`Table`] is an immutable snapshot of one schema version. Mutations go
//! through [`Table::apply`], which returns the next snapshot rather than
//! editing in place; the manager then swaps it in against the expected
//! version.

use crate::error::{SchemaConflict, SchemaError};
use crate::ops::SchemaOp;
use chrono::{DateTime, Utc};
use flex_model::{
    KeyPolicy, PropertyDefinition, PropertyKey, PropertySpec, PropertyTypeRegistry, TableId, UserId,
    ValidationError, ValidationErrors, WorkspaceId,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Maximum table name length in characters
pub const MAX_NAME_LEN: usize = 200;

/// Tenant-defined schema container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: TableId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Live properties in display order
    #[serde(with = "property_list")]
    pub properties: IndexMap<PropertyKey, PropertyDefinition>,
    pub schema_version: u64,
    /// Keys removed from the live schema; never reusable
    #[serde(default)]
    pub retired_keys: BTreeSet<PropertyKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: UserId,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

/// Everything needed to validate and stamp a schema change
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext<'a> {
    pub registry: &'a PropertyTypeRegistry,
    pub policy: KeyPolicy,
    pub now: DateTime<Utc>,
}

impl Table {
    /// Live property by key
    #[inline]
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&PropertyDefinition> {
        self.properties.get(key)
    }

    /// Whether `key` is part of the live schema
    #[inline]
    #[must_use]
    pub fn is_live(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    #[inline]
    #[must_use]
    pub fn is_retired(&self, key: &str) -> bool {
        self.retired_keys.contains(key)
    }

    #[inline]
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Live keys in display order
    pub fn keys(&self) -> impl Iterator<Item = &PropertyKey> {
        self.properties.keys()
    }

    /// Required live properties
    pub fn required_properties(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties.values().filter(|p| p.required)
    }

    /// Build version 1 of a new table
    ///
    /// All invalid keys, configs and names are collected; duplicate keys are
    /// a conflict.
    pub fn create(
        workspace_id: WorkspaceId,
        created_by: UserId,
        name: &str,
        description: Option<String>,
        specs: Vec<PropertySpec>,
        cx: ApplyContext<'_>,
    ) -> Result<Self, SchemaError> {
        let mut errors = ValidationErrors::new();
        let name = name.trim();
        if name.is_empty() {
            errors.push("name", ValidationError::invalid_config("name must not be empty"));
        } else if name.chars().count() > MAX_NAME_LEN {
            errors.push(
                "name",
                ValidationError::invalid_config(format!("name longer than {MAX_NAME_LEN} characters")),
            );
        }

        let mut properties = IndexMap::with_capacity(specs.len());
        for spec in specs {
            let field = field_name(&spec.key);
            let Some(def) = checked_definition(spec, cx, &field, &mut errors) else {
                continue;
            };
            if properties.contains_key(&def.key) {
                return Err(SchemaConflict::DuplicateKey { key: def.key }.into());
            }
            properties.insert(def.key.clone(), def);
        }

        errors.into_result(())?;

        Ok(Self {
            id: TableId::new(),
            workspace_id,
            name: name.to_string(),
            description: description.filter(|d| !d.trim().is_empty()),
            properties,
            schema_version: 1,
            retired_keys: BTreeSet::new(),
            created_at: cx.now,
            updated_at: cx.now,
            created_by,
            archived_at: None,
        })
    }

    /// Apply a batch of ops, producing the next schema version
    ///
    /// # Errors
    /// - `SchemaConflict` on duplicate/retired keys, key changes or an archived table
    /// - `Validation` with every invalid op collected
    pub fn apply(&self, ops: &[SchemaOp], cx: ApplyContext<'_>) -> Result<Self, SchemaError> {
        if self.is_archived() {
            return Err(SchemaConflict::Archived { table_id: self.id }.into());
        }

        let mut next = self.clone();
        let mut errors = ValidationErrors::new();

        for op in ops {
            next.apply_one(op, cx, &mut errors)?;
        }

        errors.into_result(())?;
        next.schema_version = self.schema_version + 1;
        next.updated_at = cx.now;
        Ok(next)
    }

    /// Archived snapshot at the next version
    pub fn archived(&self, now: DateTime<Utc>) -> Result<Self, SchemaError> {
        if self.is_archived() {
            return Err(SchemaConflict::Archived { table_id: self.id }.into());
        }
        let mut next = self.clone();
        next.archived_at = Some(now);
        next.schema_version += 1;
        next.updated_at = now;
        Ok(next)
    }

    fn apply_one(
        &mut self,
        op: &SchemaOp,
        cx: ApplyContext<'_>,
        errors: &mut ValidationErrors,
    ) -> Result<(), SchemaError> {
        match op {
            SchemaOp::AddProperty { property } => {
                let field = field_name(&property.key);
                let Some(def) = checked_definition(property.clone(), cx, &field, errors) else {
                    return Ok(());
                };
                if self.is_live(def.key.as_str()) {
                    return Err(SchemaConflict::DuplicateKey { key: def.key }.into());
                }
                if self.is_retired(def.key.as_str()) {
                    return Err(SchemaConflict::RetiredKey { key: def.key }.into());
                }
                self.properties.insert(def.key.clone(), def);
            }
            SchemaOp::RemoveProperty { key } => {
                if let Some(key) = self.live_key(key, cx.policy, errors) {
                    self.properties.shift_remove(&key);
                    self.retired_keys.insert(key);
                }
            }
            SchemaOp::RenameProperty { key, display_name } => {
                if let Some(key) = self.live_key(key, cx.policy, errors) {
                    let display_name = display_name.trim();
                    if display_name.is_empty() {
                        errors.push(
                            field_name(key.as_str()),
                            ValidationError::invalid_config("display name must not be empty"),
                        );
                    } else if let Some(def) = self.properties.get_mut(&key) {
                        def.display_name = display_name.to_string();
                    }
                }
            }
            SchemaOp::ReorderProperties { keys } => self.reorder(keys, cx.policy, errors),
            SchemaOp::UpdatePropertyConfig { key, config, required } => {
                if let Some(key) = self.live_key(key, cx.policy, errors) {
                    if let Some(def) = self.properties.get_mut(&key) {
                        match cx.registry.config_is_valid(def.property_type, config) {
                            Ok(()) => {
                                def.config = config.clone();
                                if let Some(required) = required {
                                    def.required = *required;
                                }
                            }
                            Err(e) => errors.push(field_name(key.as_str()), e),
                        }
                    }
                }
            }
            SchemaOp::ChangeKey { key, .. } => {
                return Err(SchemaConflict::KeyImmutable { key: key.clone() }.into());
            }
        }
        Ok(())
    }

    fn live_key(&self, raw: &str, policy: KeyPolicy, errors: &mut ValidationErrors) -> Option<PropertyKey> {
        match policy.normalize(raw) {
            Ok(key) if self.is_live(key.as_str()) => Some(key),
            Ok(_) => {
                errors.push(field_name(raw), ValidationError::UnknownProperty);
                None
            }
            Err(e) => {
                errors.push(field_name(raw), e);
                None
            }
        }
    }

    fn reorder(&mut self, raw_keys: &[String], policy: KeyPolicy, errors: &mut ValidationErrors) {
        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(raw_keys.len());
        for raw in raw_keys {
            let Some(key) = self.live_key(raw, policy, errors) else {
                continue;
            };
            if !seen.insert(key.clone()) {
                errors.push(field_name(raw), ValidationError::invalid_config("listed more than once"));
                continue;
            }
            order.push(key);
        }

        if order.len() != self.properties.len() {
            for missing in self.properties.keys().filter(|k| !seen.contains(*k)) {
                errors.push(
                    field_name(missing.as_str()),
                    ValidationError::invalid_config("missing from reorder list"),
                );
            }
            return;
        }

        let mut reordered = IndexMap::with_capacity(order.len());
        for key in order {
            if let Some(def) = self.properties.shift_remove(&key) {
                reordered.insert(key, def);
            }
        }
        self.properties = reordered;
    }
}

fn field_name(key: &str) -> String {
    format!("properties.{key}")
}

/// Normalize the key and check config; problems land in `errors`
fn checked_definition(
    spec: PropertySpec,
    cx: ApplyContext<'_>,
    field: &str,
    errors: &mut ValidationErrors,
) -> Option<PropertyDefinition> {
    let def = match spec.into_definition(cx.policy) {
        Ok(def) => def,
        Err(e) => {
            errors.push(field, e);
            return None;
        }
    };
    if let Err(e) = cx.registry.config_is_valid(def.property_type, &def.config) {
        errors.push(field, e);
        return None;
    }
    Some(def)
}

mod property_list {
    //! Properties travel as an ordered list, keyed internally by `key`

    use flex_model::{PropertyDefinition, PropertyKey};
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        properties: &IndexMap<PropertyKey, PropertyDefinition>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(properties.values())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<IndexMap<PropertyKey, PropertyDefinition>, D::Error> {
        let list = Vec::<PropertyDefinition>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|p| (p.key.clone(), p)).collect())
    }
}
