//! Schema mutation operations

use flex_model::{PropertyConfig, PropertySpec};
use serde::{Deserialize, Serialize};

/// One step of a schema update
///
/// A batch of ops is applied atomically: either every op succeeds and the
/// table moves to the next schema version, or nothing changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SchemaOp {
    /// Append a new property
    AddProperty { property: PropertySpec },

    /// Drop a property from the live schema; stored record data is untouched
    RemoveProperty { key: String },

    /// Change the display name; the key stays the same
    RenameProperty { key: String, display_name: String },

    /// New property order; must list every live key exactly once
    ReorderProperties { keys: Vec<String> },

    /// Replace the type-specific config, optionally toggling `required`
    UpdatePropertyConfig {
        key: String,
        config: PropertyConfig,
        #[serde(default)]
        required: Option<bool>,
    },

    /// Always rejected: keys are immutable
    ChangeKey { key: String, new_key: String },
}

impl SchemaOp {
    /// Op name as sent on the wire
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SchemaOp::AddProperty { .. } => "addProperty",
            SchemaOp::RemoveProperty { .. } => "removeProperty",
            SchemaOp::RenameProperty { .. } => "renameProperty",
            SchemaOp::ReorderProperties { .. } => "reorderProperties",
            SchemaOp::UpdatePropertyConfig { .. } => "updatePropertyConfig",
            SchemaOp::ChangeKey { .. } => "changeKey",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flex_model::PropertyType;

    #[test]
    fn ops_use_camel_case_tags() {
        let op: SchemaOp = serde_json::from_value(serde_json::json!({
            "op": "renameProperty",
            "key": "amount",
            "displayName": "Amount (EUR)"
        }))
        .unwrap();
        assert_eq!(
            op,
            SchemaOp::RenameProperty {
                key: "amount".into(),
                display_name: "Amount (EUR)".into()
            }
        );
        assert_eq!(op.name(), "renameProperty");
    }

    #[test]
    fn add_property_carries_spec() {
        let op: SchemaOp = serde_json::from_value(serde_json::json!({
            "op": "addProperty",
            "property": {"key": "due", "type": "date", "required": true}
        }))
        .unwrap();
        match op {
            SchemaOp::AddProperty { property } => {
                assert_eq!(property.property_type, PropertyType::Date);
                assert!(property.required);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }
}
