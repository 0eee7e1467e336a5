//! Property types and definitions
//!
//! A [`PropertyDefinition`] is one typed column of a table. Its
//! [`PropertyConfig`] carries the type-specific settings; which fields are
//! allowed for which type is checked by
//! [`PropertyTypeRegistry::config_is_valid`](crate::PropertyTypeRegistry::config_is_valid).

use crate::error::ValidationError;
use crate::key::{KeyPolicy, PropertyKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Text,
    LongText,
    Number,
    Date,
    Datetime,
    Checkbox,
    Select,
    MultiSelect,
    User,
    Url,
    Email,
    File,
}

impl PropertyType {
    /// Every supported type
    pub const ALL: [PropertyType; 12] = [
        PropertyType::Text,
        PropertyType::LongText,
        PropertyType::Number,
        PropertyType::Date,
        PropertyType::Datetime,
        PropertyType::Checkbox,
        PropertyType::Select,
        PropertyType::MultiSelect,
        PropertyType::User,
        PropertyType::Url,
        PropertyType::Email,
        PropertyType::File,
    ];

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Text => "text",
            PropertyType::LongText => "long_text",
            PropertyType::Number => "number",
            PropertyType::Date => "date",
            PropertyType::Datetime => "datetime",
            PropertyType::Checkbox => "checkbox",
            PropertyType::Select => "select",
            PropertyType::MultiSelect => "multi_select",
            PropertyType::User => "user",
            PropertyType::Url => "url",
            PropertyType::Email => "email",
            PropertyType::File => "file",
        }
    }

    /// Whether values of this type hold a list
    #[inline]
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, PropertyType::MultiSelect | PropertyType::File)
    }

    /// Whether this type declares options in its config
    #[inline]
    #[must_use]
    pub fn has_options(&self) -> bool {
        matches!(self, PropertyType::Select | PropertyType::MultiSelect)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One choice of a select / multi_select column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl SelectOption {
    #[inline]
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            color: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Type-specific property settings
///
/// Only the fields relevant to the property type may be set:
/// `min`/`max` for number, `options` for select and multi_select,
/// `date_format` for date and datetime.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PropertyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
}

impl PropertyConfig {
    /// Empty config
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Numeric bounds
    #[inline]
    #[must_use]
    pub fn number(min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            min,
            max,
            ..Self::default()
        }
    }

    /// Option list for select / multi_select
    #[inline]
    #[must_use]
    pub fn options(options: Vec<SelectOption>) -> Self {
        Self {
            options: Some(options),
            ..Self::default()
        }
    }

    /// Display format for date / datetime
    #[inline]
    #[must_use]
    pub fn date_format(format: impl Into<String>) -> Self {
        Self {
            date_format: Some(format.into()),
            ..Self::default()
        }
    }

    /// Declared position of an option id
    #[must_use]
    pub fn option_position(&self, id: &str) -> Option<usize> {
        self.options
            .as_ref()
            .and_then(|opts| opts.iter().position(|o| o.id == id))
    }
}

/// One typed column within a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub key: PropertyKey,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub display_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub config: PropertyConfig,
}

impl PropertyDefinition {
    /// Create optional property with empty config; display name defaults to the key
    #[must_use]
    pub fn new(key: PropertyKey, property_type: PropertyType) -> Self {
        Self {
            display_name: key.to_string(),
            key,
            property_type,
            required: false,
            config: PropertyConfig::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: PropertyConfig) -> Self {
        self.config = config;
        self
    }
}

/// Client-supplied property, before key normalization
///
/// Keys arrive as plain strings so that the configured [`KeyPolicy`] can be
/// applied before format validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySpec {
    pub key: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub config: PropertyConfig,
}

impl PropertySpec {
    pub fn new(key: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            key: key.into(),
            property_type,
            display_name: None,
            required: false,
            config: PropertyConfig::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: PropertyConfig) -> Self {
        self.config = config;
        self
    }

    /// Normalize the key; config validity is checked separately by the registry
    pub fn into_definition(self, policy: KeyPolicy) -> Result<PropertyDefinition, ValidationError> {
        let key = policy.normalize(&self.key)?;
        let display_name = self
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| key.to_string());
        Ok(PropertyDefinition {
            key,
            property_type: self.property_type,
            display_name,
            required: self.required,
            config: self.config,
        })
    }
}
