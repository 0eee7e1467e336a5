//! Flextable Model
//!
//! Typed building blocks shared by every layer of the table engine.
//!
//! # Core Concepts
//!
//! - [`PropertyKey`]: Immutable, snake_case column key
//! - [`PropertyType`]: Closed set of column types
//! - [`PropertyDefinition`]: One typed column within a table
//! - [`Value`]: Normalized, typed cell value
//! - [`PropertyTypeRegistry`]: Validation, coercion, ordering and (de)serialization per type
//! - [`Clock`]: Time source, swappable in tests
//!
//! # Example
//!
//! ```rust
//! use flex_model::{PropertyDefinition, PropertyKey, PropertyType, PropertyTypeRegistry, Value};
//! use std::str::FromStr;
//!
//! let registry = PropertyTypeRegistry::new();
//! let def = PropertyDefinition::new(PropertyKey::from_str("amount").unwrap(), PropertyType::Number);
//!
//! let value = registry.validate(&def, &serde_json::json!("42")).unwrap();
//! assert_eq!(value, Value::Number(42.0));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod clock;
mod context;
mod error;
mod ids;
mod key;
mod operator;
mod order;
mod property;
mod registry;
mod value;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::RequestContext;
pub use error::{FieldError, StorageError, ValidationError, ValidationErrors};
pub use ids::{RecordId, TableId, UserId, WorkspaceId};
pub use key::{KeyPolicy, PropertyKey};
pub use operator::FilterOperator;
pub use order::{SortDirection, SortSpec};
pub use property::{PropertyConfig, PropertyDefinition, PropertySpec, PropertyType, SelectOption};
pub use registry::PropertyTypeRegistry;
pub use value::{FileRef, Value};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
