//! Flextable Core
//!
//! Service facade over the flexible table engine.
//!
//! # Overview
//!
//! - **FlexTables**: One entry point for schema, record, query and view state operations
//! - **FlexConfig**: Retention, purge cadence, page sizes, key policy; TOML loadable
//! - **FlexError**: Unified error taxonomy with retry predicates
//! - **PurgeWorker**: Background hard-delete of records past retention
//! - **telemetry**: `tracing-subscriber` initialisation for binaries
//!
//! # Example
//!
//! ```rust
//! use flex_core::{FlexConfig, FlexTables};
//! use flex_model::{PropertySpec, PropertyType, RequestContext};
//! use flex_schema::NewTable;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let engine = FlexTables::new(FlexConfig::new()).unwrap();
//! let ctx = RequestContext::new("ws-1", "alice");
//!
//! let table = engine
//!     .create_table(&ctx, NewTable::new("Expenses").with_property(PropertySpec::new("amount", PropertyType::Number)))
//!     .await
//!     .unwrap();
//!
//! let payload = serde_json::json!({"amount": 120}).as_object().cloned().unwrap();
//! let record = engine.create_record(&ctx, table.id, payload).await.unwrap();
//! assert!(record.get("amount").is_some());
//! # });
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod config;
mod error;
mod service;
pub mod telemetry;
mod worker;

pub use config::{ConfigError, FlexConfig};
pub use error::{FlexError, Missing};
pub use service::{FlexTables, Repositories};
pub use worker::PurgeWorker;

pub use flex_model as model;
pub use flex_query as query;
pub use flex_record as record;
pub use flex_schema as schema;
pub use flex_view as view;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
