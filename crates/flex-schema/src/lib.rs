//! Flextable Schema
//!
//! Versioned, tenant-defined table schemas.
//!
//! # Overview
//!
//! - **Table**: Immutable schema snapshot with ordered properties
//! - **SchemaOp**: One step of a schema update (add, remove, rename, reorder, reconfigure)
//! - **SchemaManager**: Create, read, evolve and archive tables with optimistic versioning
//! - **TableRepository**: Storage seam, compare-and-swap on `schema_version`
//!
//! Removing a property never touches stored records: its key is retired and
//! the record data under it becomes orphaned, invisible to reads and queries.
//!
//! # Example
//!
//! ```rust
//! use flex_model::{PropertySpec, PropertyType, RequestContext, SystemClock};
//! use flex_schema::{MemoryTableRepository, NewTable, SchemaManager, SchemaOp};
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let manager = SchemaManager::new(Arc::new(MemoryTableRepository::new()), Arc::new(SystemClock));
//! let ctx = RequestContext::new("ws", "alice");
//!
//! let table = manager
//!     .create_table(&ctx, NewTable::new("Expenses").with_property(PropertySpec::new("amount", PropertyType::Number)))
//!     .await
//!     .unwrap();
//!
//! let ops = [SchemaOp::RenameProperty { key: "amount".into(), display_name: "Amount".into() }];
//! let table = manager.update_schema(&ctx, table.id, 1, &ops).await.unwrap();
//! assert_eq!(table.schema_version, 2);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod manager;
mod ops;
mod repository;
mod table;

pub use error::{SchemaConflict, SchemaError};
pub use manager::{NewTable, SchemaManager};
pub use ops::SchemaOp;
pub use repository::{MemoryTableRepository, SwapOutcome, TableRepository};
pub use table::{ApplyContext, Table, MAX_NAME_LEN};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
