//! Flextable Views
//!
//! Per-user presentation state of a table, kept apart from schema and data.
//!
//! # Overview
//!
//! - **ViewState**: Pinned columns and rows, hidden columns, sort
//! - **ViewCommand**: Message that mutates a view state
//! - **ViewStateManager**: Lazy per-`(user, table)` state over a repository
//!
//! View state never changes a table or its records, and is never validated
//! against the schema: stale keys are ignored when the layout is computed.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod manager;
mod repository;
mod state;

pub use error::ViewError;
pub use manager::ViewStateManager;
pub use repository::{MemoryViewStateRepository, ViewStateRepository};
pub use state::{ColumnSide, PinnedColumns, PinnedRows, RowSide, ViewCommand, ViewState};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
