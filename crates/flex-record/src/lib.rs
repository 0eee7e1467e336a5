//! Flextable Records
//!
//! Rows of dynamic-schema tables.
//!
//! # Overview
//!
//! - **Record**: Stored row, untyped JSON keyed by property key
//! - **ResolvedRecord**: Row typed through the table's current schema
//! - **RecordStore**: Create, read, update, soft-delete, restore, purge
//! - **RecordRepository**: Storage seam with conditional writes
//!
//! Writes are validated against the schema as it is *now*. Data under keys
//! removed from the schema stays stored but is never read or written again.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod record;
mod repository;
mod store;

pub use error::RecordError;
pub use record::{next_stamp, Record, RecordData, RecordState, ResolvedRecord};
pub use repository::{MemoryRecordRepository, RecordRepository, WriteOutcome};
pub use store::{PurgeReport, RecordPayload, RecordStore, DEFAULT_PURGE_BATCH_SIZE, DEFAULT_RETENTION_DAYS};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
