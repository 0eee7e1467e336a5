//! Flextable Query
//!
//! Filtering, type-aware sorting and stable cursor pagination over records
//! whose schema is only known at runtime.
//!
//! # Overview
//!
//! - **Filter** / **Predicate**: `(key, op, value)` clauses compiled against the live schema
//! - **QueryEngine**: Evaluates a [`Query`] into a [`Page`]
//! - **cursor**: Opaque positions bound to the sort they were issued under
//!
//! Filters naming keys outside the live schema match nothing; sorts on such
//! keys are ignored.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cursor;
mod engine;
mod error;
mod filter;

pub use engine::{Page, Query, QueryEngine, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use error::QueryError;
pub use filter::{Bounds, Filter, Operand, Predicate};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
