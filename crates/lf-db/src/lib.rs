//! lf-db - Association store layer for Linkfill
//!
//! This crate provides the `AssociationStore` and `DefaultTargetResolver`
//! traits the backfiller is written against, a DuckDB implementation of
//! both, and a static resolver for targets pinned in configuration.

pub mod duckdb;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod resolver;
pub mod traits;

pub use crate::duckdb::{DuckDbAssociationStore, DuckDbBackend};
pub use error::{DbError, DbResult};
pub use resolver::{resolver_from_config, StaticTargetResolver, TableTargetResolver};
pub use traits::{AssociationStore, DefaultTargetResolver};
