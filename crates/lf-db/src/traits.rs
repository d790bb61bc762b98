//! Store and resolver trait definitions

use crate::error::DbResult;
use async_trait::async_trait;
use lf_core::{AssociationLink, SourceId, TargetId};

/// Query capability the backfiller needs from an association store.
///
/// A source record is *dangling* when no link row references it. The three
/// data operations are enough to drive the backfill against any store with
/// set membership and bulk insert-or-ignore; the unit-of-work operations
/// bracket them atomically.
///
/// Implementations must be Send + Sync for async operation.
#[async_trait]
pub trait AssociationStore: Send + Sync {
    /// Exact number of distinct source records with zero links
    async fn count_dangling(&self) -> DbResult<usize>;

    /// Up to `limit` distinct dangling source ids, in no particular order
    async fn fetch_dangling_batch(&self, limit: usize) -> DbResult<Vec<SourceId>>;

    /// Insert links, skipping pairs that already exist.
    ///
    /// Returns the number of rows actually written. A duplicate pair is
    /// never an error and never produces a second row.
    async fn insert_links_ignoring_duplicates(&self, links: &[AssociationLink])
        -> DbResult<usize>;

    /// Open a unit of work
    async fn begin(&self) -> DbResult<()>;

    /// Make the open unit of work durable
    async fn commit(&self) -> DbResult<()>;

    /// Discard the open unit of work
    async fn rollback(&self) -> DbResult<()>;

    /// Store type identifier for logging
    fn store_type(&self) -> &'static str;
}

/// Supplies the single fallback target dangling records are linked to.
#[async_trait]
pub trait DefaultTargetResolver: Send + Sync {
    /// The configured default target, or `None` when the owning system has
    /// not established one yet.
    async fn resolve_default_target(&self) -> DbResult<Option<TargetId>>;
}
