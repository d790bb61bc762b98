//! Error types for lf-backfill

use lf_db::DbError;
use std::fmt;
use thiserror::Error;

/// Store operation a backfill failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillPhase {
    Resolve,
    Begin,
    Fetch,
    Insert,
    Count,
    Commit,
}

impl fmt::Display for BackfillPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackfillPhase::Resolve => "default target resolution",
            BackfillPhase::Begin => "begin",
            BackfillPhase::Fetch => "dangling scan",
            BackfillPhase::Insert => "link insert",
            BackfillPhase::Count => "dangling recount",
            BackfillPhase::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Backfill run errors
#[derive(Error, Debug)]
pub enum BackfillError {
    /// No default target exists yet (B001)
    #[error("[B001] No default target configured. Run the owning system once to establish one before retrying")]
    ConfigurationMissing,

    /// A store operation failed; the open unit of work was rolled back (B002)
    #[error("[B002] Backfill failed during {phase}: {source}")]
    BackfillFailed {
        phase: BackfillPhase,
        #[source]
        source: DbError,
    },

    /// Dangling rows remain but the last cycle could not link any (B003)
    #[error("[B003] Backfill stalled on iteration {iteration}: {remaining} dangling rows remain but the store returned none that could be linked")]
    Stalled { iteration: usize, remaining: usize },

    /// Options rejected before touching the store (B004)
    #[error("[B004] Invalid backfill options: {0}")]
    InvalidConfig(String),
}

impl BackfillError {
    /// Whether the store could not be reached at all, rather than a query
    /// failing against a reachable store.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, BackfillError::BackfillFailed { source, .. } if source.is_unavailable())
    }

    pub(crate) fn failed(phase: BackfillPhase) -> impl FnOnce(DbError) -> Self {
        move |source| BackfillError::BackfillFailed { phase, source }
    }
}

/// Result type alias for BackfillError
pub type BackfillResult<T> = Result<T, BackfillError>;
