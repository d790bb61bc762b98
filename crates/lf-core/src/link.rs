//! Association link between a source record and a target record.

use crate::ids::{SourceId, TargetId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered `(source, target)` pair.
///
/// Links have set semantics: a store holds at most one row per pair, and
/// inserting a pair that already exists is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssociationLink {
    pub source_id: SourceId,
    pub target_id: TargetId,
}

impl AssociationLink {
    pub fn new(source_id: SourceId, target_id: TargetId) -> Self {
        Self {
            source_id,
            target_id,
        }
    }

    /// Build one link per source id, all pointing at `target`.
    pub fn fan_in(sources: impl IntoIterator<Item = SourceId>, target: &TargetId) -> Vec<Self> {
        sources
            .into_iter()
            .map(|source_id| Self::new(source_id, target.clone()))
            .collect()
    }
}

impl fmt::Display for AssociationLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_id, self.target_id)
    }
}
