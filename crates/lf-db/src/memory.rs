//! In-memory association store for tests.
//!
//! Models the store as two sets and supports transactions by snapshotting.
//! Fault injection covers the situations the backfiller must survive:
//! failing calls, source records appearing from a concurrent writer, scans
//! that leak already-linked ids, and counts that disagree with scans.

use crate::error::{DbError, DbResult};
use crate::traits::{AssociationStore, DefaultTargetResolver};
use async_trait::async_trait;
use lf_core::{AssociationLink, SourceId, TargetId};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

/// Store operation that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Count,
    Fetch,
    Insert,
    Begin,
    Commit,
}

/// How many times each operation was called
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub resolves: usize,
    pub counts: usize,
    pub fetches: usize,
    pub inserts: usize,
    pub links_written: usize,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    sources: BTreeSet<SourceId>,
    links: BTreeSet<AssociationLink>,
    snapshot: Option<(BTreeSet<SourceId>, BTreeSet<AssociationLink>)>,
    default_target: Option<TargetId>,
    calls: CallCounts,
    failure: Option<(FailPoint, usize)>,
    arrivals: Vec<(usize, SourceId)>,
    leaked: Vec<SourceId>,
    phantom_dangling: usize,
}

impl MemoryState {
    fn is_dangling(&self, id: &SourceId) -> bool {
        !self.links.iter().any(|l| &l.source_id == id)
    }

    fn check_failure(&self, point: FailPoint, call: usize) -> DbResult<()> {
        match self.failure {
            Some((p, n)) if p == point && n == call => Err(DbError::ExecutionError(format!(
                "injected {point:?} failure on call {call}"
            ))),
            _ => Ok(()),
        }
    }
}

/// [`AssociationStore`] and [`DefaultTargetResolver`] held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with `count` sources named `src_000`, `src_001`, ...
    pub fn with_sources(count: usize) -> Self {
        let store = Self::new();
        for i in 0..count {
            store.add_source(SourceId::new(format!("src_{i:03}")));
        }
        store
    }

    pub fn default_target(self, target: &str) -> Self {
        self.with_state(|s| s.default_target = Some(TargetId::new(target)));
        self
    }

    /// Fail the `call`-th (1-based) invocation of `point`
    pub fn fail_on(self, point: FailPoint, call: usize) -> Self {
        self.with_state(|s| s.failure = Some((point, call)));
        self
    }

    /// Add `id` as a new dangling source right after the `after_insert`-th
    /// insert call, as a concurrent writer would.
    pub fn arrival_after_insert(self, after_insert: usize, id: &str) -> Self {
        self.with_state(|s| s.arrivals.push((after_insert, SourceId::new(id))));
        self
    }

    /// Return `id` from every scan even once it is linked
    pub fn leak_into_scan(self, id: &str) -> Self {
        self.with_state(|s| s.leaked.push(SourceId::new(id)));
        self
    }

    /// Report `n` more dangling rows than the scan can ever find
    pub fn phantom_dangling(self, n: usize) -> Self {
        self.with_state(|s| s.phantom_dangling = n);
        self
    }

    pub fn add_source(&self, id: SourceId) {
        self.with_state(|s| {
            s.sources.insert(id);
        });
    }

    pub fn add_link(&self, source: &str, target: &str) {
        self.with_state(|s| {
            s.links
                .insert(AssociationLink::new(SourceId::new(source), TargetId::new(target)));
        });
    }

    pub fn links(&self) -> BTreeSet<AssociationLink> {
        self.lock_state().links.clone()
    }

    /// Number of link rows referencing `source`
    pub fn link_count(&self, source: &str) -> usize {
        self.lock_state()
            .links
            .iter()
            .filter(|l| l.source_id == source)
            .count()
    }

    pub fn dangling(&self) -> Vec<SourceId> {
        let state = self.lock_state();
        state
            .sources
            .iter()
            .filter(|id| state.is_dangling(id))
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> CallCounts {
        self.lock_state().calls.clone()
    }

    pub fn in_transaction(&self) -> bool {
        self.lock_state().snapshot.is_some()
    }

    fn lock_state(&self) -> MutexGuard<'_, MemoryState> {
        // Test-only store: a poisoned lock means a test already panicked.
        self.state.lock().unwrap()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        f(&mut self.lock_state())
    }
}

#[async_trait]
impl AssociationStore for MemoryStore {
    async fn count_dangling(&self) -> DbResult<usize> {
        self.with_state(|s| {
            s.calls.counts += 1;
            s.check_failure(FailPoint::Count, s.calls.counts)?;
            let real = s.sources.iter().filter(|id| s.is_dangling(id)).count();
            Ok(real + s.phantom_dangling)
        })
    }

    async fn fetch_dangling_batch(&self, limit: usize) -> DbResult<Vec<SourceId>> {
        self.with_state(|s| {
            s.calls.fetches += 1;
            s.check_failure(FailPoint::Fetch, s.calls.fetches)?;
            let mut batch: Vec<SourceId> = s.leaked.clone();
            batch.extend(
                s.sources
                    .iter()
                    .filter(|id| s.is_dangling(id) && !s.leaked.contains(id))
                    .cloned(),
            );
            batch.truncate(limit);
            Ok(batch)
        })
    }

    async fn insert_links_ignoring_duplicates(
        &self,
        links: &[AssociationLink],
    ) -> DbResult<usize> {
        self.with_state(|s| {
            s.calls.inserts += 1;
            let call = s.calls.inserts;
            s.check_failure(FailPoint::Insert, call)?;
            let written = links
                .iter()
                .filter(|link| s.links.insert((*link).clone()))
                .count();
            s.calls.links_written += written;

            let (due, pending): (Vec<_>, Vec<_>) =
                s.arrivals.drain(..).partition(|(after, _)| *after == call);
            s.arrivals = pending;
            for (_, id) in due {
                s.sources.insert(id);
            }
            Ok(written)
        })
    }

    async fn begin(&self) -> DbResult<()> {
        self.with_state(|s| {
            s.calls.begins += 1;
            s.check_failure(FailPoint::Begin, s.calls.begins)?;
            if s.snapshot.is_some() {
                return Err(DbError::TransactionError(
                    "transaction already open".to_string(),
                ));
            }
            s.snapshot = Some((s.sources.clone(), s.links.clone()));
            Ok(())
        })
    }

    async fn commit(&self) -> DbResult<()> {
        self.with_state(|s| {
            s.calls.commits += 1;
            s.check_failure(FailPoint::Commit, s.calls.commits)?;
            match s.snapshot.take() {
                Some(_) => Ok(()),
                None => Err(DbError::TransactionError("no open transaction".to_string())),
            }
        })
    }

    async fn rollback(&self) -> DbResult<()> {
        self.with_state(|s| {
            s.calls.rollbacks += 1;
            match s.snapshot.take() {
                Some((sources, links)) => {
                    s.sources = sources;
                    s.links = links;
                    Ok(())
                }
                None => Err(DbError::TransactionError("no open transaction".to_string())),
            }
        })
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl DefaultTargetResolver for MemoryStore {
    async fn resolve_default_target(&self) -> DbResult<Option<TargetId>> {
        self.with_state(|s| {
            s.calls.resolves += 1;
            Ok(s.default_target.clone())
        })
    }
}
