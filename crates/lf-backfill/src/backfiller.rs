//! The batch association backfill loop.
//!
//! ```text
//!   resolve default ──(missing)──> ConfigurationMissing
//!        │
//!        v
//!   ┌─> Scanning ──(batch empty)──────────┐
//!   │      │                              │
//!   │      v                              v
//!   │   Inserting ──────────────────> recount ──(0)──> Done
//!   │                                     │
//!   └─────────────────(> 0)───────────────┘
//! ```
//!
//! The dangling count is re-derived from the store on every cycle and is
//! never tracked as a running counter: writers that add unlinked records
//! mid-run are picked up by the next scan instead of being missed.

use crate::error::{BackfillError, BackfillPhase, BackfillResult};
use crate::report::{BackfillReport, BackfillState, CycleReport};
use chrono::Utc;
use lf_core::{AssociationLink, BackfillConfig, TargetId, UnitOfWork, DEFAULT_BATCH_SIZE};
use lf_db::{AssociationStore, DefaultTargetResolver};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use std::time::Instant;

/// Loop tuning for a [`Backfiller`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillOptions {
    /// Maximum ids fetched and linked per cycle; must be at least 1
    pub batch_size: usize,
    /// Transaction granularity
    pub unit_of_work: UnitOfWork,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            unit_of_work: UnitOfWork::Single,
        }
    }
}

impl From<&BackfillConfig> for BackfillOptions {
    fn from(config: &BackfillConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            unit_of_work: config.unit_of_work,
        }
    }
}

impl BackfillOptions {
    fn validate(&self) -> BackfillResult<()> {
        if self.batch_size == 0 {
            return Err(BackfillError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Running totals across cycles
#[derive(Debug, Default)]
struct Totals {
    iterations: usize,
    fetched: usize,
    inserted: usize,
}

/// Links every dangling source record to the default target.
pub struct Backfiller {
    store: Arc<dyn AssociationStore>,
    resolver: Arc<dyn DefaultTargetResolver>,
    options: BackfillOptions,
}

impl Backfiller {
    pub fn new(
        store: Arc<dyn AssociationStore>,
        resolver: Arc<dyn DefaultTargetResolver>,
        options: BackfillOptions,
    ) -> Self {
        Self {
            store,
            resolver,
            options,
        }
    }

    /// Current number of dangling source records, without linking anything
    pub async fn pending(&self) -> BackfillResult<usize> {
        self.store
            .count_dangling()
            .await
            .map_err(BackfillError::failed(BackfillPhase::Count))
    }

    /// Run the backfill to completion.
    pub async fn run(&self) -> BackfillResult<BackfillReport> {
        self.run_with_progress(|_| {}).await
    }

    /// Run the backfill to completion, calling `on_cycle` after every
    /// scan / insert / recount cycle.
    ///
    /// Either every source record ends up linked and a report is returned,
    /// or an error is returned and the open unit of work is rolled back.
    pub async fn run_with_progress<F>(&self, mut on_cycle: F) -> BackfillResult<BackfillReport>
    where
        F: FnMut(&CycleReport) + Send,
    {
        self.options.validate()?;
        let started_at = Utc::now();
        let timer = Instant::now();

        let target = self.resolve_target().await?;
        info!(
            "Backfilling {} store: default target {}, batch size {}, unit of work {}",
            self.store.store_type(),
            target,
            self.options.batch_size,
            self.options.unit_of_work
        );

        let mut totals = Totals::default();
        match self.options.unit_of_work {
            UnitOfWork::Single => {
                self.begin().await?;
                let outcome = self.converge(&target, &mut totals, &mut on_cycle).await;
                self.finish(outcome).await?;
            }
            UnitOfWork::PerBatch => loop {
                self.begin().await?;
                let outcome = self.cycle(&target, &mut totals).await;
                let cycle = self.finish(outcome).await?;
                on_cycle(&cycle);
                if cycle.state == BackfillState::Done {
                    break;
                }
            },
        }

        let report = BackfillReport {
            default_target: target,
            unit_of_work: self.options.unit_of_work,
            batch_size: self.options.batch_size,
            iterations: totals.iterations,
            fetched: totals.fetched,
            inserted: totals.inserted,
            started_at,
            elapsed_ms: u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX),
            state: BackfillState::Done,
        };
        info!(
            "Backfill complete: {} links inserted in {} iterations ({} ms)",
            report.inserted, report.iterations, report.elapsed_ms
        );
        Ok(report)
    }

    async fn resolve_target(&self) -> BackfillResult<TargetId> {
        let target = self
            .resolver
            .resolve_default_target()
            .await
            .map_err(BackfillError::failed(BackfillPhase::Resolve))?;
        match target {
            Some(target) => Ok(target),
            None => {
                error!("The default target does not exist yet; nothing was scanned or linked");
                Err(BackfillError::ConfigurationMissing)
            }
        }
    }

    /// Cycle until the recount reaches zero, inside one unit of work
    async fn converge<F>(
        &self,
        target: &TargetId,
        totals: &mut Totals,
        on_cycle: &mut F,
    ) -> BackfillResult<()>
    where
        F: FnMut(&CycleReport) + Send,
    {
        loop {
            let cycle = self.cycle(target, totals).await?;
            on_cycle(&cycle);
            if cycle.state == BackfillState::Done {
                return Ok(());
            }
        }
    }

    /// One scan / insert / recount cycle
    async fn cycle(&self, target: &TargetId, totals: &mut Totals) -> BackfillResult<CycleReport> {
        totals.iterations += 1;
        let iteration = totals.iterations;
        let mut state = BackfillState::Scanning;
        trace!("iteration {iteration}: {state}");

        let mut batch = self
            .store
            .fetch_dangling_batch(self.options.batch_size)
            .await
            .map_err(BackfillError::failed(BackfillPhase::Fetch))?;
        if batch.len() > self.options.batch_size {
            warn!(
                "Store returned {} ids for a batch of {}; truncating",
                batch.len(),
                self.options.batch_size
            );
            batch.truncate(self.options.batch_size);
        }
        let fetched = batch.len();
        totals.fetched += fetched;

        let mut inserted = 0;
        if !batch.is_empty() {
            state = BackfillState::Inserting;
            trace!("iteration {iteration}: {state} {fetched} links");
            let links = AssociationLink::fan_in(batch, target);
            inserted = self
                .store
                .insert_links_ignoring_duplicates(&links)
                .await
                .map_err(BackfillError::failed(BackfillPhase::Insert))?;
            totals.inserted += inserted;
        }

        let remaining = self
            .store
            .count_dangling()
            .await
            .map_err(BackfillError::failed(BackfillPhase::Count))?;
        debug!(
            "iteration {iteration}: fetched {fetched}, inserted {inserted}, {remaining} dangling remain"
        );

        if remaining == 0 {
            state = BackfillState::Done;
        } else if inserted == 0 {
            warn!("iteration {iteration}: no progress with {remaining} dangling rows remaining");
            return Err(BackfillError::Stalled {
                iteration,
                remaining,
            });
        } else {
            state = BackfillState::Scanning;
        }

        Ok(CycleReport {
            iteration,
            fetched,
            inserted,
            remaining,
            state,
        })
    }

    async fn begin(&self) -> BackfillResult<()> {
        self.store
            .begin()
            .await
            .map_err(BackfillError::failed(BackfillPhase::Begin))
    }

    /// Commit on success, roll back on failure.
    ///
    /// A failed commit is also rolled back. Rollback errors are logged and
    /// the original error is returned.
    async fn finish<T>(&self, outcome: BackfillResult<T>) -> BackfillResult<T> {
        match outcome {
            Ok(value) => match self.store.commit().await {
                Ok(()) => Ok(value),
                Err(source) => {
                    self.rollback_quietly().await;
                    Err(BackfillError::BackfillFailed {
                        phase: BackfillPhase::Commit,
                        source,
                    })
                }
            },
            Err(err) => {
                warn!("Rolling back unit of work: {err}");
                self.rollback_quietly().await;
                Err(err)
            }
        }
    }

    async fn rollback_quietly(&self) {
        if let Err(e) = self.store.rollback().await {
            error!("Rollback failed: {e}");
        }
    }
}

#[cfg(test)]
#[path = "backfiller_test.rs"]
mod tests;
