//! lf-backfill - Batch association backfiller for Linkfill
//!
//! Links every dangling source record to a single default target in
//! bounded batches. Each cycle re-derives the dangling set from the store,
//! so a run converges even while other writers add unlinked records, and a
//! run that dies halfway is finished by simply running again.

pub mod backfiller;
pub mod error;
pub mod report;

pub use backfiller::{BackfillOptions, Backfiller};
pub use error::{BackfillError, BackfillPhase, BackfillResult};
pub use report::{BackfillReport, BackfillState, CycleReport};
