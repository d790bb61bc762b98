//! Run and cycle reports

use chrono::{DateTime, Utc};
use lf_core::{TargetId, UnitOfWork};
use serde::Serialize;
use std::fmt;

/// Backfiller state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackfillState {
    /// Fetching the next batch of dangling ids
    Scanning,
    /// Writing links for the fetched batch
    Inserting,
    /// The recount found no dangling rows
    Done,
}

impl fmt::Display for BackfillState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackfillState::Scanning => write!(f, "scanning"),
            BackfillState::Inserting => write!(f, "inserting"),
            BackfillState::Done => write!(f, "done"),
        }
    }
}

/// Outcome of one scan / insert / recount cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// 1-based cycle number
    pub iteration: usize,
    /// Ids returned by the scan
    pub fetched: usize,
    /// Link rows actually written
    pub inserted: usize,
    /// Dangling rows left after the recount
    pub remaining: usize,
    /// State the machine moved to after the recount
    pub state: BackfillState,
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub default_target: TargetId,
    pub unit_of_work: UnitOfWork,
    pub batch_size: usize,
    pub iterations: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub state: BackfillState,
}
