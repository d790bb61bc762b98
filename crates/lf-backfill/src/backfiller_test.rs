use super::*;
use lf_db::memory::{CallCounts, FailPoint, MemoryStore};
use lf_db::DbError;

const TARGET: &str = "sc_default";

fn backfiller(store: &Arc<MemoryStore>, batch_size: usize, unit_of_work: UnitOfWork) -> Backfiller {
    Backfiller::new(
        store.clone(),
        store.clone(),
        BackfillOptions {
            batch_size,
            unit_of_work,
        },
    )
}

fn store(sources: usize) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_sources(sources).default_target(TARGET))
}

// ── Happy path ─────────────────────────────────────────────────────────

#[tokio::test]
async fn links_every_dangling_source_to_default_target() {
    let store = store(5);
    store.add_link("src_003", "sc_other");

    let report = backfiller(&store, 2, UnitOfWork::Single).run().await.unwrap();

    assert_eq!(report.state, BackfillState::Done);
    assert_eq!(report.inserted, 4);
    assert_eq!(report.default_target, TARGET);
    assert!(store.dangling().is_empty());
    // Already-linked sources are left alone.
    assert_eq!(store.link_count("src_003"), 1);
    assert_eq!(store.links().len(), 5);
}

#[tokio::test]
async fn converges_within_ceil_of_dangling_over_batch_size() {
    for (dangling, batch_size) in [(0, 1), (1, 1), (7, 3), (10, 5), (10, 1000)] {
        let store = store(dangling);
        let report = backfiller(&store, batch_size, UnitOfWork::Single)
            .run()
            .await
            .unwrap();
        let expected = dangling.div_ceil(batch_size).max(1);
        assert_eq!(
            report.iterations, expected,
            "D={dangling}, batch={batch_size}"
        );
        assert_eq!(report.inserted, dangling);
    }
}

#[tokio::test]
async fn second_run_performs_zero_inserts() {
    let store = store(4);
    let first = backfiller(&store, 3, UnitOfWork::Single).run().await.unwrap();
    let links_after_first = store.links();
    let writes_after_first = store.calls().links_written;

    let second = backfiller(&store, 3, UnitOfWork::Single).run().await.unwrap();

    assert_eq!(first.inserted, 4);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.fetched, 0);
    assert_eq!(second.iterations, 1);
    assert_eq!(store.links(), links_after_first);
    assert_eq!(store.calls().links_written, writes_after_first);
}

#[tokio::test]
async fn single_unit_of_work_wraps_whole_run() {
    let store = store(5);
    backfiller(&store, 2, UnitOfWork::Single).run().await.unwrap();
    let calls = store.calls();
    assert_eq!(calls.begins, 1);
    assert_eq!(calls.commits, 1);
    assert_eq!(calls.rollbacks, 0);
    assert!(!store.in_transaction());
}

#[tokio::test]
async fn per_batch_unit_of_work_commits_every_cycle() {
    let store = store(5);
    let report = backfiller(&store, 2, UnitOfWork::PerBatch)
        .run()
        .await
        .unwrap();
    let calls = store.calls();
    assert_eq!(report.iterations, 3);
    assert_eq!(calls.begins, 3);
    assert_eq!(calls.commits, 3);
    assert_eq!(report.unit_of_work, UnitOfWork::PerBatch);
}

#[tokio::test]
async fn progress_callback_sees_every_cycle() {
    let store = store(5);
    let mut cycles = Vec::new();
    backfiller(&store, 2, UnitOfWork::Single)
        .run_with_progress(|cycle| cycles.push(cycle.clone()))
        .await
        .unwrap();

    let remaining: Vec<usize> = cycles.iter().map(|c| c.remaining).collect();
    assert_eq!(remaining, vec![3, 1, 0]);
    assert_eq!(cycles[0].state, BackfillState::Scanning);
    assert_eq!(cycles[2].state, BackfillState::Done);
    assert_eq!(cycles[2].iteration, 3);
}

#[tokio::test]
async fn pending_counts_without_linking() {
    let store = store(3);
    let backfiller = backfiller(&store, 2, UnitOfWork::Single);
    assert_eq!(backfiller.pending().await.unwrap(), 3);
    assert!(store.links().is_empty());
    assert_eq!(store.calls().resolves, 0);
}

// ── Concurrent writers and store quirks ────────────────────────────────

#[tokio::test]
async fn tolerates_source_added_between_insert_and_recount() {
    let store = Arc::new(
        MemoryStore::with_sources(3)
            .default_target(TARGET)
            .arrival_after_insert(1, "src_late"),
    );

    let mut cycles = Vec::new();
    let report = backfiller(&store, 2, UnitOfWork::Single)
        .run_with_progress(|cycle| cycles.push(cycle.clone()))
        .await
        .unwrap();

    assert_eq!(report.state, BackfillState::Done);
    assert_eq!(report.inserted, 4);
    assert_eq!(store.link_count("src_late"), 1);
    assert!(store.dangling().is_empty());
    // The recount after the first batch sees the late arrival.
    assert_eq!(cycles[0].remaining, 2);
    assert_eq!(report.iterations, 2);
}

#[tokio::test]
async fn duplicate_link_in_batch_is_not_an_error() {
    let store = Arc::new(
        MemoryStore::with_sources(2)
            .default_target(TARGET)
            .leak_into_scan("src_000"),
    );
    store.add_link("src_000", TARGET);

    let report = backfiller(&store, 10, UnitOfWork::Single)
        .run()
        .await
        .unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.inserted, 1);
    assert_eq!(store.link_count("src_000"), 1);
    assert_eq!(store.link_count("src_001"), 1);
}

#[tokio::test]
async fn stalls_when_scan_finds_nothing_but_count_is_positive() {
    let store = Arc::new(
        MemoryStore::with_sources(0)
            .default_target(TARGET)
            .phantom_dangling(1),
    );
    let err = backfiller(&store, 10, UnitOfWork::Single)
        .run()
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            BackfillError::Stalled {
                iteration: 1,
                remaining: 1
            }
        ),
        "got {err:?}"
    );
    assert_eq!(store.calls().rollbacks, 1);
}

#[tokio::test]
async fn stalls_when_batch_is_only_already_linked_ids() {
    let store = Arc::new(
        MemoryStore::with_sources(2)
            .default_target(TARGET)
            .leak_into_scan("src_000"),
    );
    store.add_link("src_000", TARGET);

    let err = backfiller(&store, 1, UnitOfWork::Single)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, BackfillError::Stalled { remaining: 1, .. }));
    assert_eq!(store.link_count("src_000"), 1);
}

// ── Failures ───────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_default_target_is_fatal_before_any_scan() {
    let store = Arc::new(MemoryStore::with_sources(3));
    let err = backfiller(&store, 2, UnitOfWork::Single)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, BackfillError::ConfigurationMissing));
    assert!(err.to_string().contains("Run the owning system once"));
    let calls = store.calls();
    assert_eq!(calls.resolves, 1);
    assert_eq!(calls.begins, 0);
    assert_eq!(calls.counts, 0);
    assert_eq!(calls.fetches, 0);
    assert_eq!(calls.inserts, 0);
}

#[tokio::test]
async fn zero_batch_size_rejected_before_store_access() {
    let store = store(1);
    let err = backfiller(&store, 0, UnitOfWork::Single)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, BackfillError::InvalidConfig(_)));
    assert_eq!(store.calls(), CallCounts::default());
}

#[tokio::test]
async fn fetch_failure_rolls_back_whole_single_run() {
    let store = Arc::new(
        MemoryStore::with_sources(4)
            .default_target(TARGET)
            .fail_on(FailPoint::Fetch, 2),
    );
    let err = backfiller(&store, 2, UnitOfWork::Single)
        .run()
        .await
        .unwrap_err();

    match err {
        BackfillError::BackfillFailed { phase, source } => {
            assert_eq!(phase, BackfillPhase::Fetch);
            assert!(matches!(source, DbError::ExecutionError(_)));
        }
        other => panic!("expected BackfillFailed, got {other:?}"),
    }
    // The first batch was inside the same unit of work.
    assert!(store.links().is_empty());
    assert_eq!(store.calls().rollbacks, 1);
    assert!(!store.in_transaction());
}

#[tokio::test]
async fn per_batch_failure_keeps_committed_batches_and_rerun_finishes() {
    let failing = Arc::new(
        MemoryStore::with_sources(5)
            .default_target(TARGET)
            .fail_on(FailPoint::Insert, 2),
    );
    let err = backfiller(&failing, 2, UnitOfWork::PerBatch)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BackfillError::BackfillFailed {
            phase: BackfillPhase::Insert,
            ..
        }
    ));
    assert_eq!(failing.links().len(), 2);
    assert_eq!(failing.dangling().len(), 3);

    // The injected failure only hits the second insert call, so re-running
    // against the same store picks up where the first run stopped.
    let report = backfiller(&failing, 2, UnitOfWork::PerBatch)
        .run()
        .await
        .unwrap();
    assert_eq!(report.inserted, 3);
    assert!(failing.dangling().is_empty());
}

#[tokio::test]
async fn count_failure_surfaces_phase() {
    let store = Arc::new(
        MemoryStore::with_sources(1)
            .default_target(TARGET)
            .fail_on(FailPoint::Count, 1),
    );
    let err = backfiller(&store, 2, UnitOfWork::Single)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BackfillError::BackfillFailed {
            phase: BackfillPhase::Count,
            ..
        }
    ));
    assert!(!err.is_store_unavailable());
}

#[tokio::test]
async fn commit_failure_is_rolled_back() {
    let store = Arc::new(
        MemoryStore::with_sources(2)
            .default_target(TARGET)
            .fail_on(FailPoint::Commit, 1),
    );
    let err = backfiller(&store, 2, UnitOfWork::Single)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BackfillError::BackfillFailed {
            phase: BackfillPhase::Commit,
            ..
        }
    ));
    assert_eq!(store.calls().rollbacks, 1);
    assert!(store.links().is_empty());
}

#[tokio::test]
async fn begin_failure_opens_nothing() {
    let store = Arc::new(
        MemoryStore::with_sources(2)
            .default_target(TARGET)
            .fail_on(FailPoint::Begin, 1),
    );
    let err = backfiller(&store, 2, UnitOfWork::Single)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BackfillError::BackfillFailed {
            phase: BackfillPhase::Begin,
            ..
        }
    ));
    assert_eq!(store.calls().fetches, 0);
}

// ── Reports ────────────────────────────────────────────────────────────

#[tokio::test]
async fn report_serializes_for_json_output() {
    let store = store(2);
    let report = backfiller(&store, 1000, UnitOfWork::PerBatch)
        .run()
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["state"], "done");
    assert_eq!(json["unit_of_work"], "per_batch");
    assert_eq!(json["default_target"], TARGET);
    assert_eq!(json["inserted"], 2);
    assert_eq!(json["batch_size"], 1000);
}

#[test]
fn options_default_and_from_config() {
    let options = BackfillOptions::default();
    assert_eq!(options.batch_size, 1000);
    assert_eq!(options.unit_of_work, UnitOfWork::Single);

    let config = BackfillConfig {
        batch_size: 50,
        unit_of_work: UnitOfWork::PerBatch,
    };
    assert_eq!(
        BackfillOptions::from(&config),
        BackfillOptions {
            batch_size: 50,
            unit_of_work: UnitOfWork::PerBatch
        }
    );
}
