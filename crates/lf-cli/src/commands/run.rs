//! Run command implementation

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use lf_backfill::{BackfillOptions, BackfillReport, Backfiller, CycleReport};
use lf_core::UnitOfWork;
use std::time::Duration;

use crate::cli::{GlobalArgs, OutputFormat, RunArgs};
use crate::commands::common::{self, open_workspace};

/// Execute the run command
pub async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let workspace = open_workspace(global)?;
    let options = run_options(&BackfillOptions::from(&workspace.config.backfill), args);

    let backfiller = Backfiller::new(workspace.store, workspace.resolver, options);

    let progress = match args.output {
        OutputFormat::Text => Some(spinner()),
        OutputFormat::Json => None,
    };

    let result = backfiller
        .run_with_progress(|cycle| {
            if let Some(pb) = &progress {
                pb.set_message(cycle_message(cycle));
            }
        })
        .await;

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    let report = match result {
        Ok(report) => report,
        Err(err) => return Err(common::report_backfill_error(&err)),
    };

    match args.output {
        OutputFormat::Text => print_text(&workspace.config.name, &report),
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Apply CLI overrides on top of the configured options
fn run_options(configured: &BackfillOptions, args: &RunArgs) -> BackfillOptions {
    let mut options = *configured;
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }
    if args.per_batch {
        options.unit_of_work = UnitOfWork::PerBatch;
    }
    options
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Resolving default target...");
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn cycle_message(cycle: &CycleReport) -> String {
    format!(
        "iteration {}: linked {} of {} fetched, {} dangling",
        cycle.iteration, cycle.inserted, cycle.fetched, cycle.remaining
    )
}

fn print_text(project: &str, report: &BackfillReport) {
    if report.inserted == 0 {
        println!("Nothing to backfill in '{project}': every source record is already linked");
        return;
    }
    println!(
        "Linked {} source records in '{}' to default target {}",
        report.inserted, project, report.default_target
    );
    println!(
        "  {} iterations, batch size {}, unit of work {}, {} ms",
        report.iterations, report.batch_size, report.unit_of_work, report.elapsed_ms
    );
}
