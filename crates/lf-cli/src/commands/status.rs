//! Status command implementation

use anyhow::{Context, Result};
use lf_core::TargetId;
use lf_db::AssociationStore;
use serde::Serialize;

use crate::cli::{GlobalArgs, OutputFormat, StatusArgs};
use crate::commands::common::{open_workspace, ExitCode, EXIT_DANGLING, EXIT_STORE_FAILURE};

/// Snapshot of the association between sources and links
#[derive(Debug, Serialize)]
struct StatusReport {
    project: String,
    database: String,
    default_target: Option<TargetId>,
    sources: usize,
    links: usize,
    dangling: usize,
}

/// Execute the status command
pub async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let workspace = open_workspace(global)?;

    let snapshot = async {
        let default_target = workspace.resolver.resolve_default_target().await?;
        let sources = workspace.store.total_sources()?;
        let links = workspace.store.total_links()?;
        let dangling = workspace.store.count_dangling().await?;
        Ok::<_, lf_db::DbError>((default_target, sources, links, dangling))
    }
    .await;

    let (default_target, sources, links, dangling) = match snapshot {
        Ok(values) => values,
        Err(e) => {
            eprintln!("Error: {e}");
            return Err(ExitCode(EXIT_STORE_FAILURE).into());
        }
    };

    let report = StatusReport {
        project: workspace.config.name.clone(),
        database: workspace.database.clone(),
        default_target,
        sources,
        links,
        dangling,
    };

    match args.output {
        OutputFormat::Text => print_text(&report),
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
            println!("{json}");
        }
    }

    if args.check && report.dangling > 0 {
        if args.output == OutputFormat::Text {
            eprintln!(
                "{} source records have no link; run `lf run` to backfill them",
                report.dangling
            );
        }
        return Err(ExitCode(EXIT_DANGLING).into());
    }
    Ok(())
}

fn print_text(report: &StatusReport) {
    println!("Project: {}", report.project);
    println!("Database: {}", report.database);
    match &report.default_target {
        Some(target) => println!("Default target: {target}"),
        None => println!("Default target: missing (run the owning system once to establish one)"),
    }
    println!("Sources: {}", report.sources);
    println!("Links: {}", report.links);
    println!("Dangling: {}", report.dangling);
}
