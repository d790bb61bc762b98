//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use lf_backfill::BackfillError;
use lf_core::Config;
use lf_db::{resolver_from_config, DefaultTargetResolver, DuckDbAssociationStore, DuckDbBackend};
use std::error::Error as _;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::cli::GlobalArgs;

/// Process exit status carried as an error.
///
/// Commands print their own diagnostic and return `Err(ExitCode(n).into())`;
/// `main` downcasts it and exits with `n` once the database handle is closed.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Renders nothing: the diagnostic is already on stderr.
        Ok(())
    }
}

impl std::error::Error for ExitCode {}

/// Exit code when no default target exists yet
pub(crate) const EXIT_MISSING_DEFAULT: i32 = 3;
/// Exit code for database connection and query failures
pub(crate) const EXIT_STORE_FAILURE: i32 = 4;
/// Exit code when the backfill stops making progress
pub(crate) const EXIT_STALLED: i32 = 5;
/// Exit code for `status --check` with dangling rows
pub(crate) const EXIT_DANGLING: i32 = 6;

/// Everything a command needs to talk to the project database
pub(crate) struct Workspace {
    pub config: Config,
    pub database: String,
    pub store: Arc<DuckDbAssociationStore>,
    pub resolver: Arc<dyn DefaultTargetResolver>,
}

/// Load the project config and open its database.
///
/// Connection failures and missing association tables are reported here
/// and turned into [`EXIT_STORE_FAILURE`].
pub(crate) fn open_workspace(global: &GlobalArgs) -> Result<Workspace> {
    let project_dir = Path::new(&global.project_dir);
    let config = load_config(global)?;

    let database = match &global.target {
        Some(path) => path.clone(),
        None => config.database_path(project_dir),
    };
    log::info!("Opening database {database} for project '{}'", config.name);

    let backend = match DuckDbBackend::new(&database) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            eprintln!("Error: cannot open database {database}: {e}");
            return Err(ExitCode(EXIT_STORE_FAILURE).into());
        }
    };

    let store = Arc::new(DuckDbAssociationStore::new(
        backend.clone(),
        &config.association,
    ));
    if let Err(e) = store.check_relations() {
        eprintln!("Error: {e}");
        eprintln!("  check the association tables configured in linkfill.yml");
        return Err(ExitCode(EXIT_STORE_FAILURE).into());
    }
    let resolver = resolver_from_config(backend, &config.default_target)
        .context("Invalid default_target configuration")?;

    Ok(Workspace {
        config,
        database,
        store,
        resolver: Arc::from(resolver),
    })
}

fn load_config(global: &GlobalArgs) -> Result<Config> {
    match &global.config {
        Some(path) => Config::load(Path::new(path))
            .with_context(|| format!("Failed to load config from {path}")),
        None => Config::load_from_dir(Path::new(&global.project_dir))
            .with_context(|| format!("Failed to load project at {}", global.project_dir)),
    }
}

/// Print a backfill failure and return the exit code error for it.
pub(crate) fn report_backfill_error(err: &BackfillError) -> anyhow::Error {
    eprintln!("Error: {err}");
    let mut cause = err.source().and_then(|s| s.source());
    while let Some(inner) = cause {
        eprintln!("  caused by: {inner}");
        cause = inner.source();
    }
    ExitCode(exit_code_for(err)).into()
}

pub(crate) fn exit_code_for(err: &BackfillError) -> i32 {
    match err {
        BackfillError::ConfigurationMissing => EXIT_MISSING_DEFAULT,
        BackfillError::BackfillFailed { .. } => EXIT_STORE_FAILURE,
        BackfillError::Stalled { .. } => EXIT_STALLED,
        BackfillError::InvalidConfig(_) => 1,
    }
}
