//! Configuration types and parsing for linkfill.yml

use crate::error::{CoreError, CoreResult};
use crate::ids::TargetId;
use crate::sql_utils::is_valid_identifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default number of dangling source records handled per cycle
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Main project configuration from linkfill.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name, used in log lines and reports
    pub name: String,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Backfill loop tuning
    #[serde(default)]
    pub backfill: BackfillConfig,

    /// The source relation and the link relation the backfill touches
    pub association: AssociationConfig,

    /// Where the default target comes from
    pub default_target: DefaultTargetConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the DuckDB file, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Backfill loop tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BackfillConfig {
    /// Maximum number of dangling records fetched and linked per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Transaction granularity
    #[serde(default)]
    pub unit_of_work: UnitOfWork,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            unit_of_work: UnitOfWork::default(),
        }
    }
}

/// Transaction granularity of a backfill run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitOfWork {
    /// One transaction spans the whole run
    #[default]
    Single,
    /// Every scan/insert/recount cycle commits on its own
    PerBatch,
}

impl fmt::Display for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOfWork::Single => write!(f, "single"),
            UnitOfWork::PerBatch => write!(f, "per_batch"),
        }
    }
}

/// The two relations the backfill touches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AssociationConfig {
    pub source: SourceTableConfig,
    pub link: LinkTableConfig,
}

/// Relation holding the records that must end up linked
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SourceTableConfig {
    /// Table name, optionally schema-qualified
    pub table: String,

    /// Primary key column
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

/// Join relation holding `(source, target)` rows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LinkTableConfig {
    /// Table name, optionally schema-qualified
    pub table: String,

    /// Column referencing the source record
    pub source_column: String,

    /// Column referencing the target record
    pub target_column: String,
}

/// Where the default target id is read from.
///
/// Exactly one of `id` or `table` + `column` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DefaultTargetConfig {
    /// Pinned target id
    #[serde(default)]
    pub id: Option<TargetId>,

    /// Settings table holding the default target id
    #[serde(default)]
    pub table: Option<String>,

    /// Column of `table` holding the default target id
    #[serde(default)]
    pub column: Option<String>,
}

/// Resolved form of [`DefaultTargetConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultTargetSource<'a> {
    /// Target id pinned in configuration
    Static(&'a TargetId),
    /// Target id read from the first row of a settings table
    Table { table: &'a str, column: &'a str },
}

impl DefaultTargetConfig {
    /// Which resolver this configuration selects.
    ///
    /// Only meaningful on a validated config; an invalid combination
    /// returns `ConfigInvalid`.
    pub fn source(&self) -> CoreResult<DefaultTargetSource<'_>> {
        match (&self.id, &self.table, &self.column) {
            (Some(id), None, None) => Ok(DefaultTargetSource::Static(id)),
            (None, Some(table), Some(column)) => Ok(DefaultTargetSource::Table { table, column }),
            (Some(_), _, _) => Err(CoreError::ConfigInvalid {
                message: "default_target: 'id' cannot be combined with 'table'/'column'"
                    .to_string(),
            }),
            _ => Err(CoreError::ConfigInvalid {
                message: "default_target: set either 'id', or both 'table' and 'column'"
                    .to_string(),
            }),
        }
    }
}

fn default_db_path() -> String {
    "linkfill.duckdb".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_id_column() -> String {
    "id".to_string()
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        log::debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> CoreResult<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for linkfill.yml or linkfill.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("linkfill.yml");
        let yaml_path = dir.join("linkfill.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }

        if self.backfill.batch_size == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "backfill.batch_size must be at least 1".to_string(),
            });
        }

        let source = &self.association.source;
        let link = &self.association.link;
        check_identifier("association.source.table", &source.table, true)?;
        check_identifier("association.source.id_column", &source.id_column, false)?;
        check_identifier("association.link.table", &link.table, true)?;
        check_identifier("association.link.source_column", &link.source_column, false)?;
        check_identifier("association.link.target_column", &link.target_column, false)?;

        if link.source_column == link.target_column {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "association.link.source_column and target_column must differ (both '{}')",
                    link.source_column
                ),
            });
        }

        if let DefaultTargetSource::Table { table, column } = self.default_target.source()? {
            check_identifier("default_target.table", table, true)?;
            check_identifier("default_target.column", column, false)?;
        }

        Ok(())
    }

    /// Resolve the database path against a project root.
    ///
    /// `:memory:` and absolute paths are returned unchanged.
    pub fn database_path(&self, root: &Path) -> String {
        if self.database.path == ":memory:" {
            return self.database.path.clone();
        }
        let path = PathBuf::from(&self.database.path);
        if path.is_absolute() {
            self.database.path.clone()
        } else {
            root.join(path).display().to_string()
        }
    }
}

fn check_identifier(field: &str, value: &str, qualified: bool) -> CoreResult<()> {
    if is_valid_identifier(value, qualified) {
        Ok(())
    } else {
        Err(CoreError::InvalidIdentifier {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
