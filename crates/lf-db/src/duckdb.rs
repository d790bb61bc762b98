//! DuckDB association store implementation

use crate::error::{DbError, DbResult};
use crate::traits::AssociationStore;
use async_trait::async_trait;
use duckdb::Connection;
use lf_core::config::AssociationConfig;
use lf_core::sql_utils::{quote_ident, quote_qualified};
use lf_core::{AssociationLink, SourceId};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// DuckDB connection shared by the store and the table resolver
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{e}: {}", path.display())))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    pub(crate) fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    /// Execute one or more statements
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run `SELECT COUNT(*)` style SQL returning a single integer
    pub fn query_count(&self, sql: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| DbError::Internal(format!("negative count: {e}")))
    }

    /// Check if a table or view exists
    pub fn relation_exists(&self, name: &str) -> DbResult<bool> {
        let (schema, table) = match name.rfind('.') {
            Some(pos) => (&name[..pos], &name[pos + 1..]),
            None => ("main", name),
        };
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE lower(table_schema) = lower(?) AND lower(table_name) = lower(?)",
            duckdb::params![schema, table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn transaction_statement(&self, stmt: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(stmt)
            .map_err(|e| DbError::TransactionError(format!("{stmt} failed: {e}")))
    }
}

/// SQL text for one configured association, quoted once at construction
#[derive(Debug, Clone)]
struct AssociationSql {
    source_table: String,
    link_table: String,
    count_dangling: String,
    fetch_dangling: String,
    insert_prefix: String,
    insert_suffix: String,
}

impl AssociationSql {
    fn new(config: &AssociationConfig) -> Self {
        let source_table = quote_qualified(&config.source.table);
        let link_table = quote_qualified(&config.link.table);
        let id = quote_ident(&config.source.id_column);
        let link_source = quote_ident(&config.link.source_column);
        let link_target = quote_ident(&config.link.target_column);

        let dangling = format!(
            "FROM {source_table} AS s \
             LEFT JOIN {link_table} AS l ON l.{link_source} = s.{id} \
             WHERE l.{link_source} IS NULL AND s.{id} IS NOT NULL"
        );

        Self {
            count_dangling: format!("SELECT COUNT(DISTINCT s.{id}) {dangling}"),
            fetch_dangling: format!("SELECT DISTINCT CAST(s.{id} AS VARCHAR) {dangling}"),
            insert_prefix: format!(
                "INSERT INTO {link_table} ({link_source}, {link_target}) \
                 SELECT DISTINCT v.src, v.tgt FROM (VALUES "
            ),
            insert_suffix: format!(
                ") AS v(src, tgt) WHERE NOT EXISTS (\
                 SELECT 1 FROM {link_table} AS l \
                 WHERE CAST(l.{link_source} AS VARCHAR) = v.src \
                 AND CAST(l.{link_target} AS VARCHAR) = v.tgt)"
            ),
            source_table,
            link_table,
        }
    }

    fn insert(&self, rows: usize) -> String {
        let values = vec!["(CAST(? AS VARCHAR), CAST(? AS VARCHAR))"; rows].join(", ");
        format!("{}{}{}", self.insert_prefix, values, self.insert_suffix)
    }
}

/// [`AssociationStore`] over a source table and a link table in DuckDB.
///
/// The dangling set is an anti-join of the source table against the link
/// table. Inserts deduplicate against existing rows with `NOT EXISTS`, so
/// no unique constraint is required on the link table.
pub struct DuckDbAssociationStore {
    backend: Arc<DuckDbBackend>,
    source_table: String,
    link_table: String,
    sql: AssociationSql,
}

impl DuckDbAssociationStore {
    pub fn new(backend: Arc<DuckDbBackend>, config: &AssociationConfig) -> Self {
        Self {
            backend,
            source_table: config.source.table.clone(),
            link_table: config.link.table.clone(),
            sql: AssociationSql::new(config),
        }
    }

    /// Fail with `TableNotFound` naming the first configured table that
    /// does not exist.
    pub fn check_relations(&self) -> DbResult<()> {
        for table in [&self.source_table, &self.link_table] {
            if !self.backend.relation_exists(table)? {
                return Err(DbError::TableNotFound(table.clone()));
            }
        }
        Ok(())
    }

    /// Total rows in the source table
    pub fn total_sources(&self) -> DbResult<usize> {
        self.backend
            .query_count(&format!("SELECT COUNT(*) FROM {}", self.sql.source_table))
    }

    /// Total rows in the link table
    pub fn total_links(&self) -> DbResult<usize> {
        self.backend
            .query_count(&format!("SELECT COUNT(*) FROM {}", self.sql.link_table))
    }

    fn fetch_dangling_sync(&self, limit: usize) -> DbResult<Vec<SourceId>> {
        let sql = format!("{} LIMIT {}", self.sql.fetch_dangling, limit);
        let conn = self.backend.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(SourceId::new).collect())
    }

    fn insert_links_sync(&self, links: &[AssociationLink]) -> DbResult<usize> {
        if links.is_empty() {
            return Ok(0);
        }
        let sql = self.sql.insert(links.len());
        let params: Vec<&str> = links
            .iter()
            .flat_map(|link| [link.source_id.as_str(), link.target_id.as_str()])
            .collect();
        let conn = self.backend.lock()?;
        let inserted = conn.execute(&sql, duckdb::params_from_iter(params))?;
        Ok(inserted)
    }
}

#[async_trait]
impl AssociationStore for DuckDbAssociationStore {
    async fn count_dangling(&self) -> DbResult<usize> {
        self.backend.query_count(&self.sql.count_dangling)
    }

    async fn fetch_dangling_batch(&self, limit: usize) -> DbResult<Vec<SourceId>> {
        self.fetch_dangling_sync(limit)
    }

    async fn insert_links_ignoring_duplicates(
        &self,
        links: &[AssociationLink],
    ) -> DbResult<usize> {
        self.insert_links_sync(links)
    }

    async fn begin(&self) -> DbResult<()> {
        self.backend.transaction_statement("BEGIN TRANSACTION")
    }

    async fn commit(&self) -> DbResult<()> {
        self.backend.transaction_statement("COMMIT")
    }

    async fn rollback(&self) -> DbResult<()> {
        self.backend.transaction_statement("ROLLBACK")
    }

    fn store_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
