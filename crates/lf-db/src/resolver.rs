//! Default target resolvers

use crate::duckdb::DuckDbBackend;
use crate::error::DbResult;
use crate::traits::DefaultTargetResolver;
use async_trait::async_trait;
use lf_core::config::{DefaultTargetConfig, DefaultTargetSource};
use lf_core::sql_utils::{quote_ident, quote_qualified};
use lf_core::TargetId;
use std::sync::Arc;

/// Resolver returning a target id pinned in configuration
pub struct StaticTargetResolver {
    target: TargetId,
}

impl StaticTargetResolver {
    pub fn new(target: TargetId) -> Self {
        Self { target }
    }
}

#[async_trait]
impl DefaultTargetResolver for StaticTargetResolver {
    async fn resolve_default_target(&self) -> DbResult<Option<TargetId>> {
        Ok(Some(self.target.clone()))
    }
}

/// Resolver reading the default target id from a settings table.
///
/// Only the first row is read. No row, a `NULL`, or an empty string all
/// mean the owning system has not established a default yet.
pub struct TableTargetResolver {
    backend: Arc<DuckDbBackend>,
    sql: String,
}

impl TableTargetResolver {
    pub fn new(backend: Arc<DuckDbBackend>, table: &str, column: &str) -> Self {
        let sql = format!(
            "SELECT CAST({} AS VARCHAR) FROM {} LIMIT 1",
            quote_ident(column),
            quote_qualified(table)
        );
        Self { backend, sql }
    }

    fn resolve_sync(&self) -> DbResult<Option<TargetId>> {
        let conn = self.backend.lock()?;
        let mut stmt = conn.prepare(&self.sql)?;
        let mut rows = stmt.query([])?;
        let value = match rows.next()? {
            Some(row) => row.get::<_, Option<String>>(0)?,
            None => None,
        };
        Ok(value.and_then(TargetId::try_new))
    }
}

#[async_trait]
impl DefaultTargetResolver for TableTargetResolver {
    async fn resolve_default_target(&self) -> DbResult<Option<TargetId>> {
        self.resolve_sync()
    }
}

/// Build the resolver selected by `default_target` in `linkfill.yml`.
pub fn resolver_from_config(
    backend: Arc<DuckDbBackend>,
    config: &DefaultTargetConfig,
) -> lf_core::CoreResult<Box<dyn DefaultTargetResolver>> {
    let resolver: Box<dyn DefaultTargetResolver> = match config.source()? {
        DefaultTargetSource::Static(id) => Box::new(StaticTargetResolver::new(id.clone())),
        DefaultTargetSource::Table { table, column } => {
            Box::new(TableTargetResolver::new(backend, table, column))
        }
    };
    Ok(resolver)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with_store(sql: &str) -> Arc<DuckDbBackend> {
        let backend = Arc::new(DuckDbBackend::in_memory().unwrap());
        backend
            .execute_batch("CREATE TABLE store (id VARCHAR, default_sales_channel_id VARCHAR)")
            .unwrap();
        if !sql.is_empty() {
            backend.execute_batch(sql).unwrap();
        }
        backend
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticTargetResolver::new(TargetId::new("sc_1"));
        assert_eq!(
            resolver.resolve_default_target().await.unwrap(),
            Some(TargetId::new("sc_1"))
        );
    }

    #[tokio::test]
    async fn test_table_resolver_reads_first_row() {
        let backend = backend_with_store("INSERT INTO store VALUES ('store_1', 'sc_default')");
        let resolver = TableTargetResolver::new(backend, "store", "default_sales_channel_id");
        assert_eq!(
            resolver.resolve_default_target().await.unwrap(),
            Some(TargetId::new("sc_default"))
        );
    }

    #[tokio::test]
    async fn test_table_resolver_no_row_is_missing() {
        let backend = backend_with_store("");
        let resolver = TableTargetResolver::new(backend, "store", "default_sales_channel_id");
        assert_eq!(resolver.resolve_default_target().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_table_resolver_null_or_empty_is_missing() {
        let backend = backend_with_store("INSERT INTO store VALUES ('store_1', NULL)");
        let resolver =
            TableTargetResolver::new(backend.clone(), "store", "default_sales_channel_id");
        assert_eq!(resolver.resolve_default_target().await.unwrap(), None);

        backend
            .execute_batch("UPDATE store SET default_sales_channel_id = ''")
            .unwrap();
        assert_eq!(resolver.resolve_default_target().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_table_resolver_missing_table_is_store_error() {
        let backend = Arc::new(DuckDbBackend::in_memory().unwrap());
        let resolver = TableTargetResolver::new(backend, "store", "default_sales_channel_id");
        let err = resolver.resolve_default_target().await.unwrap_err();
        assert!(matches!(err, crate::DbError::TableNotFound(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_resolver_from_config_static() {
        let backend = Arc::new(DuckDbBackend::in_memory().unwrap());
        let config = DefaultTargetConfig {
            id: Some(TargetId::new("sc_pinned")),
            ..Default::default()
        };
        let resolver = resolver_from_config(backend, &config).unwrap();
        assert_eq!(
            resolver.resolve_default_target().await.unwrap(),
            Some(TargetId::new("sc_pinned"))
        );
    }

    #[test]
    fn test_resolver_from_config_rejects_empty() {
        let backend = Arc::new(DuckDbBackend::in_memory().unwrap());
        assert!(resolver_from_config(backend, &DefaultTargetConfig::default()).is_err());
    }
}
