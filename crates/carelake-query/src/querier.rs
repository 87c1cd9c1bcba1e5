//! Dataset querier base.
//!
//! A dataset bundles a [`TableCatalog`], a column-standardization map, and
//! an executor handle. Recipes resolve logical names through [`table`],
//! getting back a canonical subquery whose columns already carry the
//! dataset-wide standard names.
//!
//! [`table`]: DatasetQuerier::table

use std::sync::Arc;

use indexmap::IndexMap;

use carelake_core::{Result, Subquery, TableExpr};

use crate::catalog::TableCatalog;
use crate::interface::{QueryExecutor, QueryInterface, RowSet};
use crate::ops::{QueryOp, Rename};

/// Shared base of the per-dataset queriers.
#[derive(Clone)]
pub struct DatasetQuerier {
    catalog: TableCatalog,
    column_map: IndexMap<String, String>,
    executor: Arc<dyn QueryExecutor>,
}

impl DatasetQuerier {
    pub fn new(catalog: TableCatalog, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            catalog,
            column_map: IndexMap::new(),
            executor,
        }
    }

    /// Dataset-wide column renames applied by [`DatasetQuerier::table`].
    /// Applied leniently: map entries absent from a given table are
    /// skipped.
    pub fn with_column_map<K, V, I>(mut self, map: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.column_map = map.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Resolve a logical table name to a canonical subquery with
    /// standardized column names.
    pub fn table(&self, name: &str) -> Result<Subquery> {
        let table = self.table_raw(name)?;
        if self.column_map.is_empty() {
            return Ok(table);
        }
        Rename::lenient(self.column_map.clone()).apply(table)
    }

    /// Resolve a logical table name without column standardization.
    pub fn table_raw(&self, name: &str) -> Result<Subquery> {
        let table = self.catalog.get(name)?;
        tracing::debug!(table = %table.qualified_name(), "resolved table");
        Ok(TableExpr::from(table.clone()).into_subquery())
    }

    /// Logical table names this dataset declares.
    pub fn table_names(&self) -> Vec<&str> {
        self.catalog.table_names()
    }

    /// Wrap a finished query for deferred execution.
    pub fn interface(&self, table: Subquery) -> QueryInterface {
        QueryInterface::new(table, self.executor.clone())
    }

    /// Wrap a finished query with a client-side row transformation.
    pub fn interface_processed(
        &self,
        table: Subquery,
        post_process: impl Fn(RowSet) -> Result<RowSet> + Send + Sync + 'static,
    ) -> QueryInterface {
        self.interface(table).with_post_process(post_process)
    }

    pub fn executor(&self) -> Arc<dyn QueryExecutor> {
        self.executor.clone()
    }
}

impl std::fmt::Debug for DatasetQuerier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetQuerier")
            .field("tables", &self.catalog.table_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use carelake_core::{DeclaredTable, QueryError, SqlQuery, SqlType, Value};

    struct NullExecutor;

    #[async_trait]
    impl QueryExecutor for NullExecutor {
        async fn fetch(&self, _query: &SqlQuery) -> Result<RowSet> {
            Ok(RowSet::new(vec!["n".into()], vec![vec![Value::Integer(0)]]))
        }
    }

    fn querier() -> DatasetQuerier {
        let catalog = TableCatalog::new()
            .declare(
                "patients",
                DeclaredTable::new("mimiciv_hosp", "patients")
                    .column("subject_id", SqlType::Integer)
                    .column("gender", SqlType::Text),
            )
            .declare(
                "admissions",
                DeclaredTable::new("mimiciv_hosp", "admissions")
                    .column("subject_id", SqlType::Integer)
                    .column("hadm_id", SqlType::Integer),
            );
        DatasetQuerier::new(catalog, Arc::new(NullExecutor))
            .with_column_map([("gender", "sex"), ("hadm_id", "encounter_id")])
    }

    #[test]
    fn test_table_applies_standard_names_leniently() {
        let querier = querier();

        // Each table gets only the renames that apply to it.
        let patients = querier.table("patients").unwrap();
        assert!(patients.has_column("sex"));
        assert!(!patients.has_column("gender"));

        let admissions = querier.table("admissions").unwrap();
        assert!(admissions.has_column("encounter_id"));
        assert!(admissions.has_column("subject_id"));
    }

    #[test]
    fn test_table_raw_keeps_source_names() {
        let patients = querier().table_raw("patients").unwrap();
        assert!(patients.has_column("gender"));
    }

    #[test]
    fn test_unknown_table_name() {
        let err = querier().table("labevents").unwrap_err();
        assert!(matches!(err, QueryError::UnrecognizedTable(_)));
    }

    #[tokio::test]
    async fn test_interface_wraps_executor() {
        let querier = querier();
        let table = querier.table("patients").unwrap();
        let rows = querier.interface(table).run().await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
