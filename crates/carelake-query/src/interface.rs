//! The deferred query interface and its executor seam.
//!
//! Recipes hand back a [`QueryInterface`] holding a fully built query;
//! nothing touches the database until [`QueryInterface::run`] is called
//! with whatever [`QueryExecutor`] the caller wired in. Keeping execution
//! behind a trait keeps the whole layer testable without a live warehouse.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use carelake_core::{QueryError, Result, SqlQuery, Subquery, Value};

/// An in-memory tabular query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell lookup by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }
}

/// Executes rendered queries against a warehouse.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn fetch(&self, query: &SqlQuery) -> Result<RowSet>;
}

/// Client-side transformation applied to fetched rows.
pub type PostProcess = Arc<dyn Fn(RowSet) -> Result<RowSet> + Send + Sync>;

/// A built query paired with the executor that can run it.
///
/// Construction performs no I/O; the same interface can be rendered with
/// [`QueryInterface::to_sql`] or run any number of times.
#[derive(Clone)]
pub struct QueryInterface {
    query: Subquery,
    executor: Arc<dyn QueryExecutor>,
    post_process: Option<PostProcess>,
}

impl QueryInterface {
    pub fn new(query: Subquery, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            query,
            executor,
            post_process: None,
        }
    }

    /// Attach a row transformation applied after every fetch.
    pub fn with_post_process(
        mut self,
        f: impl Fn(RowSet) -> Result<RowSet> + Send + Sync + 'static,
    ) -> Self {
        self.post_process = Some(Arc::new(f));
        self
    }

    /// The underlying table handle, reusable as input to further recipes.
    pub fn query(&self) -> &Subquery {
        &self.query
    }

    /// Render without executing.
    pub fn to_sql(&self) -> Result<SqlQuery> {
        self.query.to_sql()
    }

    /// Render, fetch, and post-process.
    pub async fn run(&self) -> Result<RowSet> {
        let sql = self.to_sql()?;
        tracing::debug!(params = sql.params.len(), "executing query");
        let rows = self.executor.fetch(&sql).await?;

        let rows = match &self.post_process {
            Some(f) => f(rows)?,
            None => rows,
        };

        if rows.columns.is_empty() {
            return Err(QueryError::execution("executor returned no columns"));
        }
        tracing::debug!(rows = rows.len(), "query returned");
        Ok(rows)
    }
}

impl fmt::Debug for QueryInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryInterface")
            .field("query", &self.query)
            .field("post_process", &self.post_process.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelake_core::{DeclaredTable, SqlType};

    /// Records the queries it receives and returns a canned result.
    struct RecordingExecutor {
        result: RowSet,
    }

    #[async_trait]
    impl QueryExecutor for RecordingExecutor {
        async fn fetch(&self, query: &SqlQuery) -> Result<RowSet> {
            if query.sql.is_empty() {
                return Err(QueryError::execution("empty query"));
            }
            Ok(self.result.clone())
        }
    }

    fn patients_query() -> Subquery {
        Subquery::from_table(
            DeclaredTable::new("hosp", "patients")
                .column("subject_id", SqlType::Integer)
                .column("sex", SqlType::Text),
        )
    }

    fn executor() -> Arc<dyn QueryExecutor> {
        Arc::new(RecordingExecutor {
            result: RowSet::new(
                vec!["subject_id".into(), "sex".into()],
                vec![
                    vec![Value::Integer(1), Value::Text("F".into())],
                    vec![Value::Integer(2), Value::Text("M".into())],
                ],
            ),
        })
    }

    #[test]
    fn test_construction_renders_without_io() {
        let interface = QueryInterface::new(patients_query(), executor());
        let sql = interface.to_sql().unwrap();
        assert_eq!(sql.sql, "SELECT subject_id, sex FROM hosp.patients");
    }

    #[tokio::test]
    async fn test_run_fetches_rows() {
        let interface = QueryInterface::new(patients_query(), executor());
        let rows = interface.run().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.get(0, "sex"), Some(&Value::Text("F".into())));
    }

    #[tokio::test]
    async fn test_post_process_runs_after_fetch() {
        let interface = QueryInterface::new(patients_query(), executor())
            .with_post_process(|mut rows| {
                rows.rows.retain(|r| r[1] == Value::Text("F".into()));
                Ok(rows)
            });
        let rows = interface.run().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.get(0, "subject_id"), Some(&Value::Integer(1)));
    }

    #[tokio::test]
    async fn test_interface_is_reusable() {
        let interface = QueryInterface::new(patients_query(), executor());
        let first = interface.run().await.unwrap();
        let second = interface.run().await.unwrap();
        assert_eq!(first, second);
    }
}
