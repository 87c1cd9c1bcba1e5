//! Logical table catalog.
//!
//! A dataset declares its tables once, keyed by a logical name; recipe
//! code and callers never spell schema-qualified names.

use indexmap::IndexMap;

use carelake_core::{DeclaredTable, QueryError, Result};

/// Logical table name to declared table mapping for one dataset.
#[derive(Debug, Clone, Default)]
pub struct TableCatalog {
    tables: IndexMap<String, DeclaredTable>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chaining declaration for catalog construction.
    pub fn declare(mut self, name: impl Into<String>, table: DeclaredTable) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    /// Look up a logical table name.
    pub fn get(&self, name: &str) -> Result<&DeclaredTable> {
        self.tables
            .get(name)
            .ok_or_else(|| QueryError::unrecognized_table(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Logical names in declaration order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }
}
