//! Declared table schemas.
//!
//! Warehouse tables are declared up front as Rust values (name, schema,
//! typed columns) rather than introspected, so column presence and types
//! are known while a query is still being built.

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};

/// Declared SQL type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Timestamp,
}

impl SqlType {
    /// SQL spelling used when rendering a CAST.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Float => "DOUBLE PRECISION",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
        }
    }

    /// Parse the short names recipe code uses ("str", "int", "timestamp").
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "str" | "text" => Ok(Self::Text),
            "int" | "integer" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "bool" | "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "timestamp" => Ok(Self::Timestamp),
            other => Err(QueryError::invalid_argument(format!(
                "unknown SQL type '{other}'"
            ))),
        }
    }
}

/// A named, typed column of a declared table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: SqlType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A base table declared in a warehouse schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredTable {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl DeclaredTable {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Declare a column. Chains for catalog construction.
    pub fn column(mut self, name: impl Into<String>, ty: SqlType) -> Self {
        self.columns.push(ColumnDef::new(name, ty));
        self
    }

    /// Fully qualified `schema.name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}
