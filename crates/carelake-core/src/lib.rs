//! Core query model for CareLake.
//!
//! This crate holds the building blocks the query layer composes: the
//! [`Value`] model used for bind parameters and runtime arguments, the
//! declared [`schema`] types, the [`expr`] expression/predicate algebra,
//! and the [`relation`] module with the canonical [`Subquery`] table handle
//! and its SQL rendering.
//!
//! Everything here is pure construction: building a query performs no I/O
//! and produces a parameterized [`SqlQuery`] for an external executor.

pub mod error;
pub mod expr;
pub mod relation;
pub mod schema;
pub mod value;

pub use error::{QueryError, Result};
pub use expr::{CompareOp, DateDelta, DateField, Expr, Predicate};
pub use relation::{
    JoinPair, Projection, Relation, SelectStatement, SqlQuery, Subquery, TableExpr, union_all,
};
pub use schema::{ColumnDef, DeclaredTable, SqlType};
pub use value::Value;
