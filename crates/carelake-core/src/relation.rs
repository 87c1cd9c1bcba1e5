//! Relations: the canonical subquery form and its SQL rendering.
//!
//! Every operator in the query layer consumes and produces a [`Subquery`].
//! Heterogeneous table-like inputs (declared tables, select statements,
//! subqueries) are normalized through [`TableExpr`] before any operator
//! runs, so operators never special-case input shapes.
//!
//! Rendering is deterministic: structurally identical subqueries produce
//! byte-identical SQL with identically ordered bind parameters.

use std::fmt;

use serde::Serialize;

use crate::error::{QueryError, Result};
use crate::expr::{Expr, Predicate};
use crate::schema::{DeclaredTable, SqlType};
use crate::value::Value;

/// One output column of a subquery.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub expr: Expr,
    pub alias: String,
    pub ty: SqlType,
}

impl Projection {
    pub fn new(expr: Expr, alias: impl Into<String>, ty: SqlType) -> Self {
        Self {
            expr,
            alias: alias.into(),
            ty,
        }
    }

    /// A pass-through projection of a source column.
    pub fn passthrough(name: impl Into<String>, ty: SqlType) -> Self {
        let name = name.into();
        Self {
            expr: Expr::col(name.clone()),
            alias: name,
            ty,
        }
    }
}

/// A join-key column pair, left side first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPair {
    pub left: String,
    pub right: String,
}

impl JoinPair {
    /// Same column name on both sides.
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            left: name.clone(),
            right: name,
        }
    }

    /// Differing column names on each side.
    pub fn between(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

/// The FROM source of a subquery.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// A declared base table.
    Table(DeclaredTable),

    /// A nested subquery.
    Subquery(Box<Subquery>),

    /// Two subqueries joined on one or more column pairs. Sides are
    /// qualified `l` and `r` in column expressions of the enclosing
    /// projection.
    Join {
        left: Box<Subquery>,
        right: Box<Subquery>,
        on: Vec<JoinPair>,
        coerce: Option<SqlType>,
        outer: bool,
    },

    /// UNION ALL of subqueries with identical column names.
    Union(Vec<Subquery>),
}

/// The canonical table handle: a deferred SELECT over a source relation.
///
/// Operators are pure transforms; applying one wraps the input in a new
/// layer rather than mutating it, so handles can be shared and reused.
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub source: Relation,
    pub projection: Vec<Projection>,
    pub predicate: Option<Predicate>,
    pub limit: Option<u64>,
}

impl Subquery {
    /// Canonicalize a declared base table: a pass-through selection of its
    /// declared columns.
    pub fn from_table(table: DeclaredTable) -> Self {
        let projection = table
            .columns
            .iter()
            .map(|c| Projection::passthrough(c.name.clone(), c.ty))
            .collect();
        Self {
            source: Relation::Table(table),
            projection,
            predicate: None,
            limit: None,
        }
    }

    /// Wrap this subquery in a fresh pass-through selection layer.
    pub fn wrap(self) -> Self {
        let projection = self
            .projection
            .iter()
            .map(|p| Projection::passthrough(p.alias.clone(), p.ty))
            .collect();
        Self {
            source: Relation::Subquery(Box::new(self)),
            projection,
            predicate: None,
            limit: None,
        }
    }

    /// Output column names, in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.projection.iter().map(|p| p.alias.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.projection.iter().any(|p| p.alias == name)
    }

    pub fn column_type(&self, name: &str) -> Option<SqlType> {
        self.projection
            .iter()
            .find(|p| p.alias == name)
            .map(|p| p.ty)
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.projection.iter().position(|p| p.alias == name)
    }

    /// Lift into a select statement, e.g. as a UNION ALL branch.
    pub fn select(self) -> SelectStatement {
        SelectStatement { query: self }
    }

    /// Render to a parameterized SQL query.
    pub fn to_sql(&self) -> Result<SqlQuery> {
        let mut params = Vec::new();
        let sql = self.render(&mut params)?;
        Ok(SqlQuery { sql, params })
    }

    fn render(&self, params: &mut Vec<Value>) -> Result<String> {
        let projections = self
            .projection
            .iter()
            .map(|p| {
                let rendered = p.expr.render(params)?;
                // Plain same-name column references need no alias clause.
                Ok(match &p.expr {
                    Expr::Column {
                        qualifier: None,
                        name,
                    } if *name == p.alias => rendered,
                    _ => format!("{rendered} AS {}", p.alias),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let from = self.render_source(params)?;

        let mut sql = format!("SELECT {} FROM {from}", projections.join(", "));

        if let Some(pred) = &self.predicate {
            sql.push_str(" WHERE ");
            sql.push_str(&pred.render(params)?);
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        Ok(sql)
    }

    fn render_source(&self, params: &mut Vec<Value>) -> Result<String> {
        match &self.source {
            Relation::Table(table) => Ok(table.qualified_name()),
            Relation::Subquery(inner) => {
                let sql = inner.render(params)?;
                Ok(format!("({sql}) AS t"))
            }
            Relation::Join {
                left,
                right,
                on,
                coerce,
                outer,
            } => {
                if on.is_empty() {
                    return Err(QueryError::invalid_argument(
                        "join requires at least one key pair",
                    ));
                }
                let left_sql = left.render(params)?;
                let right_sql = right.render(params)?;
                let join_kw = if *outer { "LEFT OUTER JOIN" } else { "INNER JOIN" };
                let on_sql = on
                    .iter()
                    .map(|pair| match coerce {
                        Some(ty) => format!(
                            "CAST(l.{} AS {ty_sql}) = CAST(r.{} AS {ty_sql})",
                            pair.left,
                            pair.right,
                            ty_sql = ty.as_sql()
                        ),
                        None => format!("l.{} = r.{}", pair.left, pair.right),
                    })
                    .collect::<Vec<_>>()
                    .join(" AND ");
                Ok(format!(
                    "({left_sql}) AS l {join_kw} ({right_sql}) AS r ON {on_sql}"
                ))
            }
            Relation::Union(branches) => {
                if branches.is_empty() {
                    return Err(QueryError::invalid_argument("union of zero tables"));
                }
                let rendered = branches
                    .iter()
                    .map(|b| Ok(format!("({})", b.render(params)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({}) AS t", rendered.join(" UNION ALL ")))
            }
        }
    }
}

/// A select statement lifted out of a subquery, the third table-like input
/// shape. Produced by [`Subquery::select`] and consumed by [`union_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    query: Subquery,
}

impl SelectStatement {
    pub fn into_subquery(self) -> Subquery {
        self.query
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.query.column_names()
    }
}

/// Any table-like input accepted by public querier methods.
///
/// Normalizing through this type gives every downstream operator a single
/// expected input shape; normalizing an already-canonical subquery returns
/// it unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum TableExpr {
    Declared(DeclaredTable),
    Select(SelectStatement),
    Subquery(Subquery),
}

impl TableExpr {
    /// Normalize to the canonical subquery form. Idempotent.
    pub fn into_subquery(self) -> Subquery {
        match self {
            Self::Declared(table) => Subquery::from_table(table),
            Self::Select(select) => select.into_subquery(),
            Self::Subquery(query) => query,
        }
    }
}

impl From<DeclaredTable> for TableExpr {
    fn from(table: DeclaredTable) -> Self {
        Self::Declared(table)
    }
}

impl From<SelectStatement> for TableExpr {
    fn from(select: SelectStatement) -> Self {
        Self::Select(select)
    }
}

impl From<Subquery> for TableExpr {
    fn from(query: Subquery) -> Self {
        Self::Subquery(query)
    }
}

/// Combine select statements with UNION ALL.
///
/// Branches must agree on column names and order; the first branch supplies
/// the output schema.
pub fn union_all(branches: Vec<SelectStatement>) -> Result<Subquery> {
    let mut iter = branches.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| QueryError::invalid_argument("union of zero tables"))?
        .into_subquery();

    let expected: Vec<String> = first.column_names().iter().map(|s| s.to_string()).collect();
    let mut queries = vec![first];

    for branch in iter {
        let query = branch.into_subquery();
        let names: Vec<String> = query.column_names().iter().map(|s| s.to_string()).collect();
        if names != expected {
            return Err(QueryError::invalid_argument(format!(
                "union branches disagree on columns: expected {expected:?}, got {names:?}"
            )));
        }
        queries.push(query);
    }

    let projection = queries[0]
        .projection
        .iter()
        .map(|p| Projection::passthrough(p.alias.clone(), p.ty))
        .collect();

    Ok(Subquery {
        source: Relation::Union(queries),
        projection,
        predicate: None,
        limit: None,
    })
}

/// A rendered query: SQL text with `$n` placeholders plus the bind values,
/// ready to hand to an executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl fmt::Display for SqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}
