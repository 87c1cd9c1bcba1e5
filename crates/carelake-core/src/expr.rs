//! Column expressions and predicates.
//!
//! Expressions render to SQL text while accumulating bind parameters into
//! a shared params vector, so user-supplied values never appear inline.

use crate::error::{QueryError, Result};
use crate::schema::SqlType;
use crate::value::Value;

/// Comparison operators for predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }
}

/// Arithmetic operators for derived columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

/// Timestamp component referenced by EXTRACT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Year,
    Month,
    Day,
    Hour,
}

impl DateField {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Year => "YEAR",
            Self::Month => "MONTH",
            Self::Day => "DAY",
            Self::Hour => "HOUR",
        }
    }

    /// Parse the short names recipe code uses.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "year" => Ok(Self::Year),
            "month" => Ok(Self::Month),
            "day" => Ok(Self::Day),
            "hour" => Ok(Self::Hour),
            other => Err(QueryError::invalid_argument(format!(
                "unknown timestamp component '{other}'"
            ))),
        }
    }
}

/// A per-row interval added to timestamp columns, built from offset
/// columns or constants. Used to re-anchor de-identified dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateDelta {
    pub years: Option<Expr>,
    pub months: Option<Expr>,
    pub days: Option<Expr>,
    pub hours: Option<Expr>,
}

impl DateDelta {
    pub fn is_empty(&self) -> bool {
        self.years.is_none() && self.months.is_none() && self.days.is_none() && self.hours.is_none()
    }

    fn terms(&self) -> Vec<(&'static str, &Expr)> {
        let mut terms = Vec::new();
        if let Some(e) = &self.years {
            terms.push(("years", e));
        }
        if let Some(e) = &self.months {
            terms.push(("months", e));
        }
        if let Some(e) = &self.days {
            terms.push(("days", e));
        }
        if let Some(e) = &self.hours {
            terms.push(("hours", e));
        }
        terms
    }
}

/// A column expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a column of the input relation, optionally qualified
    /// with a join-side alias.
    Column {
        qualifier: Option<String>,
        name: String,
    },

    /// A bind parameter carrying a runtime value.
    Bind(Value),

    /// An inline structural constant (never user input).
    Literal(Value),

    /// CAST(expr AS type)
    Cast { expr: Box<Expr>, ty: SqlType },

    /// Binary arithmetic between two expressions.
    Arith {
        left: Box<Expr>,
        op: ArithOp,
        right: Box<Expr>,
    },

    /// A named SQL function call.
    Func { name: String, args: Vec<Expr> },

    /// EXTRACT(field FROM expr), cast to INTEGER.
    Extract { field: DateField, expr: Box<Expr> },

    /// Timestamp shifted by a per-row interval.
    ShiftDate { expr: Box<Expr>, delta: Box<DateDelta> },

    /// A predicate used as a boolean column expression.
    Bool(Box<Predicate>),
}

impl Expr {
    /// Unqualified column reference.
    pub fn col(name: impl Into<String>) -> Self {
        Self::Column {
            qualifier: None,
            name: name.into(),
        }
    }

    /// Column reference qualified with a join-side alias.
    pub fn qualified_col(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Column {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    pub fn bind(value: impl Into<Value>) -> Self {
        Self::Bind(value.into())
    }

    pub fn cast(self, ty: SqlType) -> Self {
        Self::Cast {
            expr: Box::new(self),
            ty,
        }
    }

    pub fn add(self, other: Expr) -> Self {
        Self::Arith {
            left: Box::new(self),
            op: ArithOp::Add,
            right: Box::new(other),
        }
    }

    pub fn sub(self, other: Expr) -> Self {
        Self::Arith {
            left: Box::new(self),
            op: ArithOp::Sub,
            right: Box::new(other),
        }
    }

    pub fn div(self, other: Expr) -> Self {
        Self::Arith {
            left: Box::new(self),
            op: ArithOp::Div,
            right: Box::new(other),
        }
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Func {
            name: name.into(),
            args,
        }
    }

    pub fn extract(field: DateField, expr: Expr) -> Self {
        Self::Extract {
            field,
            expr: Box::new(expr),
        }
    }

    /// Render to SQL, pushing bind values onto `params`.
    pub fn render(&self, params: &mut Vec<Value>) -> Result<String> {
        match self {
            Self::Column { qualifier, name } => Ok(match qualifier {
                Some(q) => format!("{q}.{name}"),
                None => name.clone(),
            }),
            Self::Bind(value) => {
                params.push(value.clone());
                Ok(format!("${}", params.len()))
            }
            Self::Literal(value) => render_literal(value),
            Self::Cast { expr, ty } => {
                let inner = expr.render(params)?;
                Ok(format!("CAST({inner} AS {})", ty.as_sql()))
            }
            Self::Arith { left, op, right } => {
                let l = left.render(params)?;
                let r = right.render(params)?;
                Ok(format!("({l} {} {r})", op.as_sql()))
            }
            Self::Func { name, args } => {
                let rendered = args
                    .iter()
                    .map(|a| a.render(params))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("{name}({})", rendered.join(", ")))
            }
            Self::Extract { field, expr } => {
                let inner = expr.render(params)?;
                Ok(format!(
                    "CAST(EXTRACT({} FROM {inner}) AS INTEGER)",
                    field.as_sql()
                ))
            }
            Self::ShiftDate { expr, delta } => {
                let inner = expr.render(params)?;
                if delta.is_empty() {
                    return Ok(inner);
                }
                let terms = delta
                    .terms()
                    .into_iter()
                    .map(|(unit, e)| Ok(format!("{unit} => CAST({} AS INTEGER)", e.render(params)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({inner} + make_interval({}))", terms.join(", ")))
            }
            Self::Bool(pred) => {
                let inner = pred.render(params)?;
                Ok(format!("({inner})"))
            }
        }
    }
}

fn render_literal(value: &Value) -> Result<String> {
    match value {
        Value::Integer(i) => Ok(i.to_string()),
        Value::Text(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        other => Err(QueryError::invalid_argument(format!(
            "only integer and text literals render inline, got {other:?}"
        ))),
    }
}

/// A row filter that can be combined with other filters.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// left op right
    Compare {
        left: Expr,
        op: CompareOp,
        right: Expr,
    },

    /// expr IN (list)
    In { expr: Expr, list: Vec<Expr> },

    /// LIKE pattern match, optionally case-insensitive.
    Like {
        expr: Expr,
        pattern: Expr,
        case_insensitive: bool,
    },

    /// IS NULL check.
    IsNull(Expr),

    /// Negation of a predicate.
    Not(Box<Predicate>),

    /// Combine predicates with AND.
    And(Vec<Predicate>),

    /// Combine predicates with OR.
    Or(Vec<Predicate>),

    /// Always true (empty AND).
    True,

    /// Always false (empty OR).
    False,
}

impl Predicate {
    pub fn compare(left: Expr, op: CompareOp, right: Expr) -> Self {
        Self::Compare { left, op, right }
    }

    pub fn is_in(expr: Expr, list: Vec<Expr>) -> Self {
        Self::In { expr, list }
    }

    /// Create an AND condition, collapsing trivial cases.
    pub fn and(mut conditions: Vec<Predicate>) -> Self {
        if conditions.is_empty() {
            Self::True
        } else if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Self::And(conditions)
        }
    }

    /// Create an OR condition, collapsing trivial cases.
    pub fn or(mut conditions: Vec<Predicate>) -> Self {
        if conditions.is_empty() {
            Self::False
        } else if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Self::Or(conditions)
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Render to SQL, pushing bind values onto `params`.
    pub fn render(&self, params: &mut Vec<Value>) -> Result<String> {
        match self {
            Self::Compare { left, op, right } => {
                let l = left.render(params)?;
                let r = right.render(params)?;
                Ok(format!("({l} {} {r})", op.as_sql()))
            }
            Self::In { expr, list } => {
                if list.is_empty() {
                    return Ok("FALSE".to_string());
                }
                let target = expr.render(params)?;
                let rendered = list
                    .iter()
                    .map(|e| e.render(params))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({target} IN ({}))", rendered.join(", ")))
            }
            Self::Like {
                expr,
                pattern,
                case_insensitive,
            } => {
                let target = expr.render(params)?;
                let pat = pattern.render(params)?;
                if *case_insensitive {
                    Ok(format!("(LOWER({target}) LIKE LOWER({pat}))"))
                } else {
                    Ok(format!("({target} LIKE {pat})"))
                }
            }
            Self::IsNull(expr) => {
                let target = expr.render(params)?;
                Ok(format!("({target} IS NULL)"))
            }
            Self::Not(inner) => {
                let rendered = inner.render(params)?;
                Ok(format!("(NOT {rendered})"))
            }
            Self::And(conditions) => {
                if conditions.is_empty() {
                    return Ok("TRUE".to_string());
                }
                let parts = conditions
                    .iter()
                    .map(|c| c.render(params))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({})", parts.join(" AND ")))
            }
            Self::Or(conditions) => {
                if conditions.is_empty() {
                    return Ok("FALSE".to_string());
                }
                let parts = conditions
                    .iter()
                    .map(|c| c.render(params))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({})", parts.join(" OR ")))
            }
            Self::True => Ok("TRUE".to_string()),
            Self::False => Ok("FALSE".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_compare_with_bind() {
        let mut params = Vec::new();
        let pred = Predicate::compare(Expr::col("sex"), CompareOp::Eq, Expr::bind("F"));
        assert_eq!(pred.render(&mut params).unwrap(), "(sex = $1)");
        assert_eq!(params, vec![Value::Text("F".into())]);
    }

    #[test]
    fn test_render_in_list_numbers_binds_in_order() {
        let mut params = Vec::new();
        let pred = Predicate::is_in(Expr::col("icd_version"), vec![Expr::bind(9), Expr::bind(10)]);
        assert_eq!(
            pred.render(&mut params).unwrap(),
            "(icd_version IN ($1, $2))"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_render_empty_in_is_false() {
        let mut params = Vec::new();
        let pred = Predicate::is_in(Expr::col("x"), vec![]);
        assert_eq!(pred.render(&mut params).unwrap(), "FALSE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_render_case_insensitive_like() {
        let mut params = Vec::new();
        let pred = Predicate::Like {
            expr: Expr::col("event_name"),
            pattern: Expr::bind("%glucose%"),
            case_insensitive: true,
        };
        assert_eq!(
            pred.render(&mut params).unwrap(),
            "(LOWER(event_name) LIKE LOWER($1))"
        );
    }

    #[test]
    fn test_and_or_collapse() {
        assert_eq!(Predicate::and(vec![]), Predicate::True);
        assert_eq!(Predicate::or(vec![]), Predicate::False);
        let single = Predicate::and(vec![Predicate::IsNull(Expr::col("x"))]);
        assert_eq!(single, Predicate::IsNull(Expr::col("x")));
    }

    #[test]
    fn test_render_extract() {
        let mut params = Vec::new();
        let expr = Expr::extract(DateField::Year, Expr::col("admit_timestamp"));
        assert_eq!(
            expr.render(&mut params).unwrap(),
            "CAST(EXTRACT(YEAR FROM admit_timestamp) AS INTEGER)"
        );
    }

    #[test]
    fn test_render_shift_date() {
        let mut params = Vec::new();
        let expr = Expr::ShiftDate {
            expr: Box::new(Expr::col("dod")),
            delta: Box::new(DateDelta {
                years: Some(Expr::col("anchor_year_difference")),
                ..DateDelta::default()
            }),
        };
        assert_eq!(
            expr.render(&mut params).unwrap(),
            "(dod + make_interval(years => CAST(anchor_year_difference AS INTEGER)))"
        );
    }

    #[test]
    fn test_inline_text_literal_is_escaped() {
        let mut params = Vec::new();
        let expr = Expr::Literal(Value::Text("o'brien".into()));
        assert_eq!(expr.render(&mut params).unwrap(), "'o''brien'");
        assert!(params.is_empty());
    }

    #[test]
    fn test_substr_func_with_literals() {
        let mut params = Vec::new();
        let expr = Expr::func(
            "SUBSTR",
            vec![
                Expr::col("anchor_year_group"),
                Expr::Literal(Value::Integer(1)),
                Expr::Literal(Value::Integer(4)),
            ],
        )
        .cast(SqlType::Integer);
        assert_eq!(
            expr.render(&mut params).unwrap(),
            "CAST(SUBSTR(anchor_year_group, 1, 4) AS INTEGER)"
        );
    }
}
