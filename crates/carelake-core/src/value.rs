//! Runtime values used for bind parameters and keyword arguments.

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

use crate::error::{QueryError, Result};

/// A runtime value: a bind parameter, a keyword-bundle entry, or a literal
/// in a constructed expression.
///
/// Filter values supplied by callers frequently arrive in a looser type
/// than the stored column (a `CHAR(1)` sex column filtered with a `&str`,
/// an integer-coded version filtered with strings), so values carry
/// explicit coercions rather than relying on the database to cast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(Date),
    Timestamp(PrimitiveDateTime),
    List(Vec<Value>),
    Null,
}

impl Value {
    /// Convert a scalar into a one-element list; lists pass through.
    ///
    /// `IN` conditions accept scalar or list input uniformly through this.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Value::List(values) => values,
            other => vec![other],
        }
    }

    /// Coerce to a text value.
    pub fn coerce_text(self) -> Result<Value> {
        match self {
            Value::Text(s) => Ok(Value::Text(s)),
            Value::Integer(i) => Ok(Value::Text(i.to_string())),
            Value::Float(f) => Ok(Value::Text(f.to_string())),
            Value::Boolean(b) => Ok(Value::Text(b.to_string())),
            Value::List(values) => Ok(Value::List(
                values
                    .into_iter()
                    .map(Value::coerce_text)
                    .collect::<Result<Vec<_>>>()?,
            )),
            other => Err(QueryError::invalid_argument(format!(
                "cannot coerce {other:?} to text"
            ))),
        }
    }

    /// Coerce to an integer value.
    pub fn coerce_integer(self) -> Result<Value> {
        match self {
            Value::Integer(i) => Ok(Value::Integer(i)),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| QueryError::invalid_argument(format!("'{s}' is not an integer"))),
            Value::Boolean(b) => Ok(Value::Integer(i64::from(b))),
            Value::List(values) => Ok(Value::List(
                values
                    .into_iter()
                    .map(Value::coerce_integer)
                    .collect::<Result<Vec<_>>>()?,
            )),
            other => Err(QueryError::invalid_argument(format!(
                "cannot coerce {other:?} to integer"
            ))),
        }
    }

    /// Interpret the value as a calendar date.
    ///
    /// Accepts a date, a timestamp (date part), or text in `YYYY-MM-DD`.
    pub fn as_date(&self) -> Result<Date> {
        match self {
            Value::Date(d) => Ok(*d),
            Value::Timestamp(ts) => Ok(ts.date()),
            Value::Text(s) => {
                let format = format_description!("[year]-[month]-[day]");
                Date::parse(s, &format).map_err(|_| {
                    QueryError::invalid_argument(format!("'{s}' is not a YYYY-MM-DD date"))
                })
            }
            other => Err(QueryError::invalid_argument(format!(
                "cannot interpret {other:?} as a date"
            ))),
        }
    }

    /// Interpret the value as a boolean.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(QueryError::invalid_argument(format!(
                "expected a boolean, got {other:?}"
            ))),
        }
    }

    /// Interpret the value as a non-negative row count.
    pub fn as_row_count(&self) -> Result<u64> {
        match self {
            Value::Integer(i) if *i >= 0 => Ok(*i as u64),
            other => Err(QueryError::invalid_argument(format!(
                "expected a non-negative integer, got {other:?}"
            ))),
        }
    }

    /// Interpret the value as a list of column names.
    pub fn as_column_names(&self) -> Result<Vec<String>> {
        let items = match self {
            Value::List(values) => values.clone(),
            other => vec![other.clone()],
        };
        items
            .into_iter()
            .map(|v| match v {
                Value::Text(s) => Ok(s),
                other => Err(QueryError::invalid_argument(format!(
                    "expected a column name, got {other:?}"
                ))),
            })
            .collect()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        Value::Date(value)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_scalar_into_list() {
        assert_eq!(Value::from("F").into_list(), vec![Value::from("F")]);
        assert_eq!(
            Value::from(vec![1i64, 2]).into_list(),
            vec![Value::Integer(1), Value::Integer(2)]
        );
    }

    #[test]
    fn test_coerce_text() {
        assert_eq!(
            Value::Integer(9).coerce_text().unwrap(),
            Value::Text("9".into())
        );
        assert_eq!(
            Value::from(vec![10i64, 11]).coerce_text().unwrap(),
            Value::List(vec![Value::Text("10".into()), Value::Text("11".into())])
        );
    }

    #[test]
    fn test_coerce_integer() {
        assert_eq!(
            Value::Text(" 42 ".into()).coerce_integer().unwrap(),
            Value::Integer(42)
        );
        assert!(Value::Text("abc".into()).coerce_integer().is_err());
    }

    #[test]
    fn test_as_date_from_text() {
        let d = Value::from("2015-06-30").as_date().unwrap();
        assert_eq!(d, date!(2015 - 06 - 30));
        assert!(Value::from("30/06/2015").as_date().is_err());
    }

    #[test]
    fn test_as_row_count_rejects_negative() {
        assert_eq!(Value::Integer(10).as_row_count().unwrap(), 10);
        assert!(Value::Integer(-1).as_row_count().is_err());
        assert!(Value::from("ten").as_row_count().is_err());
    }

    #[test]
    fn test_as_column_names() {
        let cols = Value::from(vec!["a", "b"]).as_column_names().unwrap();
        assert_eq!(cols, vec!["a".to_string(), "b".to_string()]);
        let single = Value::from("a").as_column_names().unwrap();
        assert_eq!(single, vec!["a".to_string()]);
    }
}
