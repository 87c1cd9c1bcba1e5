//! Declarative operation sequences with late-bound arguments.
//!
//! A recipe builds a `Vec<Operation>` in which filter values may be
//! [`QueryArg`] placeholders; [`run_pipeline`] resolves each operation
//! against the caller's [`ArgBundle`] in declared order. An operation whose
//! gating argument is absent is skipped whole; an absent optional argument
//! clears only its own slot. Resolution is all-or-nothing per operation, so
//! a skipped operation leaves no partial effect on the query.

use std::sync::Arc;

use carelake_core::{Result, Subquery, TableExpr, Value};

use crate::args::{Arg, ArgBundle, ResolvedArg};
use crate::ops::{
    ConditionAfterDate, ConditionBeforeDate, ConditionEquals, ConditionIn, ConditionInMonths,
    ConditionInYears, ConditionOpts, ConditionSubstring, FilterColumns, Limit, QueryOp,
};

#[derive(Debug, Clone)]
enum OpSpec {
    ConditionEquals { column: String, value: Arg },
    ConditionIn { column: String, values: Arg },
    ConditionSubstring { column: String, substring: Arg },
    BeforeDate { column: String, date: Arg },
    AfterDate { column: String, date: Arg },
    InYears { column: String, years: Arg },
    InMonths { column: String, months: Arg },
    Limit { rows: Arg },
    KeepColumns { columns: Arg },
    Fixed(Arc<dyn QueryOp>),
}

/// One step of a pipeline: an operator whose arguments may be deferred.
#[derive(Debug, Clone)]
pub struct Operation {
    spec: OpSpec,
    negate: Option<Arg>,
    binarize: Option<Arg>,
    to_str: bool,
    to_int: bool,
}

impl Operation {
    fn from_spec(spec: OpSpec) -> Self {
        Self {
            spec,
            negate: None,
            binarize: None,
            to_str: false,
            to_int: false,
        }
    }

    /// A concrete operator with no deferred arguments.
    pub fn op(op: impl QueryOp + 'static) -> Self {
        Self::from_spec(OpSpec::Fixed(Arc::new(op)))
    }

    pub fn condition_equals(column: impl Into<String>, value: impl Into<Arg>) -> Self {
        Self::from_spec(OpSpec::ConditionEquals {
            column: column.into(),
            value: value.into(),
        })
    }

    pub fn condition_in(column: impl Into<String>, values: impl Into<Arg>) -> Self {
        Self::from_spec(OpSpec::ConditionIn {
            column: column.into(),
            values: values.into(),
        })
    }

    pub fn condition_substring(column: impl Into<String>, substring: impl Into<Arg>) -> Self {
        Self::from_spec(OpSpec::ConditionSubstring {
            column: column.into(),
            substring: substring.into(),
        })
    }

    pub fn before_date(column: impl Into<String>, date: impl Into<Arg>) -> Self {
        Self::from_spec(OpSpec::BeforeDate {
            column: column.into(),
            date: date.into(),
        })
    }

    pub fn after_date(column: impl Into<String>, date: impl Into<Arg>) -> Self {
        Self::from_spec(OpSpec::AfterDate {
            column: column.into(),
            date: date.into(),
        })
    }

    pub fn in_years(column: impl Into<String>, years: impl Into<Arg>) -> Self {
        Self::from_spec(OpSpec::InYears {
            column: column.into(),
            years: years.into(),
        })
    }

    pub fn in_months(column: impl Into<String>, months: impl Into<Arg>) -> Self {
        Self::from_spec(OpSpec::InMonths {
            column: column.into(),
            months: months.into(),
        })
    }

    pub fn limit(rows: impl Into<Arg>) -> Self {
        Self::from_spec(OpSpec::Limit { rows: rows.into() })
    }

    pub fn keep_columns(columns: impl Into<Arg>) -> Self {
        Self::from_spec(OpSpec::KeepColumns {
            columns: columns.into(),
        })
    }

    /// Unconditionally invert the condition.
    pub fn negated(self) -> Self {
        self.negate_if(Value::Boolean(true))
    }

    /// Invert the condition when the argument resolves to true.
    pub fn negate_if(mut self, arg: impl Into<Arg>) -> Self {
        self.negate = Some(arg.into());
        self
    }

    /// Record the condition in a named boolean column instead of
    /// filtering; the name may itself be deferred.
    pub fn binarize(mut self, column: impl Into<Arg>) -> Self {
        self.binarize = Some(column.into());
        self
    }

    /// Coerce condition value(s) to text before comparing.
    pub fn to_str(mut self) -> Self {
        self.to_str = true;
        self
    }

    /// Coerce condition value(s) to integers before comparing.
    pub fn to_int(mut self) -> Self {
        self.to_int = true;
        self
    }

    fn describe(&self) -> &'static str {
        match &self.spec {
            OpSpec::ConditionEquals { .. } => "ConditionEquals",
            OpSpec::ConditionIn { .. } => "ConditionIn",
            OpSpec::ConditionSubstring { .. } => "ConditionSubstring",
            OpSpec::BeforeDate { .. } => "ConditionBeforeDate",
            OpSpec::AfterDate { .. } => "ConditionAfterDate",
            OpSpec::InYears { .. } => "ConditionInYears",
            OpSpec::InMonths { .. } => "ConditionInMonths",
            OpSpec::Limit { .. } => "Limit",
            OpSpec::KeepColumns { .. } => "FilterColumns",
            OpSpec::Fixed(op) => op.name(),
        }
    }

    /// Resolve the operation's option slots. `None` means the whole
    /// operation is gated off.
    fn resolve_opts(&self, bundle: &ArgBundle) -> Result<Option<ConditionOpts>> {
        let mut opts = ConditionOpts {
            to_str: self.to_str,
            to_int: self.to_int,
            ..ConditionOpts::default()
        };

        if let Some(arg) = &self.negate {
            match arg.resolve(bundle)? {
                ResolvedArg::Value(value) => opts.negate = value.as_bool()?,
                ResolvedArg::Unset => {}
                ResolvedArg::SkipOp => return Ok(None),
            }
        }

        if let Some(arg) = &self.binarize {
            match arg.resolve(bundle)? {
                ResolvedArg::Value(value) => {
                    opts.binarize_col = Some(match value {
                        Value::Text(name) => name,
                        other => {
                            return Err(carelake_core::QueryError::invalid_argument(format!(
                                "binarize column name must be text, got {other:?}"
                            )));
                        }
                    });
                }
                ResolvedArg::Unset => {}
                ResolvedArg::SkipOp => return Ok(None),
            }
        }

        Ok(Some(opts))
    }

    /// Resolve into a concrete operator, or `None` when a gating argument
    /// is absent.
    fn build(&self, bundle: &ArgBundle) -> Result<Option<Arc<dyn QueryOp>>> {
        let Some(opts) = self.resolve_opts(bundle)? else {
            return Ok(None);
        };

        // A value slot left unset also gates the operation off; there is
        // nothing to filter on without it.
        macro_rules! resolve_value {
            ($arg:expr) => {
                match $arg.resolve(bundle)? {
                    ResolvedArg::Value(value) => value,
                    ResolvedArg::Unset | ResolvedArg::SkipOp => return Ok(None),
                }
            };
        }

        let op: Arc<dyn QueryOp> = match &self.spec {
            OpSpec::ConditionEquals { column, value } => {
                let value = resolve_value!(value);
                Arc::new(ConditionEquals::new(column.clone(), value).with_opts(opts))
            }
            OpSpec::ConditionIn { column, values } => {
                let values = resolve_value!(values);
                Arc::new(ConditionIn::new(column.clone(), values).with_opts(opts))
            }
            OpSpec::ConditionSubstring { column, substring } => {
                let substring = resolve_value!(substring);
                Arc::new(ConditionSubstring::new(column.clone(), substring).with_opts(opts))
            }
            OpSpec::BeforeDate { column, date } => {
                let date = resolve_value!(date);
                Arc::new(ConditionBeforeDate::new(column.clone(), date).with_opts(opts))
            }
            OpSpec::AfterDate { column, date } => {
                let date = resolve_value!(date);
                Arc::new(ConditionAfterDate::new(column.clone(), date).with_opts(opts))
            }
            OpSpec::InYears { column, years } => {
                let years = resolve_value!(years);
                Arc::new(ConditionInYears::new(column.clone(), years).with_opts(opts))
            }
            OpSpec::InMonths { column, months } => {
                let months = resolve_value!(months);
                Arc::new(ConditionInMonths::new(column.clone(), months).with_opts(opts))
            }
            OpSpec::Limit { rows } => {
                let rows = resolve_value!(rows).as_row_count()?;
                Arc::new(Limit::new(rows))
            }
            OpSpec::KeepColumns { columns } => {
                let columns = resolve_value!(columns).as_column_names()?;
                Arc::new(FilterColumns::new(columns))
            }
            OpSpec::Fixed(op) => op.clone(),
        };

        Ok(Some(op))
    }
}

/// Apply a sequence of operations to a table in declared order.
///
/// The input is normalized to the canonical subquery form first. Building
/// is deterministic: the same table, operations, and bundle always produce
/// the same query.
pub fn run_pipeline(
    table: impl Into<TableExpr>,
    operations: &[Operation],
    bundle: &ArgBundle,
) -> Result<Subquery> {
    let mut table = table.into().into_subquery();
    for operation in operations {
        match operation.build(bundle)? {
            Some(op) => {
                table = op.apply(table)?;
            }
            None => {
                tracing::debug!(op = operation.describe(), "skipping gated operation");
            }
        }
    }
    Ok(table)
}
