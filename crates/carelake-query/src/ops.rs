//! The table operator algebra.
//!
//! Each operator is a stateless, reusable value implementing [`QueryOp`]:
//! it takes a canonical [`Subquery`] and returns a new one, never mutating
//! its input. Operators validate the columns they touch before
//! transforming, so a bad recipe fails with a named column and operator
//! instead of a deep SQL-generation error.
//!
//! Filter operators share [`ConditionOpts`]: negation, value coercion
//! (`to_str` / `to_int`), and `binarize` mode, which records the condition
//! as a boolean column instead of filtering rows.

use std::fmt;

use indexmap::IndexMap;

use carelake_core::expr::{DateDelta, Expr, Predicate};
use carelake_core::{
    CompareOp, DateField, JoinPair, Projection, QueryError, Relation, Result, SqlType, Subquery,
    TableExpr, Value,
};

use crate::validate::assert_has_columns;

/// A stateless table-to-table transformation primitive.
pub trait QueryOp: fmt::Debug + Send + Sync {
    /// Operator name used in error messages.
    fn name(&self) -> &'static str;

    /// Apply the transformation, producing a new table handle.
    fn apply(&self, table: Subquery) -> Result<Subquery>;
}

/// One or more column names, accepted as a scalar or a list.
#[derive(Debug, Clone)]
pub struct Columns(Vec<String>);

impl Columns {
    pub fn names(&self) -> &[String] {
        &self.0
    }

    fn as_strs(&self) -> Vec<&str> {
        self.0.iter().map(String::as_str).collect()
    }
}

impl From<&str> for Columns {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl From<String> for Columns {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl From<Vec<&str>> for Columns {
    fn from(names: Vec<&str>) -> Self {
        Self(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for Columns {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

/// Join-key specification: one or more pairs, with same-name shorthand.
#[derive(Debug, Clone)]
pub struct JoinOn(Vec<JoinPair>);

impl From<&str> for JoinOn {
    fn from(name: &str) -> Self {
        Self(vec![JoinPair::same(name)])
    }
}

impl From<(&str, &str)> for JoinOn {
    fn from((left, right): (&str, &str)) -> Self {
        Self(vec![JoinPair::between(left, right)])
    }
}

impl From<Vec<&str>> for JoinOn {
    fn from(names: Vec<&str>) -> Self {
        Self(names.into_iter().map(JoinPair::same).collect())
    }
}

impl From<Vec<(&str, &str)>> for JoinOn {
    fn from(pairs: Vec<(&str, &str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(l, r)| JoinPair::between(l, r))
                .collect(),
        )
    }
}

// ============================================================================
// Column shaping
// ============================================================================

/// Map column names `{old: new}`.
#[derive(Debug, Clone)]
pub struct Rename {
    map: IndexMap<String, String>,
    check_exists: bool,
}

impl Rename {
    pub fn new<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            map: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            check_exists: true,
        }
    }

    /// Silently skip map entries whose source column is absent. Used when
    /// standardizing catalog column names across tables that each carry
    /// only a subset of the mapped columns.
    pub fn lenient<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            check_exists: false,
            ..Self::new(pairs)
        }
    }
}

impl QueryOp for Rename {
    fn name(&self) -> &'static str {
        "Rename"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        if self.check_exists {
            for old in self.map.keys() {
                if !table.has_column(old) {
                    return Err(QueryError::unknown_column(old));
                }
            }
        }

        let mut table = table.wrap();
        for projection in &mut table.projection {
            if let Some(new) = self.map.get(&projection.alias) {
                projection.alias = new.clone();
            }
        }
        Ok(table)
    }
}

/// Remove the named columns.
#[derive(Debug, Clone)]
pub struct Drop {
    columns: Columns,
}

impl Drop {
    pub fn new(columns: impl Into<Columns>) -> Self {
        Self {
            columns: columns.into(),
        }
    }
}

impl QueryOp for Drop {
    fn name(&self) -> &'static str {
        "Drop"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &self.columns.as_strs(), self.name())?;
        let mut table = table.wrap();
        table
            .projection
            .retain(|p| !self.columns.names().contains(&p.alias));
        Ok(table)
    }
}

/// Restrict to the named columns, in the requested order.
#[derive(Debug, Clone)]
pub struct FilterColumns {
    columns: Columns,
}

impl FilterColumns {
    pub fn new(columns: impl Into<Columns>) -> Self {
        Self {
            columns: columns.into(),
        }
    }
}

impl QueryOp for FilterColumns {
    fn name(&self) -> &'static str {
        "FilterColumns"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &self.columns.as_strs(), self.name())?;
        let mut table = table.wrap();
        table.projection = self
            .columns
            .names()
            .iter()
            .map(|name| {
                let ty = table.column_type(name).unwrap_or(SqlType::Text);
                Projection::passthrough(name.clone(), ty)
            })
            .collect();
        Ok(table)
    }
}

/// Reorder columns; the requested names must be a permutation of the
/// table's columns. Row content is unchanged.
#[derive(Debug, Clone)]
pub struct Reorder {
    columns: Columns,
}

impl Reorder {
    pub fn new(columns: impl Into<Columns>) -> Self {
        Self {
            columns: columns.into(),
        }
    }
}

impl QueryOp for Reorder {
    fn name(&self) -> &'static str {
        "Reorder"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &self.columns.as_strs(), self.name())?;
        if self.columns.names().len() != table.projection.len() {
            return Err(QueryError::invalid_argument(format!(
                "Reorder must name every column exactly once: got {:?}, table has {:?}",
                self.columns.names(),
                table.column_names()
            )));
        }
        FilterColumns::new(self.columns.clone()).apply(table)
    }
}

/// Move the named columns to sit directly after another column.
#[derive(Debug, Clone)]
pub struct ReorderAfter {
    columns: Columns,
    after: String,
}

impl ReorderAfter {
    pub fn new(columns: impl Into<Columns>, after: impl Into<String>) -> Self {
        Self {
            columns: columns.into(),
            after: after.into(),
        }
    }
}

impl QueryOp for ReorderAfter {
    fn name(&self) -> &'static str {
        "ReorderAfter"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        let mut required = self.columns.as_strs();
        required.push(self.after.as_str());
        assert_has_columns(&table, &required, self.name())?;

        let mut table = table.wrap();
        let moved: Vec<Projection> = table
            .projection
            .iter()
            .filter(|p| self.columns.names().contains(&p.alias))
            .cloned()
            .collect();
        table
            .projection
            .retain(|p| !self.columns.names().contains(&p.alias));
        // Position recomputed after removal; `after` itself is never moved.
        let anchor = table
            .column_position(&self.after)
            .ok_or_else(|| QueryError::missing_column(&self.after, self.name()))?;
        for (offset, projection) in moved.into_iter().enumerate() {
            table.projection.insert(anchor + 1 + offset, projection);
        }
        Ok(table)
    }
}

// ============================================================================
// Joins
// ============================================================================

/// Join another table onto the input on one or more column pairs.
///
/// The input table is the left side. Right-side columns whose names collide
/// with retained left-side columns (join keys included) are not duplicated.
#[derive(Debug, Clone)]
pub struct Join {
    right: Subquery,
    on: Vec<JoinPair>,
    coerce: Option<SqlType>,
    include_cols: Option<Columns>,
    outer: bool,
}

impl Join {
    pub fn new(right: impl Into<TableExpr>, on: impl Into<JoinOn>) -> Self {
        Self {
            right: right.into().into_subquery(),
            on: on.into().0,
            coerce: None,
            include_cols: None,
            outer: false,
        }
    }

    /// Cast both sides of every join key to the given type before
    /// comparing, for keys stored under differing types.
    pub fn coerce(mut self, ty: SqlType) -> Self {
        self.coerce = Some(ty);
        self
    }

    /// Include only the named right-side columns in the output.
    pub fn columns(mut self, columns: impl Into<Columns>) -> Self {
        self.include_cols = Some(columns.into());
        self
    }

    /// Left-outer instead of inner join.
    pub fn left_outer(mut self) -> Self {
        self.outer = true;
        self
    }
}

impl QueryOp for Join {
    fn name(&self) -> &'static str {
        "Join"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        let left_keys: Vec<&str> = self.on.iter().map(|p| p.left.as_str()).collect();
        let right_keys: Vec<&str> = self.on.iter().map(|p| p.right.as_str()).collect();
        assert_has_columns(&table, &left_keys, "Join (left table)")?;
        assert_has_columns(&self.right, &right_keys, "Join (right table)")?;
        if let Some(cols) = &self.include_cols {
            assert_has_columns(&self.right, &cols.as_strs(), "Join (right table)")?;
        }

        let mut projection: Vec<Projection> = table
            .projection
            .iter()
            .map(|p| Projection::new(Expr::qualified_col("l", &p.alias), p.alias.clone(), p.ty))
            .collect();

        let wanted: Vec<String> = match &self.include_cols {
            Some(cols) => cols.names().to_vec(),
            None => self.right.column_names().iter().map(|s| s.to_string()).collect(),
        };
        for name in wanted {
            if projection.iter().any(|p| p.alias == name) {
                continue;
            }
            let ty = self.right.column_type(&name).unwrap_or(SqlType::Text);
            projection.push(Projection::new(Expr::qualified_col("r", &name), name, ty));
        }

        Ok(Subquery {
            source: Relation::Join {
                left: Box::new(table),
                right: Box::new(self.right.clone()),
                on: self.on.clone(),
                coerce: self.coerce,
                outer: self.outer,
            },
            projection,
            predicate: None,
            limit: None,
        })
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Shared options of the condition family.
#[derive(Debug, Clone, Default)]
pub struct ConditionOpts {
    pub negate: bool,
    pub binarize_col: Option<String>,
    pub to_str: bool,
    pub to_int: bool,
}

impl ConditionOpts {
    fn coerce(&self, value: Value) -> Result<Value> {
        if self.to_str {
            value.coerce_text()
        } else if self.to_int {
            value.coerce_integer()
        } else {
            Ok(value)
        }
    }
}

/// Apply a built condition: filter rows, or record the outcome as a
/// boolean column when `binarize_col` is set (row count unchanged).
fn apply_condition(
    table: Subquery,
    predicate: Predicate,
    opts: &ConditionOpts,
    op_name: &'static str,
) -> Result<Subquery> {
    let predicate = if opts.negate {
        predicate.negate()
    } else {
        predicate
    };

    match &opts.binarize_col {
        Some(column) => {
            if table.has_column(column) {
                return Err(QueryError::invalid_argument(format!(
                    "{op_name}: binarize column '{column}' already exists"
                )));
            }
            let mut table = table.wrap();
            table.projection.push(Projection::new(
                Expr::Bool(Box::new(predicate)),
                column.clone(),
                SqlType::Boolean,
            ));
            Ok(table)
        }
        None => {
            let mut table = table.wrap();
            table.predicate = Some(predicate);
            Ok(table)
        }
    }
}

macro_rules! condition_builders {
    () => {
        /// Invert the condition.
        pub fn negated(mut self) -> Self {
            self.opts.negate = true;
            self
        }

        /// Record the outcome in a boolean column instead of filtering.
        pub fn binarize(mut self, column: impl Into<String>) -> Self {
            self.opts.binarize_col = Some(column.into());
            self
        }

        /// Coerce the comparison value(s) to text first.
        pub fn to_str(mut self) -> Self {
            self.opts.to_str = true;
            self
        }

        /// Coerce the comparison value(s) to integers first.
        pub fn to_int(mut self) -> Self {
            self.opts.to_int = true;
            self
        }

        pub(crate) fn with_opts(mut self, opts: ConditionOpts) -> Self {
            self.opts = opts;
            self
        }
    };
}

/// Keep rows where a column equals a value.
#[derive(Debug, Clone)]
pub struct ConditionEquals {
    column: String,
    value: Value,
    opts: ConditionOpts,
}

impl ConditionEquals {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            opts: ConditionOpts::default(),
        }
    }

    condition_builders!();
}

impl QueryOp for ConditionEquals {
    fn name(&self) -> &'static str {
        "ConditionEquals"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &[&self.column], self.name())?;
        let value = self.opts.coerce(self.value.clone())?;
        let predicate = Predicate::compare(
            Expr::col(&self.column),
            CompareOp::Eq,
            Expr::Bind(value),
        );
        apply_condition(table, predicate, &self.opts, self.name())
    }
}

/// Keep rows where a column is in a value set. Scalar and list input are
/// accepted uniformly.
#[derive(Debug, Clone)]
pub struct ConditionIn {
    column: String,
    values: Value,
    opts: ConditionOpts,
}

impl ConditionIn {
    pub fn new(column: impl Into<String>, values: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            values: values.into(),
            opts: ConditionOpts::default(),
        }
    }

    condition_builders!();
}

impl QueryOp for ConditionIn {
    fn name(&self) -> &'static str {
        "ConditionIn"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &[&self.column], self.name())?;
        let list = self
            .values
            .clone()
            .into_list()
            .into_iter()
            .map(|v| Ok(Expr::Bind(self.opts.coerce(v)?)))
            .collect::<Result<Vec<_>>>()?;
        let predicate = Predicate::is_in(Expr::col(&self.column), list);
        apply_condition(table, predicate, &self.opts, self.name())
    }
}

/// Keep rows where a string column contains a substring
/// (case-insensitive).
#[derive(Debug, Clone)]
pub struct ConditionSubstring {
    column: String,
    substring: Value,
    opts: ConditionOpts,
}

impl ConditionSubstring {
    pub fn new(column: impl Into<String>, substring: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            substring: substring.into(),
            opts: ConditionOpts::default(),
        }
    }

    condition_builders!();
}

impl QueryOp for ConditionSubstring {
    fn name(&self) -> &'static str {
        "ConditionSubstring"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &[&self.column], self.name())?;
        let text = match self.opts.coerce(self.substring.clone())?.coerce_text()? {
            Value::Text(s) => s,
            other => {
                return Err(QueryError::invalid_argument(format!(
                    "{}: expected a single substring, got {other:?}",
                    self.name()
                )));
            }
        };
        let predicate = Predicate::Like {
            expr: Expr::col(&self.column),
            pattern: Expr::bind(format!("%{text}%")),
            case_insensitive: true,
        };
        apply_condition(table, predicate, &self.opts, self.name())
    }
}

/// Keep rows where a timestamp column falls on or before a date.
#[derive(Debug, Clone)]
pub struct ConditionBeforeDate {
    column: String,
    date: Value,
    opts: ConditionOpts,
}

impl ConditionBeforeDate {
    pub fn new(column: impl Into<String>, date: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            date: date.into(),
            opts: ConditionOpts::default(),
        }
    }

    condition_builders!();
}

impl QueryOp for ConditionBeforeDate {
    fn name(&self) -> &'static str {
        "ConditionBeforeDate"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &[&self.column], self.name())?;
        let date = self.date.as_date()?;
        let predicate = Predicate::compare(
            Expr::col(&self.column),
            CompareOp::Le,
            Expr::Bind(Value::Date(date)),
        );
        apply_condition(table, predicate, &self.opts, self.name())
    }
}

/// Keep rows where a timestamp column falls on or after a date.
#[derive(Debug, Clone)]
pub struct ConditionAfterDate {
    column: String,
    date: Value,
    opts: ConditionOpts,
}

impl ConditionAfterDate {
    pub fn new(column: impl Into<String>, date: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            date: date.into(),
            opts: ConditionOpts::default(),
        }
    }

    condition_builders!();
}

impl QueryOp for ConditionAfterDate {
    fn name(&self) -> &'static str {
        "ConditionAfterDate"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &[&self.column], self.name())?;
        let date = self.date.as_date()?;
        let predicate = Predicate::compare(
            Expr::col(&self.column),
            CompareOp::Ge,
            Expr::Bind(Value::Date(date)),
        );
        apply_condition(table, predicate, &self.opts, self.name())
    }
}

/// Keep rows whose timestamp falls in the given year(s).
#[derive(Debug, Clone)]
pub struct ConditionInYears {
    column: String,
    years: Value,
    opts: ConditionOpts,
}

impl ConditionInYears {
    pub fn new(column: impl Into<String>, years: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            years: years.into(),
            opts: ConditionOpts::default(),
        }
    }

    condition_builders!();
}

impl QueryOp for ConditionInYears {
    fn name(&self) -> &'static str {
        "ConditionInYears"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &[&self.column], self.name())?;
        let predicate = timestamp_component_in(&self.column, DateField::Year, &self.years)?;
        apply_condition(table, predicate, &self.opts, self.name())
    }
}

/// Keep rows whose timestamp falls in the given month(s).
#[derive(Debug, Clone)]
pub struct ConditionInMonths {
    column: String,
    months: Value,
    opts: ConditionOpts,
}

impl ConditionInMonths {
    pub fn new(column: impl Into<String>, months: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            months: months.into(),
            opts: ConditionOpts::default(),
        }
    }

    condition_builders!();
}

impl QueryOp for ConditionInMonths {
    fn name(&self) -> &'static str {
        "ConditionInMonths"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &[&self.column], self.name())?;
        let predicate = timestamp_component_in(&self.column, DateField::Month, &self.months)?;
        apply_condition(table, predicate, &self.opts, self.name())
    }
}

fn timestamp_component_in(column: &str, field: DateField, values: &Value) -> Result<Predicate> {
    let list = values
        .clone()
        .into_list()
        .into_iter()
        .map(|v| Ok(Expr::Bind(v.coerce_integer()?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Predicate::is_in(
        Expr::extract(field, Expr::col(column)),
        list,
    ))
}

/// Filter out rows where any of the named columns is null.
#[derive(Debug, Clone)]
pub struct DropNulls {
    columns: Columns,
}

impl DropNulls {
    pub fn new(columns: impl Into<Columns>) -> Self {
        Self {
            columns: columns.into(),
        }
    }
}

impl QueryOp for DropNulls {
    fn name(&self) -> &'static str {
        "DropNulls"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &self.columns.as_strs(), self.name())?;
        let conditions = self
            .columns
            .names()
            .iter()
            .map(|name| Predicate::IsNull(Expr::col(name)).negate())
            .collect();
        let mut table = table.wrap();
        table.predicate = Some(Predicate::and(conditions));
        Ok(table)
    }
}

// ============================================================================
// Column derivation
// ============================================================================

/// Change the declared SQL type of one or more columns.
#[derive(Debug, Clone)]
pub struct Cast {
    columns: Columns,
    ty: SqlType,
}

impl Cast {
    pub fn new(columns: impl Into<Columns>, ty: SqlType) -> Self {
        Self {
            columns: columns.into(),
            ty,
        }
    }
}

impl QueryOp for Cast {
    fn name(&self) -> &'static str {
        "Cast"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &self.columns.as_strs(), self.name())?;
        let mut table = table.wrap();
        for projection in &mut table.projection {
            if self.columns.names().contains(&projection.alias) {
                projection.expr = Expr::col(&projection.alias).cast(self.ty);
                projection.ty = self.ty;
            }
        }
        Ok(table)
    }
}

/// Append a constant-valued column to every row, e.g. to tag the source
/// table of each union branch.
#[derive(Debug, Clone)]
pub struct Literal {
    value: Value,
    column: String,
}

impl Literal {
    pub fn new(value: impl Into<Value>, column: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            column: column.into(),
        }
    }
}

impl QueryOp for Literal {
    fn name(&self) -> &'static str {
        "Literal"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        if table.has_column(&self.column) {
            return Err(QueryError::invalid_argument(format!(
                "Literal: column '{}' already exists",
                self.column
            )));
        }
        let ty = value_type(&self.value)?;
        let mut table = table.wrap();
        table.projection.push(Projection::new(
            Expr::Bind(self.value.clone()),
            self.column.clone(),
            ty,
        ));
        Ok(table)
    }
}

fn value_type(value: &Value) -> Result<SqlType> {
    match value {
        Value::Text(_) => Ok(SqlType::Text),
        Value::Integer(_) => Ok(SqlType::Integer),
        Value::Float(_) => Ok(SqlType::Float),
        Value::Boolean(_) => Ok(SqlType::Boolean),
        Value::Date(_) => Ok(SqlType::Date),
        Value::Timestamp(_) => Ok(SqlType::Timestamp),
        other => Err(QueryError::invalid_argument(format!(
            "no SQL type for {other:?}"
        ))),
    }
}

/// Add one column to another, in place or as a new labelled column.
#[derive(Debug, Clone)]
pub struct AddColumn {
    column: String,
    other: String,
    negative: bool,
    label: Option<String>,
}

impl AddColumn {
    pub fn new(column: impl Into<String>, other: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            other: other.into(),
            negative: false,
            label: None,
        }
    }

    /// Subtract instead of add.
    pub fn negative(mut self) -> Self {
        self.negative = true;
        self
    }

    /// Store the result as a new column instead of replacing `column`.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl QueryOp for AddColumn {
    fn name(&self) -> &'static str {
        "AddColumn"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &[&self.column, &self.other], self.name())?;
        let left = Expr::col(&self.column);
        let right = Expr::col(&self.other);
        let expr = if self.negative {
            left.sub(right)
        } else {
            left.add(right)
        };
        let ty = table.column_type(&self.column).unwrap_or(SqlType::Integer);

        let mut table = table.wrap();
        match &self.label {
            Some(label) => {
                if table.has_column(label) {
                    return Err(QueryError::invalid_argument(format!(
                        "AddColumn: column '{label}' already exists"
                    )));
                }
                table
                    .projection
                    .push(Projection::new(expr, label.clone(), ty));
            }
            None => {
                for projection in &mut table.projection {
                    if projection.alias == self.column {
                        projection.expr = expr.clone();
                    }
                }
            }
        }
        Ok(table)
    }
}

/// Shift a set of timestamp columns by per-row offset columns, keeping the
/// shift consistent across a record. Used to re-anchor de-identified
/// dates.
#[derive(Debug, Clone, Default)]
pub struct AddDeltaColumns {
    columns: Vec<String>,
    years: Option<String>,
    months: Option<String>,
    days: Option<String>,
    hours: Option<String>,
}

impl AddDeltaColumns {
    pub fn new(columns: impl Into<Columns>) -> Self {
        Self {
            columns: columns.into().names().to_vec(),
            ..Self::default()
        }
    }

    pub fn years(mut self, column: impl Into<String>) -> Self {
        self.years = Some(column.into());
        self
    }

    pub fn months(mut self, column: impl Into<String>) -> Self {
        self.months = Some(column.into());
        self
    }

    pub fn days(mut self, column: impl Into<String>) -> Self {
        self.days = Some(column.into());
        self
    }

    pub fn hours(mut self, column: impl Into<String>) -> Self {
        self.hours = Some(column.into());
        self
    }

    fn offset_columns(&self) -> Vec<&str> {
        [&self.years, &self.months, &self.days, &self.hours]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

impl QueryOp for AddDeltaColumns {
    fn name(&self) -> &'static str {
        "AddDeltaColumns"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        let mut required: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        required.extend(self.offset_columns());
        assert_has_columns(&table, &required, self.name())?;

        if self.offset_columns().is_empty() {
            return Err(QueryError::invalid_argument(
                "AddDeltaColumns requires at least one offset column",
            ));
        }

        let delta = DateDelta {
            years: self.years.as_deref().map(Expr::col),
            months: self.months.as_deref().map(Expr::col),
            days: self.days.as_deref().map(Expr::col),
            hours: self.hours.as_deref().map(Expr::col),
        };

        let mut table = table.wrap();
        for projection in &mut table.projection {
            if self.columns.contains(&projection.alias) {
                projection.expr = Expr::ShiftDate {
                    expr: Box::new(Expr::col(&projection.alias)),
                    delta: Box::new(delta.clone()),
                };
            }
        }
        Ok(table)
    }
}

/// Derive an integer column from a timestamp component (year, month, ...).
#[derive(Debug, Clone)]
pub struct ExtractTimestampComponent {
    column: String,
    field: DateField,
    label: String,
}

impl ExtractTimestampComponent {
    pub fn new(
        column: impl Into<String>,
        field: DateField,
        label: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            field,
            label: label.into(),
        }
    }
}

impl QueryOp for ExtractTimestampComponent {
    fn name(&self) -> &'static str {
        "ExtractTimestampComponent"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &[&self.column], self.name())?;
        if table.has_column(&self.label) {
            return Err(QueryError::invalid_argument(format!(
                "ExtractTimestampComponent: column '{}' already exists",
                self.label
            )));
        }
        let mut table = table.wrap();
        table.projection.push(Projection::new(
            Expr::extract(self.field, Expr::col(&self.column)),
            self.label.clone(),
            SqlType::Integer,
        ));
        Ok(table)
    }
}

/// Strip leading and trailing whitespace from a string column.
#[derive(Debug, Clone)]
pub struct Trim {
    column: String,
}

impl Trim {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl QueryOp for Trim {
    fn name(&self) -> &'static str {
        "Trim"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        assert_has_columns(&table, &[&self.column], self.name())?;
        let mut table = table.wrap();
        for projection in &mut table.projection {
            if projection.alias == self.column {
                projection.expr = Expr::func("TRIM", vec![Expr::col(&self.column)]);
                projection.ty = SqlType::Text;
            }
        }
        Ok(table)
    }
}

/// Cap the number of rows returned.
#[derive(Debug, Clone)]
pub struct Limit {
    rows: u64,
}

impl Limit {
    pub fn new(rows: u64) -> Self {
        Self { rows }
    }
}

impl QueryOp for Limit {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn apply(&self, table: Subquery) -> Result<Subquery> {
        let mut table = table.wrap();
        table.limit = Some(self.rows);
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelake_core::DeclaredTable;

    fn sample_table() -> Subquery {
        Subquery::from_table(
            DeclaredTable::new("hosp", "admissions")
                .column("subject_id", SqlType::Integer)
                .column("hadm_id", SqlType::Integer)
                .column("admittime", SqlType::Timestamp)
                .column("discharge_location", SqlType::Text)
                .column("sex", SqlType::Text),
        )
    }

    fn lookup_table() -> Subquery {
        Subquery::from_table(
            DeclaredTable::new("public", "lookup")
                .column("value", SqlType::Text)
                .column("description", SqlType::Text),
        )
    }

    #[test]
    fn test_rename_changes_alias() {
        let table = Rename::new([("sex", "gender")])
            .apply(sample_table())
            .unwrap();
        assert!(table.has_column("gender"));
        assert!(!table.has_column("sex"));
        let sql = table.to_sql().unwrap().sql;
        assert!(sql.contains("sex AS gender"));
    }

    #[test]
    fn test_rename_missing_column_fails_unless_lenient() {
        let err = Rename::new([("nope", "x")])
            .apply(sample_table())
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownColumn(_)));

        let table = Rename::lenient([("nope", "x"), ("sex", "gender")])
            .apply(sample_table())
            .unwrap();
        assert!(table.has_column("gender"));
        assert!(!table.has_column("x"));
    }

    #[test]
    fn test_rename_then_drop_removes_both_names() {
        let table = Rename::new([("sex", "gender")])
            .apply(sample_table())
            .unwrap();
        let table = Drop::new("gender").apply(table).unwrap();
        assert!(!table.has_column("sex"));
        assert!(!table.has_column("gender"));
    }

    #[test]
    fn test_filter_columns_preserves_requested_order() {
        let table = FilterColumns::new(vec!["sex", "subject_id"])
            .apply(sample_table())
            .unwrap();
        assert_eq!(table.column_names(), vec!["sex", "subject_id"]);
    }

    #[test]
    fn test_filter_columns_missing_column() {
        let err = FilterColumns::new(vec!["sex", "ghost"])
            .apply(sample_table())
            .unwrap_err();
        assert!(matches!(err, QueryError::MissingColumn { .. }));
        assert!(err.to_string().contains("ghost"));
        assert!(err.to_string().contains("FilterColumns"));
    }

    #[test]
    fn test_reorder_requires_permutation() {
        let err = Reorder::new(vec!["sex", "subject_id"])
            .apply(sample_table())
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));

        let table = Reorder::new(vec![
            "sex",
            "subject_id",
            "hadm_id",
            "admittime",
            "discharge_location",
        ])
        .apply(sample_table())
        .unwrap();
        assert_eq!(table.column_names()[0], "sex");
    }

    #[test]
    fn test_reorder_after_moves_column() {
        let table = ReorderAfter::new("admittime", "subject_id")
            .apply(sample_table())
            .unwrap();
        assert_eq!(
            table.column_names(),
            vec![
                "subject_id",
                "admittime",
                "hadm_id",
                "discharge_location",
                "sex"
            ]
        );
    }

    #[test]
    fn test_join_does_not_duplicate_key_column() {
        let right = Subquery::from_table(
            DeclaredTable::new("hosp", "patients")
                .column("subject_id", SqlType::Integer)
                .column("dob", SqlType::Timestamp),
        );
        let table = Join::new(right, "subject_id")
            .apply(sample_table())
            .unwrap();
        let names = table.column_names();
        assert_eq!(
            names.iter().filter(|n| **n == "subject_id").count(),
            1,
            "join key must appear once"
        );
        assert!(table.has_column("dob"));
    }

    #[test]
    fn test_join_selective_columns_and_coercion() {
        let table = Join::new(lookup_table(), ("discharge_location", "value"))
            .coerce(SqlType::Text)
            .columns("description")
            .left_outer()
            .apply(sample_table())
            .unwrap();
        assert!(table.has_column("description"));
        assert!(!table.has_column("value"));
        let sql = table.to_sql().unwrap().sql;
        assert!(sql.contains("LEFT OUTER JOIN"));
        assert!(sql.contains("CAST(l.discharge_location AS TEXT) = CAST(r.value AS TEXT)"));
    }

    #[test]
    fn test_join_missing_key_reports_side() {
        let err = Join::new(lookup_table(), "ghost")
            .apply(sample_table())
            .unwrap_err();
        assert!(err.to_string().contains("Join (left table)"));
    }

    #[test]
    fn test_condition_equals_negated() {
        let table = ConditionEquals::new("discharge_location", "DIED")
            .negated()
            .apply(sample_table())
            .unwrap();
        let query = table.to_sql().unwrap();
        assert!(query.sql.contains("NOT (discharge_location = $1)"));
        assert_eq!(query.params, vec![Value::Text("DIED".into())]);
    }

    #[test]
    fn test_condition_binarize_keeps_rows() {
        let table = ConditionEquals::new("discharge_location", "DIED")
            .binarize("died")
            .apply(sample_table())
            .unwrap();
        // No filter; a boolean column records the condition instead.
        assert!(table.predicate.is_none());
        assert!(table.has_column("died"));
        assert_eq!(table.column_type("died"), Some(SqlType::Boolean));
    }

    #[test]
    fn test_condition_in_scalar_and_list() {
        let scalar = ConditionIn::new("sex", "F")
            .to_str()
            .apply(sample_table())
            .unwrap();
        assert!(scalar.to_sql().unwrap().sql.contains("sex IN ($1)"));

        let list = ConditionIn::new("sex", vec!["F", "M"])
            .apply(sample_table())
            .unwrap();
        assert!(list.to_sql().unwrap().sql.contains("sex IN ($1, $2)"));
    }

    #[test]
    fn test_condition_in_coerces_to_int() {
        let table = ConditionIn::new("hadm_id", vec!["12", "13"])
            .to_int()
            .apply(sample_table())
            .unwrap();
        let query = table.to_sql().unwrap();
        assert_eq!(
            query.params,
            vec![Value::Integer(12), Value::Integer(13)]
        );
    }

    #[test]
    fn test_condition_substring_is_case_insensitive() {
        let table = ConditionSubstring::new("discharge_location", "home")
            .apply(sample_table())
            .unwrap();
        let query = table.to_sql().unwrap();
        assert!(query.sql.contains("LOWER(discharge_location) LIKE LOWER($1)"));
        assert_eq!(query.params, vec![Value::Text("%home%".into())]);
    }

    #[test]
    fn test_condition_dates_accept_text() {
        let before = ConditionBeforeDate::new("admittime", "2018-01-01")
            .apply(sample_table())
            .unwrap();
        assert!(before.to_sql().unwrap().sql.contains("admittime <= $1"));

        let err = ConditionAfterDate::new("admittime", "01/01/2018")
            .apply(sample_table())
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn test_condition_in_years() {
        let table = ConditionInYears::new("admittime", vec![2015i64, 2016])
            .apply(sample_table())
            .unwrap();
        let query = table.to_sql().unwrap();
        assert!(
            query
                .sql
                .contains("CAST(EXTRACT(YEAR FROM admittime) AS INTEGER) IN ($1, $2)")
        );
    }

    #[test]
    fn test_drop_nulls_filters() {
        let table = DropNulls::new("subject_id").apply(sample_table()).unwrap();
        assert!(
            table
                .to_sql()
                .unwrap()
                .sql
                .contains("NOT (subject_id IS NULL)")
        );
    }

    #[test]
    fn test_cast_updates_declared_type() {
        let table = Cast::new("admittime", SqlType::Timestamp)
            .apply(sample_table())
            .unwrap();
        assert_eq!(table.column_type("admittime"), Some(SqlType::Timestamp));
        assert!(
            table
                .to_sql()
                .unwrap()
                .sql
                .contains("CAST(admittime AS TIMESTAMP) AS admittime")
        );
    }

    #[test]
    fn test_literal_appends_tagged_column() {
        let table = Literal::new("ER", "care_unit").apply(sample_table()).unwrap();
        assert_eq!(table.column_type("care_unit"), Some(SqlType::Text));
        let query = table.to_sql().unwrap();
        assert!(query.sql.contains("$1 AS care_unit"));
        assert_eq!(query.params, vec![Value::Text("ER".into())]);
    }

    #[test]
    fn test_add_column_in_place_and_labelled() {
        let replaced = AddColumn::new("subject_id", "hadm_id")
            .apply(sample_table())
            .unwrap();
        assert!(
            replaced
                .to_sql()
                .unwrap()
                .sql
                .contains("(subject_id + hadm_id) AS subject_id")
        );

        let labelled = AddColumn::new("subject_id", "hadm_id")
            .negative()
            .label("difference")
            .apply(sample_table())
            .unwrap();
        assert!(labelled.has_column("difference"));
        assert!(
            labelled
                .to_sql()
                .unwrap()
                .sql
                .contains("(subject_id - hadm_id) AS difference")
        );
    }

    #[test]
    fn test_add_delta_columns_shifts_timestamps() {
        let table = ExtractTimestampComponent::new("admittime", DateField::Year, "anchor_diff")
            .apply(sample_table())
            .unwrap();
        let table = AddDeltaColumns::new("admittime")
            .years("anchor_diff")
            .apply(table)
            .unwrap();
        let sql = table.to_sql().unwrap().sql;
        assert!(sql.contains("admittime + make_interval(years => CAST(anchor_diff AS INTEGER))"));
    }

    #[test]
    fn test_add_delta_requires_an_offset() {
        let err = AddDeltaColumns::new("admittime")
            .apply(sample_table())
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn test_trim_wraps_column() {
        let table = Trim::new("discharge_location")
            .apply(sample_table())
            .unwrap();
        assert!(
            table
                .to_sql()
                .unwrap()
                .sql
                .contains("TRIM(discharge_location) AS discharge_location")
        );
    }

    #[test]
    fn test_limit_sets_row_cap() {
        let table = Limit::new(10).apply(sample_table()).unwrap();
        assert!(table.to_sql().unwrap().sql.ends_with("LIMIT 10"));
    }

    #[test]
    fn test_operators_are_reusable() {
        let op = ConditionEquals::new("sex", "F");
        let first = op.apply(sample_table()).unwrap();
        let second = op.apply(sample_table()).unwrap();
        assert_eq!(first, second);
    }
}
