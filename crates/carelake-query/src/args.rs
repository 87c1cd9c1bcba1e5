//! Deferred query arguments.
//!
//! Recipes declare optional filters against names in a caller-supplied
//! [`ArgBundle`]; a [`QueryArg`] placeholder is resolved against the bundle
//! once per pipeline run. Whether an absent argument skips the owning
//! operation, clears a single option, or fails the build is chosen per
//! placeholder at construction time.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use carelake_core::{QueryError, Result, Value};

/// Value transform applied to arguments that are present in the bundle.
pub type Transform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// An open-ended mapping of optional named filters.
///
/// Unrecognized keys are not validated here; the closed set of accepted
/// options lives in each dataset recipe's documentation.
#[derive(Debug, Clone, Default)]
pub struct ArgBundle {
    values: IndexMap<String, Value>,
}

impl ArgBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chaining setter for call-site construction.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Remove the named entries into a new bundle, e.g. to forward a
    /// subset of arguments to a sub-recipe.
    pub fn split_off(&mut self, names: &[&str]) -> ArgBundle {
        let mut taken = ArgBundle::new();
        for name in names {
            if let Some(value) = self.values.shift_remove(*name) {
                taken.values.insert((*name).to_string(), value);
            }
        }
        taken
    }
}

/// Resolution behavior of a placeholder whose name is absent from the
/// bundle (and which carries no default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgMode {
    /// Omit the whole owning operation.
    Gate,
    /// Clear only the owning option slot; the operation still runs.
    Optional,
    /// Fail with `MissingArgument`.
    Required,
}

/// A deferred value reference resolved from an [`ArgBundle`] at pipeline
/// run time.
#[derive(Clone)]
pub struct QueryArg {
    name: String,
    mode: ArgMode,
    default: Option<Value>,
    transform: Option<Transform>,
}

impl QueryArg {
    /// A gating placeholder: if absent, the owning operation is skipped.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: ArgMode::Gate,
            default: None,
            transform: None,
        }
    }

    /// An optional placeholder: if absent, only its own slot is cleared.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            mode: ArgMode::Optional,
            ..Self::new(name)
        }
    }

    /// A required placeholder: absence is a construction error.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            mode: ArgMode::Required,
            ..Self::new(name)
        }
    }

    /// Value used when the name is absent from the bundle.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Transform applied to values actually present in the bundle.
    pub fn map(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve against a bundle. Pure: same bundle, same outcome.
    pub fn resolve(&self, bundle: &ArgBundle) -> Result<ResolvedArg> {
        if let Some(value) = bundle.get(&self.name) {
            let value = match &self.transform {
                Some(f) => f(value.clone()),
                None => value.clone(),
            };
            return Ok(ResolvedArg::Value(value));
        }

        if let Some(default) = &self.default {
            return Ok(ResolvedArg::Value(default.clone()));
        }

        match self.mode {
            ArgMode::Gate => Ok(ResolvedArg::SkipOp),
            ArgMode::Optional => Ok(ResolvedArg::Unset),
            ArgMode::Required => Err(QueryError::missing_argument(&self.name)),
        }
    }
}

impl fmt::Debug for QueryArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryArg")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("default", &self.default)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// Outcome of resolving a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedArg {
    /// A concrete value.
    Value(Value),
    /// Absent optional: the owning option slot is cleared.
    Unset,
    /// Absent gate: the owning operation is omitted entirely.
    SkipOp,
}

/// An operation argument: concrete now, or deferred to run time.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Deferred(QueryArg),
}

impl Arg {
    pub fn resolve(&self, bundle: &ArgBundle) -> Result<ResolvedArg> {
        match self {
            Self::Value(value) => Ok(ResolvedArg::Value(value.clone())),
            Self::Deferred(arg) => arg.resolve(bundle),
        }
    }
}

impl From<QueryArg> for Arg {
    fn from(arg: QueryArg) -> Self {
        Self::Deferred(arg)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

macro_rules! arg_from_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Arg {
            fn from(value: $ty) -> Self {
                Self::Value(value.into())
            }
        })*
    };
}

arg_from_value!(
    &str,
    String,
    i32,
    i64,
    f64,
    bool,
    Vec<&str>,
    Vec<String>,
    Vec<i64>
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_value_resolves() {
        let bundle = ArgBundle::new().set("sex", "F");
        let resolved = QueryArg::new("sex").resolve(&bundle).unwrap();
        assert_eq!(resolved, ResolvedArg::Value(Value::Text("F".into())));
    }

    #[test]
    fn test_transform_applies_to_present_values_only() {
        let arg = QueryArg::new("died").map(|v| match v {
            Value::Boolean(b) => Value::Boolean(!b),
            other => other,
        });

        let bundle = ArgBundle::new().set("died", true);
        assert_eq!(
            arg.resolve(&bundle).unwrap(),
            ResolvedArg::Value(Value::Boolean(false))
        );

        // Absent: gate semantics, transform never runs.
        assert_eq!(arg.resolve(&ArgBundle::new()).unwrap(), ResolvedArg::SkipOp);
    }

    #[test]
    fn test_default_beats_mode() {
        let arg = QueryArg::required("limit").with_default(100i64);
        assert_eq!(
            arg.resolve(&ArgBundle::new()).unwrap(),
            ResolvedArg::Value(Value::Integer(100))
        );
    }

    #[test]
    fn test_absent_required_is_error() {
        let err = QueryArg::required("limit")
            .resolve(&ArgBundle::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required argument: limit");
    }

    #[test]
    fn test_absent_optional_is_unset() {
        let resolved = QueryArg::optional("died_binarize_col")
            .resolve(&ArgBundle::new())
            .unwrap();
        assert_eq!(resolved, ResolvedArg::Unset);
    }

    #[test]
    fn test_resolution_is_pure() {
        let bundle = ArgBundle::new().set("years", vec![2015i64, 2016]);
        let arg = QueryArg::new("years");
        assert_eq!(arg.resolve(&bundle).unwrap(), arg.resolve(&bundle).unwrap());
    }

    #[test]
    fn test_split_off_moves_entries() {
        let mut bundle = ArgBundle::new()
            .set("diagnosis_codes", vec!["E11"])
            .set("limit", 5i64);
        let taken = bundle.split_off(&["diagnosis_codes", "missing"]);
        assert!(taken.contains("diagnosis_codes"));
        assert!(!taken.contains("missing"));
        assert!(!bundle.contains("diagnosis_codes"));
        assert!(bundle.contains("limit"));
    }

    #[test]
    fn test_arg_from_conversions() {
        let concrete: Arg = 10i64.into();
        assert!(matches!(concrete, Arg::Value(Value::Integer(10))));
        let deferred: Arg = QueryArg::new("limit").into();
        assert!(matches!(deferred, Arg::Deferred(_)));
    }
}
