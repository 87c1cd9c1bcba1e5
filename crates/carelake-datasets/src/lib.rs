//! Dataset catalogs and query recipes for CareLake.
//!
//! Two warehouses are supported: MIMIC-IV, a public critical-care research
//! database, and GEMINI, a multi-site general-medicine EHR extract. Each
//! gets a querier type wrapping the shared [`carelake_query::DatasetQuerier`]
//! base: a table catalog, a column-standardization map, and one recipe
//! method per clinical concept. Recipes accept an
//! [`carelake_query::ArgBundle`] of optional filters and return a deferred
//! [`carelake_query::QueryInterface`].

pub mod columns;
pub mod gemini;
pub mod mimiciv;
pub mod post_process;

pub use gemini::{EventCategory, GeminiQuerier};
pub use mimiciv::MimicIvQuerier;
pub use post_process::process_care_units;

use carelake_core::Value;
use carelake_query::{ArgBundle, QueryArg};

/// The deferred `died` filter: the caller supplies whether they want
/// deceased patients, the condition tests for death, so the flag inverts.
pub(crate) fn died_arg() -> QueryArg {
    QueryArg::new("died").map(|value| match value {
        Value::Boolean(died) => Value::Boolean(!died),
        other => other,
    })
}

/// Asking to binarize the died condition implies asking for it.
pub(crate) fn default_died_for_binarize(args: &ArgBundle) -> ArgBundle {
    let mut args = args.clone();
    if !args.contains("died") && args.contains("died_binarize_col") {
        args.insert("died", true);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelake_query::ResolvedArg;

    #[test]
    fn test_died_arg_inverts_flag() {
        let bundle = ArgBundle::new().set("died", true);
        assert_eq!(
            died_arg().resolve(&bundle).unwrap(),
            ResolvedArg::Value(Value::Boolean(false))
        );
    }

    #[test]
    fn test_binarize_implies_died() {
        let args = ArgBundle::new().set("died_binarize_col", "died");
        let args = default_died_for_binarize(&args);
        assert_eq!(args.get("died"), Some(&Value::Boolean(true)));

        // An explicit died value is never overridden.
        let args = ArgBundle::new()
            .set("died", false)
            .set("died_binarize_col", "survived");
        let args = default_died_for_binarize(&args);
        assert_eq!(args.get("died"), Some(&Value::Boolean(false)));
    }
}
