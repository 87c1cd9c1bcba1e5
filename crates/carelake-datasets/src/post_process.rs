//! In-memory post-processing applied to fetched rows.

use carelake_core::{QueryError, Result, Value};
use carelake_query::RowSet;

use crate::columns::CARE_UNIT;

/// Collapse a free-text care-unit label into one of the four provenance
/// buckets used across datasets: `ICU`, `ER`, `SCU`, or `IP`.
fn care_unit_bucket(label: &str) -> &'static str {
    let label = label.to_lowercase();
    if label.contains("intensive care") || label.ends_with("icu)") {
        "ICU"
    } else if label.contains("emergency") {
        "ER"
    } else if label.contains("stepdown")
        || label.contains("intermediate")
        || label.contains("special care")
    {
        "SCU"
    } else {
        "IP"
    }
}

/// Normalize a care-unit result set.
///
/// Renames `unit_column` to the standard `care_unit` name, maps each label
/// onto its bucket, and drops rows with no recorded unit.
pub fn process_care_units(mut rows: RowSet, unit_column: &str) -> Result<RowSet> {
    let index = rows
        .column_index(unit_column)
        .ok_or_else(|| QueryError::missing_column(unit_column, "care unit rows"))?;
    rows.columns[index] = CARE_UNIT.to_string();

    rows.rows.retain(|row| !matches!(row[index], Value::Null));
    for row in &mut rows.rows {
        if let Value::Text(label) = &row[index] {
            row[index] = Value::Text(care_unit_bucket(label).to_string());
        }
    }

    Ok(rows)
}
