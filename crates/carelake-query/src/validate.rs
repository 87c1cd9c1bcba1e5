//! Column preconditions checked before an operator transforms its input.

use carelake_core::{Projection, QueryError, Result, Subquery};

/// Verify every named column exists in the table, reporting the first
/// missing one together with the operator that needed it.
pub fn assert_has_columns(table: &Subquery, columns: &[&str], context: &str) -> Result<()> {
    for column in columns {
        if !table.has_column(column) {
            return Err(QueryError::missing_column(*column, context));
        }
    }
    Ok(())
}

/// Look up a named output column of a table.
pub fn get_column<'a>(table: &'a Subquery, column: &str, context: &str) -> Result<&'a Projection> {
    table
        .projection
        .iter()
        .find(|p| p.alias == column)
        .ok_or_else(|| QueryError::missing_column(column, context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelake_core::{DeclaredTable, SqlType};

    fn table() -> Subquery {
        Subquery::from_table(
            DeclaredTable::new("hosp", "patients")
                .column("subject_id", SqlType::Integer)
                .column("anchor_age", SqlType::Integer),
        )
    }

    #[test]
    fn test_assert_has_columns_passes() {
        assert!(assert_has_columns(&table(), &["subject_id", "anchor_age"], "test").is_ok());
    }

    #[test]
    fn test_assert_has_columns_names_offender_and_context() {
        let err = assert_has_columns(&table(), &["subject_id", "dob"], "Join (left table)")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing column 'dob' in Join (left table)"
        );
    }

    #[test]
    fn test_get_column_returns_projection() {
        let table = table();
        let projection = get_column(&table, "anchor_age", "test").unwrap();
        assert_eq!(projection.alias, "anchor_age");
        assert_eq!(projection.ty, SqlType::Integer);
    }
}
