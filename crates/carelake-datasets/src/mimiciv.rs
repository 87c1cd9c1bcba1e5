//! MIMIC-IV querier.
//!
//! Covers the hosp, icu, and ed schemas of MIMIC-IV 2.x. Patient dates in
//! MIMIC are de-identified by shifting each patient into a three-year
//! anchor group; the [`patients`] recipe derives the midpoint of that
//! group as the approximate anchor year and every downstream recipe
//! re-anchors its timestamps with the resulting per-patient year
//! difference.
//!
//! [`patients`]: MimicIvQuerier::patients

use std::sync::Arc;

use carelake_core::{
    DateField, DeclaredTable, Expr, Projection, Result, SqlType, Subquery, TableExpr, Value,
};
use carelake_query::ops::{
    AddColumn, AddDeltaColumns, Drop, ExtractTimestampComponent, Join, QueryOp, Rename, Reorder,
    ReorderAfter, Trim,
};
use carelake_query::{
    ArgBundle, DatasetQuerier, Operation, QueryArg, QueryExecutor, QueryInterface, TableCatalog,
    assert_has_columns, run_pipeline,
};

use crate::columns::{
    ADMIT_TIMESTAMP, AGE, DATE_OF_DEATH, DIAGNOSIS_CODE, DIAGNOSIS_TITLE, DIAGNOSIS_VERSION,
    DISCHARGE_TIMESTAMP, ENCOUNTER_ID, EVENT_CATEGORY, EVENT_NAME, EVENT_TIMESTAMP, EVENT_VALUE,
    EVENT_VALUE_UNIT, SEX, SUBJECT_ID,
};
use crate::post_process::process_care_units;
use crate::{default_died_for_binarize, died_arg};

pub const PATIENTS: &str = "patients";
pub const ADMISSIONS: &str = "admissions";
pub const DIAGNOSES: &str = "diagnoses";
pub const PATIENT_DIAGNOSES: &str = "patient_diagnoses";
pub const EVENT_LABELS: &str = "event_labels";
pub const EVENTS: &str = "events";
pub const TRANSFERS: &str = "transfers";
pub const ED_STAYS: &str = "ed_stays";

fn catalog() -> TableCatalog {
    TableCatalog::new()
        .declare(
            PATIENTS,
            DeclaredTable::new("mimiciv_hosp", "patients")
                .column("subject_id", SqlType::Integer)
                .column("gender", SqlType::Text)
                .column("anchor_age", SqlType::Integer)
                .column("anchor_year", SqlType::Integer)
                .column("anchor_year_group", SqlType::Text)
                .column("dod", SqlType::Timestamp),
        )
        .declare(
            ADMISSIONS,
            DeclaredTable::new("mimiciv_hosp", "admissions")
                .column("subject_id", SqlType::Integer)
                .column("hadm_id", SqlType::Integer)
                .column("admittime", SqlType::Timestamp)
                .column("dischtime", SqlType::Timestamp)
                .column("deathtime", SqlType::Timestamp)
                .column("admission_type", SqlType::Text)
                .column("admission_location", SqlType::Text)
                .column("discharge_location", SqlType::Text)
                .column("insurance", SqlType::Text)
                .column("edregtime", SqlType::Timestamp)
                .column("edouttime", SqlType::Timestamp)
                .column("hospital_expire_flag", SqlType::Integer),
        )
        .declare(
            DIAGNOSES,
            DeclaredTable::new("mimiciv_hosp", "d_icd_diagnoses")
                .column("icd_code", SqlType::Text)
                .column("icd_version", SqlType::Integer)
                .column("long_title", SqlType::Text),
        )
        .declare(
            PATIENT_DIAGNOSES,
            DeclaredTable::new("mimiciv_hosp", "diagnoses_icd")
                .column("subject_id", SqlType::Integer)
                .column("hadm_id", SqlType::Integer)
                .column("seq_num", SqlType::Integer)
                .column("icd_code", SqlType::Text)
                .column("icd_version", SqlType::Integer),
        )
        .declare(
            TRANSFERS,
            DeclaredTable::new("mimiciv_hosp", "transfers")
                .column("subject_id", SqlType::Integer)
                .column("hadm_id", SqlType::Integer)
                .column("transfer_id", SqlType::Integer)
                .column("eventtype", SqlType::Text)
                .column("careunit", SqlType::Text)
                .column("intime", SqlType::Timestamp)
                .column("outtime", SqlType::Timestamp),
        )
        .declare(
            EVENT_LABELS,
            DeclaredTable::new("mimiciv_icu", "d_items")
                .column("itemid", SqlType::Integer)
                .column("label", SqlType::Text)
                .column("abbreviation", SqlType::Text)
                .column("category", SqlType::Text)
                .column("unitname", SqlType::Text),
        )
        .declare(
            EVENTS,
            DeclaredTable::new("mimiciv_icu", "chartevents")
                .column("subject_id", SqlType::Integer)
                .column("hadm_id", SqlType::Integer)
                .column("stay_id", SqlType::Integer)
                .column("itemid", SqlType::Integer)
                .column("charttime", SqlType::Timestamp)
                .column("storetime", SqlType::Timestamp)
                .column("value", SqlType::Text)
                .column("valuenum", SqlType::Float)
                .column("valueuom", SqlType::Text),
        )
        .declare(
            ED_STAYS,
            DeclaredTable::new("mimiciv_ed", "edstays")
                .column("subject_id", SqlType::Integer)
                .column("hadm_id", SqlType::Integer)
                .column("stay_id", SqlType::Integer)
                .column("intime", SqlType::Timestamp)
                .column("outtime", SqlType::Timestamp)
                .column("gender", SqlType::Text)
                .column("arrival_transport", SqlType::Text)
                .column("disposition", SqlType::Text),
        )
}

const COLUMN_MAP: [(&str, &str); 13] = [
    ("hadm_id", ENCOUNTER_ID),
    ("admittime", ADMIT_TIMESTAMP),
    ("dischtime", DISCHARGE_TIMESTAMP),
    ("gender", SEX),
    ("anchor_age", AGE),
    ("dod", DATE_OF_DEATH),
    ("icd_code", DIAGNOSIS_CODE),
    ("icd_version", DIAGNOSIS_VERSION),
    ("label", EVENT_NAME),
    ("valuenum", EVENT_VALUE),
    ("valueuom", EVENT_VALUE_UNIT),
    ("charttime", EVENT_TIMESTAMP),
    ("subject_id", SUBJECT_ID),
];

/// Querier for the MIMIC-IV critical-care database.
#[derive(Debug, Clone)]
pub struct MimicIvQuerier {
    base: DatasetQuerier,
}

impl MimicIvQuerier {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            base: DatasetQuerier::new(catalog(), executor).with_column_map(COLUMN_MAP),
        }
    }

    /// The underlying dataset querier, for raw table access.
    pub fn base(&self) -> &DatasetQuerier {
        &self.base
    }

    /// Patient demographics with de-identified dates re-anchored.
    ///
    /// Optional filters: `sex` (scalar or list), `died` (bool, with
    /// `died_binarize_col`), `limit`.
    pub fn patients(&self, args: &ArgBundle) -> Result<QueryInterface> {
        let table = self.base.table(PATIENTS)?;

        // The anchor year group is text like "2008 - 2010"; take its two
        // endpoint years and anchor on their midpoint.
        let table = derive_int(
            table,
            "anchor_year_group_start",
            Expr::func(
                "SUBSTR",
                vec![
                    Expr::col("anchor_year_group"),
                    Expr::Literal(Value::Integer(1)),
                    Expr::Literal(Value::Integer(4)),
                ],
            )
            .cast(SqlType::Integer),
        );
        let table = derive_int(
            table,
            "anchor_year_group_end",
            Expr::func(
                "SUBSTR",
                vec![
                    Expr::col("anchor_year_group"),
                    Expr::Literal(Value::Integer(8)),
                    Expr::Literal(Value::Integer(12)),
                ],
            )
            .cast(SqlType::Integer),
        );
        let table = derive_int(
            table,
            "anchor_year_group_middle",
            Expr::col("anchor_year_group_start").add(
                Expr::col("anchor_year_group_end")
                    .sub(Expr::col("anchor_year_group_start"))
                    .div(Expr::Literal(Value::Integer(2))),
            ),
        );
        let table = derive_int(
            table,
            "anchor_year_difference",
            Expr::col("anchor_year_group_middle").sub(Expr::col("anchor_year")),
        );

        // Shift the anchor year and date of death into the anchor group,
        // then derive the approximate birth year.
        let table = AddColumn::new("anchor_year", "anchor_year_difference").apply(table)?;
        let table = AddDeltaColumns::new(DATE_OF_DEATH)
            .years("anchor_year_difference")
            .apply(table)?;
        let table = AddColumn::new("anchor_year", AGE)
            .negative()
            .label("birth_year")
            .apply(table)?;

        let table = Drop::new(vec![
            AGE,
            "anchor_year",
            "anchor_year_group",
            "anchor_year_group_start",
            "anchor_year_group_end",
            "anchor_year_group_middle",
        ])
        .apply(table)?;
        let table = Reorder::new(vec![
            SUBJECT_ID,
            SEX,
            "birth_year",
            DATE_OF_DEATH,
            "anchor_year_difference",
        ])
        .apply(table)?;

        let args = default_died_for_binarize(args);
        let operations = vec![
            // CHAR(1) columns compare reliably only against text.
            Operation::condition_in(SEX, QueryArg::new("sex")).to_str(),
            Operation::condition_equals("discharge_location", "DIED")
                .negate_if(died_arg())
                .binarize(QueryArg::optional("died_binarize_col")),
            Operation::limit(QueryArg::new("limit")),
        ];
        let table = run_pipeline(table, &operations, &args)?;

        Ok(self.base.interface(table))
    }

    /// The ICD diagnosis dictionary.
    ///
    /// Optional filters: `diagnosis_versions`, `diagnosis_substring`,
    /// `diagnosis_codes`, `limit`.
    pub fn diagnoses(&self, args: &ArgBundle) -> Result<QueryInterface> {
        let table = self.base.table(DIAGNOSES)?;
        let table = Rename::new([("long_title", DIAGNOSIS_TITLE)]).apply(table)?;
        let table = Trim::new(DIAGNOSIS_CODE).apply(table)?;

        let operations = vec![
            Operation::condition_in(DIAGNOSIS_VERSION, QueryArg::new("diagnosis_versions"))
                .to_int(),
            Operation::condition_substring(DIAGNOSIS_TITLE, QueryArg::new("diagnosis_substring")),
            Operation::condition_in(DIAGNOSIS_CODE, QueryArg::new("diagnosis_codes")).to_str(),
            Operation::limit(QueryArg::new("limit")),
        ];
        let table = run_pipeline(table, &operations, args)?;

        Ok(self.base.interface(table))
    }

    /// Per-encounter diagnoses, joined with the dictionary title.
    ///
    /// `patients_table` must carry `subject_id` when given. Dictionary
    /// filters (`diagnosis_versions`, `diagnosis_substring`,
    /// `diagnosis_codes`) are forwarded to the dictionary side.
    pub fn patient_diagnoses(
        &self,
        patients_table: Option<TableExpr>,
        args: &ArgBundle,
    ) -> Result<QueryInterface> {
        let table = self.base.table(PATIENT_DIAGNOSES)?;
        let table = Trim::new(DIAGNOSIS_CODE).apply(table)?;

        let table = match patients_table {
            Some(patients) => {
                let patients = patients.into_subquery();
                assert_has_columns(&patients, &[SUBJECT_ID], "patients_table")?;
                Join::new(patients, SUBJECT_ID).apply(table)?
            }
            None => table,
        };

        let mut args = args.clone();
        let dictionary_args = args.split_off(&[
            "diagnosis_versions",
            "diagnosis_substring",
            "diagnosis_codes",
        ]);
        let dictionary = self.diagnoses(&dictionary_args)?.query().clone();

        let table = Join::new(dictionary, vec![DIAGNOSIS_CODE, DIAGNOSIS_VERSION])
            .columns(DIAGNOSIS_TITLE)
            .apply(table)?;

        Ok(self.base.interface(table))
    }

    /// Ward and unit transfers, optionally scoped to given patients.
    ///
    /// Optional filters: `encounters`, `limit`.
    pub fn transfers(
        &self,
        patients_table: Option<TableExpr>,
        args: &ArgBundle,
    ) -> Result<QueryInterface> {
        let table = self.base.table(TRANSFERS)?;

        let table = match patients_table {
            Some(patients) => {
                let patients = patients.into_subquery();
                assert_has_columns(&patients, &[SUBJECT_ID], "patients_table")?;
                let table = Join::new(patients, SUBJECT_ID).apply(table)?;
                AddDeltaColumns::new(vec!["intime", "outtime"])
                    .years("anchor_year_difference")
                    .apply(table)?
            }
            None => table,
        };

        let operations = vec![
            Operation::condition_in(ENCOUNTER_ID, QueryArg::new("encounters")).to_int(),
            Operation::limit(QueryArg::new("limit")),
        ];
        let table = run_pipeline(table, &operations, args)?;

        Ok(self.base.interface(table))
    }

    /// Transfers with raw unit labels mapped to the broad care-unit
    /// categories client-side.
    pub fn care_units(
        &self,
        patients_table: Option<TableExpr>,
        args: &ArgBundle,
    ) -> Result<QueryInterface> {
        let mut args = args.clone();
        let transfer_args = args.split_off(&["encounters"]);
        let table = self.transfers(patients_table, &transfer_args)?.query().clone();

        Ok(self
            .base
            .interface_processed(table, |rows| process_care_units(rows, "careunit")))
    }

    /// Hospital admissions joined with re-anchored patient data.
    ///
    /// Optional filters: `before_date`, `after_date`, `years`, `months`,
    /// `sex`, `died` (+ `died_binarize_col`), `limit`.
    pub fn patient_encounters(
        &self,
        patients_table: Option<TableExpr>,
        args: &ArgBundle,
    ) -> Result<QueryInterface> {
        let table = self.base.table(ADMISSIONS)?;

        let patients = match patients_table {
            Some(patients) => {
                let patients = patients.into_subquery();
                assert_has_columns(&patients, &[SUBJECT_ID], "patients_table")?;
                patients
            }
            None => self.patients(&ArgBundle::new())?.query().clone(),
        };
        let table = Join::new(patients, SUBJECT_ID).apply(table)?;

        let table = AddDeltaColumns::new(vec![
            ADMIT_TIMESTAMP,
            DISCHARGE_TIMESTAMP,
            "deathtime",
            "edregtime",
            "edouttime",
        ])
        .years("anchor_year_difference")
        .apply(table)?;

        // Approximate age at admission.
        let table =
            ExtractTimestampComponent::new(ADMIT_TIMESTAMP, DateField::Year, AGE).apply(table)?;
        let table = AddColumn::new(AGE, "birth_year").negative().apply(table)?;
        let table = ReorderAfter::new(AGE, SEX).apply(table)?;

        let args = default_died_for_binarize(args);
        let operations = vec![
            Operation::before_date(ADMIT_TIMESTAMP, QueryArg::new("before_date")),
            Operation::after_date(ADMIT_TIMESTAMP, QueryArg::new("after_date")),
            Operation::in_years(ADMIT_TIMESTAMP, QueryArg::new("years")),
            Operation::in_months(ADMIT_TIMESTAMP, QueryArg::new("months")),
            Operation::condition_in(SEX, QueryArg::new("sex")).to_str(),
            Operation::condition_equals("discharge_location", "DIED")
                .negate_if(died_arg())
                .binarize(QueryArg::optional("died_binarize_col")),
            Operation::limit(QueryArg::new("limit")),
        ];
        let table = run_pipeline(table, &operations, &args)?;

        Ok(self.base.interface(table))
    }

    /// ICU chart events labelled through the item dictionary.
    ///
    /// Optional filters: `before_date`, `after_date`, `years`, `months`,
    /// `categories`, `event_names`, `event_name_substring`, `limit`.
    pub fn events(
        &self,
        patient_encounters_table: Option<TableExpr>,
        args: &ArgBundle,
    ) -> Result<QueryInterface> {
        let table = self.base.table(EVENTS)?;
        let labels = self.base.table(EVENT_LABELS)?;

        let table = Join::new(labels, "itemid")
            .columns(vec!["category", EVENT_NAME])
            .apply(table)?;
        let table = Rename::new([("category", EVENT_CATEGORY)]).apply(table)?;

        let operations = vec![
            Operation::before_date(EVENT_TIMESTAMP, QueryArg::new("before_date")),
            Operation::after_date(EVENT_TIMESTAMP, QueryArg::new("after_date")),
            Operation::in_years(EVENT_TIMESTAMP, QueryArg::new("years")),
            Operation::in_months(EVENT_TIMESTAMP, QueryArg::new("months")),
            Operation::condition_in(EVENT_CATEGORY, QueryArg::new("categories")),
            Operation::condition_in(EVENT_NAME, QueryArg::new("event_names")),
            Operation::condition_substring(EVENT_NAME, QueryArg::new("event_name_substring")),
            Operation::limit(QueryArg::new("limit")),
        ];
        let table = run_pipeline(table, &operations, args)?;

        let table = match patient_encounters_table {
            Some(encounters) => {
                let encounters = encounters.into_subquery();
                assert_has_columns(
                    &encounters,
                    &[ENCOUNTER_ID, SUBJECT_ID],
                    "patient_encounters_table",
                )?;
                let table = Join::new(encounters, ENCOUNTER_ID).apply(table)?;
                AddDeltaColumns::new(vec![EVENT_TIMESTAMP, "storetime"])
                    .years("anchor_year_difference")
                    .apply(table)?
            }
            None => table,
        };

        Ok(self.base.interface(table))
    }
}

/// Append an integer-typed derived column in a fresh selection layer.
fn derive_int(table: Subquery, alias: &str, expr: Expr) -> Subquery {
    let mut table = table.wrap();
    table
        .projection
        .push(Projection::new(expr, alias, SqlType::Integer));
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use carelake_core::{QueryError, SqlQuery};
    use carelake_query::RowSet;

    struct NullExecutor;

    #[async_trait]
    impl QueryExecutor for NullExecutor {
        async fn fetch(&self, _query: &SqlQuery) -> Result<RowSet> {
            Ok(RowSet::new(vec!["n".into()], vec![]))
        }
    }

    fn querier() -> MimicIvQuerier {
        MimicIvQuerier::new(Arc::new(NullExecutor))
    }

    #[test]
    fn test_patients_derives_anchor_midpoint() {
        let sql = querier()
            .patients(&ArgBundle::new())
            .unwrap()
            .to_sql()
            .unwrap()
            .sql;
        assert!(sql.contains("CAST(SUBSTR(anchor_year_group, 1, 4) AS INTEGER)"));
        assert!(sql.contains("CAST(SUBSTR(anchor_year_group, 8, 12) AS INTEGER)"));
        assert!(sql.contains(
            "date_of_death + make_interval(years => CAST(anchor_year_difference AS INTEGER))"
        ));
    }

    #[test]
    fn test_patients_output_columns() {
        let interface = querier().patients(&ArgBundle::new()).unwrap();
        assert_eq!(
            interface.query().column_names(),
            vec![
                SUBJECT_ID,
                SEX,
                "birth_year",
                DATE_OF_DEATH,
                "anchor_year_difference"
            ]
        );
    }

    #[test]
    fn test_patients_sex_filter_coerces_to_text() {
        let args = ArgBundle::new().set("sex", "F");
        let query = querier().patients(&args).unwrap().to_sql().unwrap();
        assert!(query.sql.contains("sex IN ($1)"));
        assert_eq!(query.params, vec![Value::Text("F".into())]);
    }

    #[test]
    fn test_diagnoses_trims_codes_and_filters_versions() {
        let args = ArgBundle::new().set("diagnosis_versions", vec![9i64, 10]);
        let query = querier().diagnoses(&args).unwrap().to_sql().unwrap();
        assert!(query.sql.contains("TRIM(diagnosis_code) AS diagnosis_code"));
        assert!(query.sql.contains("diagnosis_version IN ($1, $2)"));
    }

    #[test]
    fn test_patient_diagnoses_pulls_title_only() {
        let interface = querier()
            .patient_diagnoses(None, &ArgBundle::new())
            .unwrap();
        let names = interface.query().column_names();
        assert!(names.contains(&DIAGNOSIS_TITLE));
        // Dictionary key columns must not be duplicated by the join.
        assert_eq!(
            names.iter().filter(|n| **n == DIAGNOSIS_CODE).count(),
            1
        );
    }

    #[test]
    fn test_patient_diagnoses_guards_caller_table() {
        let bad = Subquery::from_table(
            DeclaredTable::new("x", "not_patients").column("id", SqlType::Integer),
        );
        let err = querier()
            .patient_diagnoses(Some(bad.into()), &ArgBundle::new())
            .unwrap_err();
        assert!(matches!(err, QueryError::MissingColumn { .. }));
        assert!(err.to_string().contains("patients_table"));
    }

    #[test]
    fn test_patient_encounters_derives_age() {
        let interface = querier()
            .patient_encounters(None, &ArgBundle::new())
            .unwrap();
        let names = interface.query().column_names();
        let sex = names.iter().position(|n| *n == SEX).unwrap();
        assert_eq!(names[sex + 1], AGE);
        let sql = interface.to_sql().unwrap().sql;
        assert!(sql.contains("CAST(EXTRACT(YEAR FROM admit_timestamp) AS INTEGER)"));
        assert!(sql.contains("(age - birth_year) AS age"));
    }

    #[test]
    fn test_patient_encounters_died_binarize_keeps_rows() {
        let args = ArgBundle::new().set("died_binarize_col", "died");
        let interface = querier().patient_encounters(None, &args).unwrap();
        assert!(interface.query().has_column("died"));
        // Binarizing must tag rows, not filter them.
        assert!(interface.query().predicate.is_none());
    }

    #[test]
    fn test_transfers_requires_patients_for_reanchoring() {
        let patients = querier().patients(&ArgBundle::new()).unwrap().query().clone();
        let interface = querier()
            .transfers(Some(patients.into()), &ArgBundle::new())
            .unwrap();
        let sql = interface.to_sql().unwrap().sql;
        assert!(sql.contains("intime + make_interval"));
        assert!(sql.contains("outtime + make_interval"));
    }

    #[test]
    fn test_events_joins_labels_and_renames_category() {
        let args = ArgBundle::new().set("event_name_substring", "glucose");
        let interface = querier().events(None, &args).unwrap();
        assert!(interface.query().has_column(EVENT_CATEGORY));
        assert!(interface.query().has_column(EVENT_NAME));
        let query = interface.to_sql().unwrap();
        assert!(query.sql.contains("LOWER(event_name) LIKE LOWER($1)"));
        assert_eq!(query.params, vec![Value::Text("%glucose%".into())]);
    }

    #[test]
    fn test_events_with_encounters_reanchors_timestamps() {
        let encounters = querier()
            .patient_encounters(None, &ArgBundle::new())
            .unwrap()
            .query()
            .clone();
        let interface = querier()
            .events(Some(encounters.into()), &ArgBundle::new())
            .unwrap();
        let sql = interface.to_sql().unwrap().sql;
        assert!(sql.contains("event_timestamp + make_interval"));
        assert!(sql.contains("storetime + make_interval"));
    }

    #[test]
    fn test_recipes_are_deterministic() {
        let args = ArgBundle::new().set("sex", "F").set("limit", 100i64);
        let first = querier().patients(&args).unwrap().to_sql().unwrap();
        let second = querier().patients(&args).unwrap().to_sql().unwrap();
        assert_eq!(first, second);
    }
}
