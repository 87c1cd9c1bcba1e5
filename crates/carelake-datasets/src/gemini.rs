//! GEMINI querier.
//!
//! GEMINI is a multi-site general-medicine EHR extract. Coded fields
//! (discharge disposition, diagnosis type, medical service, imaging test
//! names) live in companion `lookup_*` tables of `(variable, value,
//! description)` rows, so most recipes carry a lookup join to attach the
//! human-readable description.

use std::sync::Arc;

use carelake_core::{
    DeclaredTable, QueryError, Result, SqlType, Subquery, TableExpr, Value, union_all,
};
use carelake_query::ops::{
    Cast, ConditionEquals, DropNulls, FilterColumns, Join, Literal, QueryOp, Rename, ReorderAfter,
    Trim,
};
use carelake_query::{
    ArgBundle, DatasetQuerier, Operation, QueryArg, QueryExecutor, QueryInterface, TableCatalog,
    assert_has_columns, run_pipeline,
};

use crate::columns::{
    ADMIT_TIMESTAMP, CARE_UNIT, DIAGNOSIS_CODE, DISCHARGE_TIMESTAMP, ENCOUNTER_ID,
    ER_ADMIT_TIMESTAMP, ER_DISCHARGE_TIMESTAMP, EVENT_NAME, EVENT_TIMESTAMP, EVENT_VALUE,
    EVENT_VALUE_UNIT, HOSPITAL_ID, LENGTH_OF_STAY_IN_ER, SCU_ADMIT_TIMESTAMP,
    SCU_DISCHARGE_TIMESTAMP, SEX, SUBJECT_ID,
};
use crate::{default_died_for_binarize, died_arg};

pub const IP_ADMIN: &str = "ip_admin";
pub const ER_ADMIN: &str = "er_admin";
pub const DIAGNOSIS: &str = "diagnosis";
pub const LAB: &str = "lab";
pub const VITALS: &str = "vitals";
pub const PHARMACY: &str = "pharmacy";
pub const INTERVENTION: &str = "intervention";
pub const IP_SCU: &str = "ip_scu";
pub const ROOM_TRANSFER: &str = "room_transfer";
pub const BLOOD_TRANSFUSION: &str = "blood_transfusion";
pub const IMAGING: &str = "imaging";
pub const DERIVED_VARIABLES: &str = "derived_variables";
pub const LOOKUP_IP_ADMIN: &str = "lookup_ip_admin";
pub const LOOKUP_ER_ADMIN: &str = "lookup_er_admin";
pub const LOOKUP_DIAGNOSIS: &str = "lookup_diagnosis";
pub const LOOKUP_ROOM_TRANSFER: &str = "lookup_room_transfer";
pub const LOOKUP_IMAGING: &str = "lookup_imaging";

/// Event source tables exposed through [`GeminiQuerier::events`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Lab,
    Vitals,
}

impl EventCategory {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "lab" => Ok(Self::Lab),
            "vitals" => Ok(Self::Vitals),
            other => Err(QueryError::invalid_argument(format!(
                "invalid event category '{other}', must be one of: lab, vitals"
            ))),
        }
    }

    fn table_name(self) -> &'static str {
        match self {
            Self::Lab => LAB,
            Self::Vitals => VITALS,
        }
    }
}

fn lookup_columns(schema: &str, name: &str) -> DeclaredTable {
    DeclaredTable::new(schema, name)
        .column("variable", SqlType::Text)
        .column("value", SqlType::Text)
        .column("description", SqlType::Text)
}

fn catalog() -> TableCatalog {
    TableCatalog::new()
        .declare(
            IP_ADMIN,
            DeclaredTable::new("public", "ip_administrative")
                .column("genc_id", SqlType::Integer)
                .column("patient_id_hashed", SqlType::Text)
                .column("gender", SqlType::Text)
                .column("age", SqlType::Integer)
                .column("hospital_id", SqlType::Text)
                .column("admit_date_time", SqlType::Text)
                .column("discharge_date_time", SqlType::Text)
                .column("discharge_disposition", SqlType::Integer),
        )
        .declare(
            ER_ADMIN,
            DeclaredTable::new("public", "er_administrative")
                .column("genc_id", SqlType::Integer)
                .column("admit_via_ambulance", SqlType::Text)
                .column("triage_date_time", SqlType::Timestamp)
                .column("triage_level", SqlType::Text)
                .column("left_er_date_time", SqlType::Timestamp)
                .column("duration_er_stay_derived", SqlType::Float),
        )
        .declare(
            DIAGNOSIS,
            DeclaredTable::new("public", "diagnosis")
                .column("genc_id", SqlType::Integer)
                .column("diagnosis_code", SqlType::Text)
                .column("diagnosis_type", SqlType::Text),
        )
        .declare(
            LAB,
            DeclaredTable::new("public", "lab")
                .column("genc_id", SqlType::Integer)
                .column("lab_test_name_mapped", SqlType::Text)
                .column("result_value", SqlType::Float)
                .column("result_unit", SqlType::Text)
                .column("sample_collection_date_time", SqlType::Timestamp),
        )
        .declare(
            VITALS,
            DeclaredTable::new("public", "vitals")
                .column("genc_id", SqlType::Integer)
                .column("measurement_mapped", SqlType::Text)
                .column("measurement_value", SqlType::Float)
                .column("measure_date_time", SqlType::Timestamp),
        )
        .declare(
            PHARMACY,
            DeclaredTable::new("public", "pharmacy")
                .column("genc_id", SqlType::Integer)
                .column("med_id_generic_name_raw", SqlType::Text)
                .column("med_order_start_date_time", SqlType::Timestamp),
        )
        .declare(
            INTERVENTION,
            DeclaredTable::new("public", "intervention")
                .column("genc_id", SqlType::Integer)
                .column("intervention_code", SqlType::Text)
                .column("intervention_episode_start_date", SqlType::Timestamp),
        )
        .declare(
            IP_SCU,
            DeclaredTable::new("public", "ip_scu")
                .column("genc_id", SqlType::Integer)
                .column("scu_unit_number", SqlType::Integer)
                .column("scu_admit_date_time", SqlType::Timestamp)
                .column("scu_discharge_date_time", SqlType::Timestamp),
        )
        .declare(
            ROOM_TRANSFER,
            DeclaredTable::new("public", "room_transfer")
                .column("genc_id", SqlType::Integer)
                .column("checkin_date_time", SqlType::Timestamp)
                .column("checkout_date_time", SqlType::Timestamp)
                .column("medical_service", SqlType::Text),
        )
        .declare(
            BLOOD_TRANSFUSION,
            DeclaredTable::new("public", "blood_transfusion")
                .column("genc_id", SqlType::Integer)
                .column("issue_date_time", SqlType::Text)
                .column("rbc_mapped", SqlType::Boolean)
                .column("blood_product_raw", SqlType::Text),
        )
        .declare(
            IMAGING,
            DeclaredTable::new("public", "imaging")
                .column("genc_id", SqlType::Integer)
                .column("imaging_test_name_mapped", SqlType::Text)
                .column("imaging_test_name_raw", SqlType::Text)
                .column("performed_date_time", SqlType::Timestamp),
        )
        .declare(
            DERIVED_VARIABLES,
            DeclaredTable::new("public", "derived_variables")
                .column("genc_id", SqlType::Integer)
                .column("los_derived", SqlType::Float)
                .column("er_los_derived", SqlType::Float)
                .column("icu_admit_derived", SqlType::Boolean)
                .column("palliative_derived", SqlType::Boolean),
        )
        .declare(
            LOOKUP_IP_ADMIN,
            lookup_columns("public", "lookup_ip_administrative"),
        )
        .declare(
            LOOKUP_ER_ADMIN,
            lookup_columns("public", "lookup_er_administrative"),
        )
        .declare(LOOKUP_DIAGNOSIS, lookup_columns("public", "lookup_diagnosis"))
        .declare(
            LOOKUP_ROOM_TRANSFER,
            lookup_columns("public", "lookup_room_transfer"),
        )
        .declare(LOOKUP_IMAGING, lookup_columns("public", "lookup_imaging"))
}

const COLUMN_MAP: [(&str, &str); 19] = [
    ("genc_id", ENCOUNTER_ID),
    ("patient_id_hashed", SUBJECT_ID),
    ("admit_date_time", ADMIT_TIMESTAMP),
    ("discharge_date_time", DISCHARGE_TIMESTAMP),
    ("gender", SEX),
    ("hospital_id", HOSPITAL_ID),
    ("diagnosis_code", DIAGNOSIS_CODE),
    ("result_value", EVENT_VALUE),
    ("result_unit", EVENT_VALUE_UNIT),
    ("lab_test_name_mapped", EVENT_NAME),
    ("sample_collection_date_time", EVENT_TIMESTAMP),
    ("measurement_mapped", EVENT_NAME),
    ("measurement_value", EVENT_VALUE),
    ("measure_date_time", EVENT_TIMESTAMP),
    ("triage_date_time", ER_ADMIT_TIMESTAMP),
    ("left_er_date_time", ER_DISCHARGE_TIMESTAMP),
    ("duration_er_stay_derived", LENGTH_OF_STAY_IN_ER),
    ("scu_admit_date_time", SCU_ADMIT_TIMESTAMP),
    ("scu_discharge_date_time", SCU_DISCHARGE_TIMESTAMP),
];

/// Querier for the GEMINI hospital EHR extract.
#[derive(Debug, Clone)]
pub struct GeminiQuerier {
    base: DatasetQuerier,
}

impl GeminiQuerier {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            base: DatasetQuerier::new(catalog(), executor).with_column_map(COLUMN_MAP),
        }
    }

    /// The underlying dataset querier, for raw table access.
    pub fn base(&self) -> &DatasetQuerier {
        &self.base
    }

    /// A lookup table restricted to one coded variable.
    fn lookup(&self, table: &str, variable: &str) -> Result<Subquery> {
        let table = self.base.table(table)?;
        ConditionEquals::new("variable", variable).apply(table)
    }

    /// Emergency room administrative records.
    ///
    /// Optional filters: `before_date`, `after_date`, `years`, `months`,
    /// `triage_level`, `limit`.
    pub fn er_admin(&self, args: &ArgBundle) -> Result<QueryInterface> {
        let table = self.base.table(ER_ADMIN)?;

        let operations = vec![
            Operation::before_date(ER_ADMIT_TIMESTAMP, QueryArg::new("before_date")),
            Operation::after_date(ER_ADMIT_TIMESTAMP, QueryArg::new("after_date")),
            Operation::in_years(ER_ADMIT_TIMESTAMP, QueryArg::new("years")),
            Operation::in_months(ER_ADMIT_TIMESTAMP, QueryArg::new("months")),
            Operation::condition_in("triage_level", QueryArg::new("triage_level")).to_str(),
            Operation::limit(QueryArg::new("limit")),
        ];
        let table = run_pipeline(table, &operations, args)?;

        Ok(self.base.interface(table))
    }

    /// In-patient encounters with the discharge disposition described.
    ///
    /// Optional filters: `before_date`, `after_date`, `years`, `months`,
    /// `hospitals`, `sex`, `died` (+ `died_binarize_col`), `limit`.
    pub fn patient_encounters(
        &self,
        er_admin_table: Option<TableExpr>,
        drop_null_subject_ids: bool,
        args: &ArgBundle,
    ) -> Result<QueryInterface> {
        let table = self.base.table(IP_ADMIN)?;

        let table = if drop_null_subject_ids {
            DropNulls::new(SUBJECT_ID).apply(table)?
        } else {
            table
        };

        // Source stores the admission window as text.
        let table = Cast::new(
            vec![ADMIT_TIMESTAMP, DISCHARGE_TIMESTAMP],
            SqlType::Timestamp,
        )
        .apply(table)?;

        let lookup = self.lookup(LOOKUP_IP_ADMIN, "discharge_disposition")?;
        let table = Join::new(lookup, ("discharge_disposition", "value"))
            .coerce(SqlType::Integer)
            .columns("description")
            .left_outer()
            .apply(table)?;
        let table = Rename::new([("description", "discharge_description")]).apply(table)?;

        let table = match er_admin_table {
            Some(er) => {
                let er = er.into_subquery();
                assert_has_columns(&er, &[ENCOUNTER_ID], "er_admin_table")?;
                Join::new(er, ENCOUNTER_ID).apply(table)?
            }
            None => table,
        };

        let args = default_died_for_binarize(args);
        let operations = vec![
            Operation::before_date(ADMIT_TIMESTAMP, QueryArg::new("before_date")),
            Operation::after_date(ADMIT_TIMESTAMP, QueryArg::new("after_date")),
            Operation::in_years(ADMIT_TIMESTAMP, QueryArg::new("years")),
            Operation::in_months(ADMIT_TIMESTAMP, QueryArg::new("months")),
            Operation::condition_in(HOSPITAL_ID, QueryArg::new("hospitals")).to_str(),
            Operation::condition_in(SEX, QueryArg::new("sex")).to_str(),
            Operation::condition_equals("discharge_description", "Died")
                .negate_if(died_arg())
                .binarize(QueryArg::optional("died_binarize_col")),
            Operation::limit(QueryArg::new("limit")),
        ];
        let table = run_pipeline(table, &operations, &args)?;

        Ok(self.base.interface(table))
    }

    /// Diagnosis records with the diagnosis type described.
    ///
    /// Optional filters: `diagnosis_codes`, `diagnosis_types`, `limit`.
    pub fn diagnoses(&self, args: &ArgBundle) -> Result<QueryInterface> {
        let table = self.base.table(DIAGNOSIS)?;

        let lookup = self.lookup(LOOKUP_DIAGNOSIS, "diagnosis_type")?;
        let table = Join::new(lookup, ("diagnosis_type", "value"))
            .columns("description")
            .left_outer()
            .apply(table)?;
        let table = Rename::new([("description", "diagnosis_type_description")]).apply(table)?;
        let table = ReorderAfter::new("diagnosis_type_description", "diagnosis_type")
            .apply(table)?;
        let table = Trim::new(DIAGNOSIS_CODE).apply(table)?;

        let operations = vec![
            Operation::condition_in(DIAGNOSIS_CODE, QueryArg::new("diagnosis_codes")).to_str(),
            Operation::condition_in("diagnosis_type", QueryArg::new("diagnosis_types")).to_str(),
            Operation::limit(QueryArg::new("limit")),
        ];
        let table = run_pipeline(table, &operations, args)?;

        Ok(self.base.interface(table))
    }

    /// Encounters outer-joined with their diagnoses.
    ///
    /// Optional filters: `limit`.
    pub fn patient_diagnoses(
        &self,
        diagnoses_table: Option<TableExpr>,
        patient_encounters_table: Option<TableExpr>,
        args: &ArgBundle,
    ) -> Result<QueryInterface> {
        let diagnoses = match diagnoses_table {
            Some(diagnoses) => diagnoses.into_subquery(),
            None => self.diagnoses(&ArgBundle::new())?.query().clone(),
        };
        assert_has_columns(
            &diagnoses,
            &[ENCOUNTER_ID, DIAGNOSIS_CODE],
            "diagnoses_table",
        )?;

        let encounters = match patient_encounters_table {
            Some(encounters) => encounters.into_subquery(),
            None => self
                .patient_encounters(None, true, &ArgBundle::new())?
                .query()
                .clone(),
        };
        assert_has_columns(
            &encounters,
            &[ENCOUNTER_ID, SUBJECT_ID],
            "patient_encounters_table",
        )?;

        let table = Join::new(diagnoses, ENCOUNTER_ID)
            .left_outer()
            .apply(encounters)?;

        let operations = vec![Operation::limit(QueryArg::new("limit"))];
        let table = run_pipeline(table, &operations, args)?;

        Ok(self.base.interface(table))
    }

    /// Room transfers with the medical service described.
    ///
    /// Optional filters: `limit`.
    pub fn room_transfers(&self, args: &ArgBundle) -> Result<QueryInterface> {
        let table = self.base.table(ROOM_TRANSFER)?;

        let lookup = self.lookup(LOOKUP_ROOM_TRANSFER, "medical_service")?;
        let table = Join::new(lookup, ("medical_service", "value"))
            .columns("description")
            .left_outer()
            .apply(table)?;
        let table = Rename::new([("description", "transfer_description")]).apply(table)?;

        let operations = vec![Operation::limit(QueryArg::new("limit"))];
        let table = run_pipeline(table, &operations, args)?;

        Ok(self.base.interface(table))
    }

    /// Every care-unit stay, combined across the IP, SCU, ER, and
    /// room-transfer sources into one provenance-tagged table.
    ///
    /// Optional filters: `limit`.
    pub fn care_units(
        &self,
        patient_encounters_table: Option<TableExpr>,
        args: &ArgBundle,
    ) -> Result<QueryInterface> {
        let shape = FilterColumns::new(vec![ENCOUNTER_ID, "admit", "discharge", CARE_UNIT]);

        let er = self.er_admin(&ArgBundle::new())?.query().clone();
        let er = Rename::new([
            (ER_ADMIT_TIMESTAMP, "admit"),
            (ER_DISCHARGE_TIMESTAMP, "discharge"),
        ])
        .apply(er)?;
        let er = Literal::new("ER", CARE_UNIT).apply(er)?;
        let er = shape.apply(er)?;

        let scu = self.base.table(IP_SCU)?;
        let scu = Rename::new([
            (SCU_ADMIT_TIMESTAMP, "admit"),
            (SCU_DISCHARGE_TIMESTAMP, "discharge"),
        ])
        .apply(scu)?;
        let scu = Literal::new("SCU", CARE_UNIT).apply(scu)?;
        let scu = shape.apply(scu)?;

        let ip = self.base.table(IP_ADMIN)?;
        let ip = Rename::new([
            (ADMIT_TIMESTAMP, "admit"),
            (DISCHARGE_TIMESTAMP, "discharge"),
        ])
        .apply(ip)?;
        let ip = Literal::new("IP", CARE_UNIT).apply(ip)?;
        let ip = shape.apply(ip)?;

        let rt = self.room_transfers(&ArgBundle::new())?.query().clone();
        let rt = Rename::new([
            ("checkin_date_time", "admit"),
            ("checkout_date_time", "discharge"),
        ])
        .apply(rt)?;
        let rt = Rename::new([("transfer_description", CARE_UNIT)]).apply(rt)?;
        let rt = shape.apply(rt)?;

        let table = union_all(vec![er.select(), scu.select(), ip.select(), rt.select()])?;

        let table = match patient_encounters_table {
            Some(encounters) => {
                let encounters = encounters.into_subquery();
                assert_has_columns(
                    &encounters,
                    &[ENCOUNTER_ID, SUBJECT_ID],
                    "patient_encounters_table",
                )?;
                Join::new(encounters, ENCOUNTER_ID).apply(table)?
            }
            None => table,
        };

        let operations = vec![Operation::limit(QueryArg::new("limit"))];
        let table = run_pipeline(table, &operations, args)?;

        Ok(self.base.interface(table))
    }

    /// Lab or vitals events under the standard event column names.
    ///
    /// Rows with null or empty event names are dropped unless
    /// `keep_null_names` is set. Optional filters: `event_names`,
    /// `before_date`, `after_date`, `years`, `months`,
    /// `event_name_substring`, `limit`.
    pub fn events(
        &self,
        category: EventCategory,
        patient_encounters_table: Option<TableExpr>,
        drop_null_event_names: bool,
        drop_null_event_values: bool,
        args: &ArgBundle,
    ) -> Result<QueryInterface> {
        let table = self.base.table(category.table_name())?;

        let table = if drop_null_event_names {
            let table = DropNulls::new(EVENT_NAME).apply(table)?;
            ConditionEquals::new(EVENT_NAME, "")
                .to_str()
                .negated()
                .apply(table)?
        } else {
            table
        };

        let table = if drop_null_event_values {
            DropNulls::new(EVENT_VALUE).apply(table)?
        } else {
            table
        };

        let operations = vec![
            Operation::condition_in(EVENT_NAME, QueryArg::new("event_names")).to_str(),
            Operation::before_date(EVENT_TIMESTAMP, QueryArg::new("before_date")),
            Operation::after_date(EVENT_TIMESTAMP, QueryArg::new("after_date")),
            Operation::in_years(EVENT_TIMESTAMP, QueryArg::new("years")),
            Operation::in_months(EVENT_TIMESTAMP, QueryArg::new("months")),
            Operation::condition_substring(EVENT_NAME, QueryArg::new("event_name_substring"))
                .to_str(),
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
                Join::new(encounters, ENCOUNTER_ID).apply(table)?
            }
            None => table,
        };

        Ok(self.base.interface(table))
    }

    /// Blood transfusion records.
    ///
    /// Optional filters: `before_date`, `after_date`, `years`, `months`,
    /// `rbc_mapped`, `blood_product_raw_substring`,
    /// `blood_product_raw_names`, `limit`.
    pub fn blood_transfusions(&self, args: &ArgBundle) -> Result<QueryInterface> {
        let table = self.base.table(BLOOD_TRANSFUSION)?;
        let table = Cast::new("issue_date_time", SqlType::Timestamp).apply(table)?;

        let operations = vec![
            Operation::before_date("issue_date_time", QueryArg::new("before_date")),
            Operation::after_date("issue_date_time", QueryArg::new("after_date")),
            Operation::in_years("issue_date_time", QueryArg::new("years")),
            Operation::in_months("issue_date_time", QueryArg::new("months")),
            Operation::condition_equals("rbc_mapped", QueryArg::new("rbc_mapped")),
            Operation::condition_substring(
                "blood_product_raw",
                QueryArg::new("blood_product_raw_substring"),
            ),
            Operation::condition_in(
                "blood_product_raw",
                QueryArg::new("blood_product_raw_names"),
            )
            .to_str(),
            Operation::limit(QueryArg::new("limit")),
        ];
        let table = run_pipeline(table, &operations, args)?;

        Ok(self.base.interface(table))
    }

    /// Intervention episodes.
    ///
    /// Optional filters: `years`, `limit`.
    pub fn interventions(&self, args: &ArgBundle) -> Result<QueryInterface> {
        let table = self.base.table(INTERVENTION)?;

        let operations = vec![
            Operation::in_years("intervention_episode_start_date", QueryArg::new("years")),
            Operation::limit(QueryArg::new("limit")),
        ];
        let table = run_pipeline(table, &operations, args)?;

        Ok(self.base.interface(table))
    }

    /// Imaging tests with the mapped test name described.
    ///
    /// Optional filters: `before_date`, `after_date`, `years`, `months`,
    /// `test_descriptions`, `raw_test_names`, `limit`.
    pub fn imaging(&self, args: &ArgBundle) -> Result<QueryInterface> {
        let table = self.base.table(IMAGING)?;

        let lookup = self.lookup(LOOKUP_IMAGING, "imaging_test_name_mapped")?;
        let table = Join::new(lookup, ("imaging_test_name_mapped", "value"))
            .coerce(SqlType::Text)
            .columns("description")
            .apply(table)?;
        let table = Rename::new([("description", "imaging_test_description")]).apply(table)?;
        let table = ReorderAfter::new("imaging_test_description", "imaging_test_name_mapped")
            .apply(table)?;

        let operations = vec![
            Operation::before_date("performed_date_time", QueryArg::new("before_date")),
            Operation::after_date("performed_date_time", QueryArg::new("after_date")),
            Operation::in_years("performed_date_time", QueryArg::new("years")),
            Operation::in_months("performed_date_time", QueryArg::new("months")),
            Operation::condition_in(
                "imaging_test_description",
                QueryArg::new("test_descriptions"),
            ),
            Operation::condition_in("imaging_test_name_raw", QueryArg::new("raw_test_names"))
                .to_str(),
            Operation::limit(QueryArg::new("limit")),
        ];
        let table = run_pipeline(table, &operations, args)?;

        Ok(self.base.interface(table))
    }

    /// Derived per-encounter variables, restricted to caller-chosen
    /// columns with the encounter id always kept in front.
    ///
    /// Optional filters: `variables`, `limit`.
    pub fn derived_variables(&self, args: &ArgBundle) -> Result<QueryInterface> {
        let table = self.base.table(DERIVED_VARIABLES)?;

        let variables = QueryArg::new("variables").map(|value| {
            let mut names = value.into_list();
            let encounter = Value::Text(ENCOUNTER_ID.to_string());
            if !names.contains(&encounter) {
                names.insert(0, encounter);
            }
            Value::List(names)
        });

        let operations = vec![
            Operation::keep_columns(variables),
            Operation::limit(QueryArg::new("limit")),
        ];
        let table = run_pipeline(table, &operations, args)?;

        Ok(self.base.interface(table))
    }

    /// Pharmacy orders.
    ///
    /// Optional filters: `limit`.
    pub fn pharmacy(&self, args: &ArgBundle) -> Result<QueryInterface> {
        let table = self.base.table(PHARMACY)?;

        let operations = vec![Operation::limit(QueryArg::new("limit"))];
        let table = run_pipeline(table, &operations, args)?;

        Ok(self.base.interface(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use carelake_core::SqlQuery;
    use carelake_query::RowSet;

    struct NullExecutor;

    #[async_trait]
    impl QueryExecutor for NullExecutor {
        async fn fetch(&self, _query: &SqlQuery) -> Result<RowSet> {
            Ok(RowSet::new(vec!["n".into()], vec![]))
        }
    }

    fn querier() -> GeminiQuerier {
        GeminiQuerier::new(Arc::new(NullExecutor))
    }

    #[test]
    fn test_er_admin_triage_filter_coerces_to_text() {
        let args = ArgBundle::new().set("triage_level", vec![1i64, 2]);
        let query = querier().er_admin(&args).unwrap().to_sql().unwrap();
        assert!(query.sql.contains("triage_level IN ($1, $2)"));
        assert_eq!(
            query.params,
            vec![Value::Text("1".into()), Value::Text("2".into())]
        );
    }

    #[test]
    fn test_patient_encounters_describes_discharge_disposition() {
        let interface = querier()
            .patient_encounters(None, true, &ArgBundle::new())
            .unwrap();
        let table = interface.query();
        assert!(table.has_column("discharge_description"));
        // The lookup value key is never pulled into the output.
        assert!(!table.has_column("value"));

        let sql = interface.to_sql().unwrap().sql;
        assert!(sql.contains("NOT (subject_id IS NULL)"));
        assert!(sql.contains("CAST(admit_timestamp AS TIMESTAMP)"));
        assert!(sql.contains("LEFT OUTER JOIN"));
        assert!(
            sql.contains("CAST(l.discharge_disposition AS INTEGER) = CAST(r.value AS INTEGER)")
        );
    }

    #[test]
    fn test_patient_encounters_died_binarize() {
        let args = ArgBundle::new().set("died_binarize_col", "died");
        let interface = querier().patient_encounters(None, true, &args).unwrap();
        assert!(interface.query().has_column("died"));
        assert!(interface.query().predicate.is_none());
    }

    #[test]
    fn test_diagnoses_orders_description_after_type() {
        let interface = querier().diagnoses(&ArgBundle::new()).unwrap();
        let names = interface.query().column_names();
        let ty = names.iter().position(|n| *n == "diagnosis_type").unwrap();
        assert_eq!(names[ty + 1], "diagnosis_type_description");
        assert!(
            interface
                .to_sql()
                .unwrap()
                .sql
                .contains("TRIM(diagnosis_code)")
        );
    }

    #[test]
    fn test_patient_diagnoses_defaults_and_outer_join() {
        let args = ArgBundle::new().set("limit", 50i64);
        let interface = querier().patient_diagnoses(None, None, &args).unwrap();
        let query = interface.to_sql().unwrap();
        assert!(query.sql.contains("LEFT OUTER JOIN"));
        assert!(query.sql.ends_with("LIMIT 50"));
        assert!(interface.query().has_column(DIAGNOSIS_CODE));
    }

    #[test]
    fn test_care_units_unions_four_sources() {
        let interface = querier().care_units(None, &ArgBundle::new()).unwrap();
        assert_eq!(
            interface.query().column_names(),
            vec![ENCOUNTER_ID, "admit", "discharge", CARE_UNIT]
        );
        let query = interface.to_sql().unwrap();
        assert_eq!(query.sql.matches("UNION ALL").count(), 3);
        // Provenance tags ride along as bind parameters.
        for tag in ["ER", "SCU", "IP"] {
            assert!(query.params.contains(&Value::Text(tag.into())), "{tag}");
        }
    }

    #[test]
    fn test_events_drops_null_and_empty_names() {
        let interface = querier()
            .events(EventCategory::Lab, None, true, false, &ArgBundle::new())
            .unwrap();
        let query = interface.to_sql().unwrap();
        assert!(query.sql.contains("NOT (event_name IS NULL)"));
        assert!(query.sql.contains("NOT (event_name = $1)"));
        assert_eq!(query.params, vec![Value::Text(String::new())]);
    }

    #[test]
    fn test_events_category_parse_rejects_unknown() {
        assert_eq!(EventCategory::parse("vitals").unwrap(), EventCategory::Vitals);
        let err = EventCategory::parse("intervention").unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn test_events_join_encounters_requires_columns() {
        let bad = Subquery::from_table(
            DeclaredTable::new("x", "bare").column("encounter_id", SqlType::Integer),
        );
        let err = querier()
            .events(
                EventCategory::Vitals,
                Some(bad.into()),
                true,
                false,
                &ArgBundle::new(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("patient_encounters_table"));
    }

    #[test]
    fn test_blood_transfusions_deferred_rbc_filter() {
        let args = ArgBundle::new().set("rbc_mapped", true);
        let query = querier()
            .blood_transfusions(&args)
            .unwrap()
            .to_sql()
            .unwrap();
        assert!(query.sql.contains("CAST(issue_date_time AS TIMESTAMP)"));
        assert!(query.sql.contains("rbc_mapped = $1"));
        assert_eq!(query.params, vec![Value::Boolean(true)]);
    }

    #[test]
    fn test_imaging_coerces_lookup_key_to_text() {
        let interface = querier().imaging(&ArgBundle::new()).unwrap();
        let sql = interface.to_sql().unwrap().sql;
        assert!(sql.contains(
            "CAST(l.imaging_test_name_mapped AS TEXT) = CAST(r.value AS TEXT)"
        ));
        assert!(interface.query().has_column("imaging_test_description"));
    }

    #[test]
    fn test_derived_variables_prepends_encounter_id() {
        let args = ArgBundle::new().set("variables", vec!["los_derived"]);
        let interface = querier().derived_variables(&args).unwrap();
        assert_eq!(
            interface.query().column_names(),
            vec![ENCOUNTER_ID, "los_derived"]
        );
    }

    #[test]
    fn test_interventions_and_pharmacy_limits() {
        let args = ArgBundle::new().set("limit", 10i64).set("years", 2019i64);
        let interventions = querier().interventions(&args).unwrap().to_sql().unwrap();
        assert!(
            interventions
                .sql
                .contains("EXTRACT(YEAR FROM intervention_episode_start_date)")
        );
        assert!(interventions.sql.ends_with("LIMIT 10"));

        let pharmacy = querier().pharmacy(&args).unwrap().to_sql().unwrap();
        assert!(pharmacy.sql.ends_with("LIMIT 10"));
    }
}
