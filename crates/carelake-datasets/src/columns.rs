//! Standard column names shared by the dataset queriers.
//!
//! Each dataset maps its source column names onto these on table
//! resolution, so downstream feature code sees one vocabulary regardless
//! of warehouse.

pub const SUBJECT_ID: &str = "subject_id";
pub const ENCOUNTER_ID: &str = "encounter_id";
pub const HOSPITAL_ID: &str = "hospital_id";

pub const SEX: &str = "sex";
pub const AGE: &str = "age";
pub const DATE_OF_DEATH: &str = "date_of_death";

pub const ADMIT_TIMESTAMP: &str = "admit_timestamp";
pub const DISCHARGE_TIMESTAMP: &str = "discharge_timestamp";
pub const ER_ADMIT_TIMESTAMP: &str = "er_admit_timestamp";
pub const ER_DISCHARGE_TIMESTAMP: &str = "er_discharge_timestamp";
pub const SCU_ADMIT_TIMESTAMP: &str = "scu_admit_timestamp";
pub const SCU_DISCHARGE_TIMESTAMP: &str = "scu_discharge_timestamp";
pub const LENGTH_OF_STAY_IN_ER: &str = "length_of_stay_in_er";

pub const DIAGNOSIS_CODE: &str = "diagnosis_code";
pub const DIAGNOSIS_TITLE: &str = "diagnosis_title";
pub const DIAGNOSIS_VERSION: &str = "diagnosis_version";

pub const EVENT_NAME: &str = "event_name";
pub const EVENT_VALUE: &str = "event_value";
pub const EVENT_VALUE_UNIT: &str = "event_value_unit";
pub const EVENT_TIMESTAMP: &str = "event_timestamp";
pub const EVENT_CATEGORY: &str = "event_category";

pub const CARE_UNIT: &str = "care_unit";
