//! Student records and the inputs used to create or change them.

use super::ledger::MonthLedger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use validator::Validate;

/// A student enrolled in one session's store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub father: Option<String>,
    pub class_name: String,
    pub roll: String,
    pub previous_due: i64,
    pub advance: i64,
    pub months: MonthLedger,
    pub annual_charge: i64,
    pub created_utc: DateTime<Utc>,
}

/// Raw `student` row; the ledger column is normalized on the way out.
#[derive(Debug, FromRow)]
pub(crate) struct StudentRow {
    pub id: i64,
    pub name: String,
    pub father: Option<String>,
    pub class_name: String,
    pub roll: String,
    pub previous_due: i64,
    pub advance: i64,
    pub months: Option<String>,
    pub annual_charge: i64,
    pub created_utc: DateTime<Utc>,
}

impl From<StudentRow> for Student {
    fn from(row: StudentRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            father: row.father,
            class_name: row.class_name,
            roll: row.roll,
            previous_due: row.previous_due,
            advance: row.advance,
            months: row
                .months
                .as_deref()
                .map(MonthLedger::from_json_str)
                .unwrap_or_default(),
            annual_charge: row.annual_charge,
            created_utc: row.created_utc,
        }
    }
}

/// Fully-typed values written to the `student` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentDraft {
    pub name: String,
    pub father: Option<String>,
    pub class_name: String,
    pub roll: String,
    pub previous_due: i64,
    pub advance: i64,
    pub months: MonthLedger,
}

impl StudentDraft {
    pub fn annual_charge(&self) -> i64 {
        self.months.annual_paid()
    }
}

/// Result of inserting a student keyed by `(class_name, roll)`.
#[derive(Debug, Clone, PartialEq)]
pub enum StudentInsert {
    Created(Student),
    AlreadyExists,
}

impl StudentInsert {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Input for enrolling a student.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewStudent {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[serde(default)]
    pub father: Option<String>,
    #[serde(alias = "class")]
    #[validate(length(min = 1, message = "class_name is required"))]
    pub class_name: String,
    #[serde(deserialize_with = "deserialize_roll")]
    #[validate(length(min = 1, message = "roll is required"))]
    pub roll: String,
    #[serde(default)]
    pub previous_due: i64,
    #[serde(default)]
    pub advance: i64,
    #[serde(default)]
    pub months: Value,
}

impl NewStudent {
    pub fn into_draft(self) -> StudentDraft {
        StudentDraft {
            months: MonthLedger::normalize(&self.months),
            name: self.name,
            father: self.father,
            class_name: self.class_name,
            roll: self.roll,
            previous_due: self.previous_due,
            advance: self.advance,
        }
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub father: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_roll")]
    pub roll: Option<String>,
    #[serde(default)]
    pub previous_due: Option<i64>,
    #[serde(default)]
    pub advance: Option<i64>,
    #[serde(default)]
    pub months: Option<Value>,
}

impl StudentUpdate {
    /// Merges the update over an existing student.
    pub fn apply_to(self, student: &Student) -> StudentDraft {
        StudentDraft {
            name: self.name.unwrap_or_else(|| student.name.clone()),
            father: self.father.or_else(|| student.father.clone()),
            class_name: self
                .class_name
                .filter(|class| !class.is_empty())
                .unwrap_or_else(|| student.class_name.clone()),
            roll: self
                .roll
                .filter(|roll| !roll.is_empty())
                .unwrap_or_else(|| student.roll.clone()),
            previous_due: self.previous_due.unwrap_or(student.previous_due),
            advance: self.advance.unwrap_or(student.advance),
            months: self
                .months
                .map(|raw| MonthLedger::normalize(&raw))
                .unwrap_or_else(|| student.months.clone()),
        }
    }
}

/// Rolls are strings, but clients often send them as bare numbers.
pub(crate) fn deserialize_roll<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "roll must be a string or number, got {}",
            other
        ))),
    }
}

fn deserialize_optional_roll<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "roll must be a string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_student_accepts_numeric_roll_and_class_alias() {
        let student: NewStudent = serde_json::from_value(json!({
            "name": "Asha",
            "class": "5th",
            "roll": 12
        }))
        .unwrap();

        assert_eq!(student.class_name, "5th");
        assert_eq!(student.roll, "12");
        assert!(student.validate().is_ok());

        let draft = student.into_draft();
        assert_eq!(draft.months, MonthLedger::new());
        assert_eq!(draft.annual_charge(), 0);
    }

    #[test]
    fn new_student_requires_identity_fields() {
        let student: NewStudent = serde_json::from_value(json!({
            "name": "",
            "class_name": "5th",
            "roll": ""
        }))
        .unwrap();

        let errors = student.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("roll"));
        assert!(!fields.contains_key("class_name"));
    }
}
