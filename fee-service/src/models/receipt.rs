//! Receipts: immutable records of single payment events.

use super::ledger::{coerce_amount, FeeMonth};
use super::student::deserialize_roll;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sqlx::FromRow;
use validator::Validate;

/// Per-month breakdown captured on a receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiptMonth {
    pub paid: i64,
    pub due: i64,
    pub status: String,
    pub purpose: String,
    pub extra: i64,
    pub date: String,
}

impl ReceiptMonth {
    fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        let amount = |key: &str| obj.get(key).map(coerce_amount).unwrap_or(0);
        let text = |key: &str| obj.get(key).map(text_of).unwrap_or_default();

        Self {
            paid: amount("paid"),
            due: amount("due"),
            status: text("status"),
            purpose: text("purpose"),
            extra: amount("extra"),
            date: text("date"),
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
        other => other.to_string(),
    }
}

/// Ordered month breakdown of a receipt, keyed by the caller's labels.
///
/// Accepts either an object (`{"Jan": {...}}`) or a list of items carrying
/// a `month` (or `name`) label. Later duplicates replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptMonths(Vec<(String, ReceiptMonth)>);

impl ReceiptMonths {
    pub fn normalize(raw: &Value) -> Self {
        let mut months = Self::default();
        match raw {
            Value::Object(obj) => {
                for (key, value) in obj {
                    months.insert(key.clone(), ReceiptMonth::from_value(value));
                }
            }
            Value::Array(items) => {
                for item in items {
                    let label = item
                        .get("month")
                        .or_else(|| item.get("name"))
                        .and_then(Value::as_str)
                        .filter(|label| !label.is_empty());
                    if let Some(label) = label {
                        months.insert(label.to_string(), ReceiptMonth::from_value(item));
                    }
                }
            }
            _ => {}
        }
        months
    }

    pub fn from_json_str(raw: &str) -> Self {
        serde_json::from_str::<Value>(raw)
            .map(|value| Self::normalize(&value))
            .unwrap_or_default()
    }

    fn insert(&mut self, key: String, month: ReceiptMonth) {
        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = month,
            None => self.0.push((key, month)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ReceiptMonth> {
        self.0
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, month)| month)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Amount this receipt collected against the annual charge.
    pub fn annual_paid(&self) -> i64 {
        self.get(FeeMonth::Annual.as_str())
            .map(|month| month.paid)
            .unwrap_or(0)
    }
}

impl Serialize for ReceiptMonths {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, month) in &self.0 {
            map.serialize_entry(key, month)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ReceiptMonths {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self::normalize(&raw))
    }
}

/// A stored receipt. The student fields are a snapshot taken at payment
/// time, not a live reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub name: String,
    pub father: Option<String>,
    pub class_name: String,
    pub roll: String,
    pub date: String,
    pub total_paid: i64,
    pub total_due: i64,
    pub advance: i64,
    pub annual_charge: i64,
    pub months: ReceiptMonths,
    pub receipt_key: String,
    pub receipt_number: String,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub(crate) struct ReceiptRow {
    pub id: i64,
    pub name: String,
    pub father: Option<String>,
    pub class_name: String,
    pub roll: String,
    pub date: String,
    pub total_paid: i64,
    pub total_due: i64,
    pub advance: i64,
    pub annual_charge: i64,
    pub months_json: Option<String>,
    pub receipt_key: String,
    pub receipt_number: String,
    pub created_utc: DateTime<Utc>,
}

impl From<ReceiptRow> for Receipt {
    fn from(row: ReceiptRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            father: row.father,
            class_name: row.class_name,
            roll: row.roll,
            date: row.date,
            total_paid: row.total_paid,
            total_due: row.total_due,
            advance: row.advance,
            annual_charge: row.annual_charge,
            months: row
                .months_json
                .as_deref()
                .map(ReceiptMonths::from_json_str)
                .unwrap_or_default(),
            receipt_key: row.receipt_key,
            receipt_number: row.receipt_number,
            created_utc: row.created_utc,
        }
    }
}

/// Payment submission as parsed by the request layer.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewReceipt {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[serde(default)]
    pub father: Option<String>,
    #[serde(rename = "class", alias = "class_name")]
    #[validate(length(min = 1, message = "class is required"))]
    pub class_name: String,
    #[serde(deserialize_with = "deserialize_roll")]
    #[validate(length(min = 1, message = "roll is required"))]
    pub roll: String,
    pub date: String,
    #[serde(deserialize_with = "deserialize_amount")]
    #[validate(range(min = 0, message = "totalPaid cannot be negative"))]
    pub total_paid: i64,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub total_due: i64,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub advance: i64,
    #[serde(default)]
    pub months: Value,
    #[validate(length(min = 1, message = "receiptKey is required"))]
    pub receipt_key: String,
}

/// Amounts may arrive as numbers or numeric strings; fractions are truncated.
/// The sign is kept so validation can reject negative payments.
fn deserialize_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    fn truncate(f: f64) -> Option<i64> {
        f.is_finite().then(|| f.trunc() as i64)
    }

    let value = Value::deserialize(deserializer)?;
    let amount = match &value {
        Value::Null => Some(0),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    };

    amount.ok_or_else(|| {
        serde::de::Error::custom(format!("amount must be a number, got {}", value))
    })
}

/// Fully-typed values written to the `receipt` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptDraft {
    pub name: String,
    pub father: Option<String>,
    pub class_name: String,
    pub roll: String,
    pub date: String,
    pub total_paid: i64,
    pub total_due: i64,
    pub advance: i64,
    pub annual_charge: i64,
    pub months: ReceiptMonths,
    pub receipt_key: String,
    pub receipt_number: String,
}

/// Result of submitting a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptOutcome {
    Recorded(String),
    /// The idempotency key was seen before; carries the original number.
    Duplicate(String),
}

impl ReceiptOutcome {
    pub fn receipt_number(&self) -> &str {
        match self {
            Self::Recorded(number) | Self::Duplicate(number) => number,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn months_from_object_keep_caller_order() {
        let months = ReceiptMonths::normalize(&json!({
            "Apr": {"paid": 1300, "due": 0, "status": "Paid", "purpose": "Tuition", "date": "2024-04-03"},
            "Annual": {"paid": "500", "extra": 50},
            "May": "oops"
        }));

        assert_eq!(months.len(), 3);
        assert_eq!(months.annual_paid(), 500);
        assert_eq!(months.get("Annual").unwrap().extra, 50);
        assert_eq!(months.get("May"), Some(&ReceiptMonth::default()));
        assert_eq!(months.get("Apr").unwrap().purpose, "Tuition");
    }

    #[test]
    fn months_from_list_use_month_or_name_label() {
        let months = ReceiptMonths::normalize(&json!([
            {"month": "Jan", "paid": 100},
            {"name": "Feb", "paid": 200, "status": "Partial"},
            {"paid": 999},
            {"month": "Jan", "paid": 150}
        ]));

        assert_eq!(months.len(), 2);
        assert_eq!(months.get("Jan").unwrap().paid, 150);
        assert_eq!(months.get("Feb").unwrap().status, "Partial");
        assert_eq!(months.annual_paid(), 0);
    }

    #[test]
    fn months_from_other_shapes_are_empty() {
        assert!(ReceiptMonths::normalize(&json!("Jan")).is_empty());
        assert!(ReceiptMonths::from_json_str("{broken").is_empty());
    }

    #[test]
    fn new_receipt_reads_camel_case_payload() {
        let receipt: NewReceipt = serde_json::from_value(json!({
            "name": "Asha",
            "father": "Ravi",
            "class": "5th",
            "roll": 7,
            "date": "2024-05-01",
            "totalPaid": 1500,
            "totalDue": 0,
            "advance": 0,
            "months": {},
            "receiptKey": "k-1"
        }))
        .unwrap();

        assert_eq!(receipt.class_name, "5th");
        assert_eq!(receipt.roll, "7");
        assert_eq!(receipt.total_paid, 1500);
        assert!(receipt.validate().is_ok());
    }

    #[test]
    fn new_receipt_accepts_numeric_strings_for_amounts() {
        let receipt: NewReceipt = serde_json::from_value(json!({
            "name": "Asha",
            "class": "5th",
            "roll": "7",
            "date": "2024-05-01",
            "totalPaid": " 1200 ",
            "totalDue": "30.9",
            "advance": null,
            "receiptKey": "k-2"
        }))
        .unwrap();

        assert_eq!(receipt.total_paid, 1200);
        assert_eq!(receipt.total_due, 30);
        assert_eq!(receipt.advance, 0);

        let negative: NewReceipt = serde_json::from_value(json!({
            "name": "Asha",
            "class": "5th",
            "roll": "7",
            "date": "2024-05-01",
            "totalPaid": "-5",
            "receiptKey": "k-3"
        }))
        .unwrap();
        assert!(negative.validate().is_err());

        let garbage = serde_json::from_value::<NewReceipt>(json!({
            "name": "Asha",
            "class": "5th",
            "roll": "7",
            "date": "2024-05-01",
            "totalPaid": "lots",
            "receiptKey": "k-4"
        }));
        assert!(garbage.is_err());
    }
}
