//! Month ledger: the per-student fee obligation broken down into the twelve
//! calendar months plus a single annual charge.
//!
//! Ledgers arrive from callers and from storage as loosely-typed JSON.
//! [`MonthLedger::normalize`] is the only way in, and always yields all
//! thirteen entries with non-negative integer amounts.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A ledger slot: one calendar month or the annual charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeeMonth {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
    Annual,
}

impl FeeMonth {
    /// Every slot in allocation order: calendar months, then `Annual`.
    pub const ALL: [FeeMonth; 13] = [
        FeeMonth::Jan,
        FeeMonth::Feb,
        FeeMonth::Mar,
        FeeMonth::Apr,
        FeeMonth::May,
        FeeMonth::Jun,
        FeeMonth::Jul,
        FeeMonth::Aug,
        FeeMonth::Sep,
        FeeMonth::Oct,
        FeeMonth::Nov,
        FeeMonth::Dec,
        FeeMonth::Annual,
    ];

    /// Key used in the persisted JSON blob.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jan => "Jan",
            Self::Feb => "Feb",
            Self::Mar => "Mar",
            Self::Apr => "Apr",
            Self::May => "May",
            Self::Jun => "Jun",
            Self::Jul => "Jul",
            Self::Aug => "Aug",
            Self::Sep => "Sep",
            Self::Oct => "Oct",
            Self::Nov => "Nov",
            Self::Dec => "Dec",
            Self::Annual => "Annual",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for FeeMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment state of a single ledger slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[default]
    Due,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Due => "Due",
            Self::Partial => "Partial",
            Self::Paid => "Paid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Due" => Some(Self::Due),
            "Partial" => Some(Self::Partial),
            "Paid" => Some(Self::Paid),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `{status, paid, due}` record for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MonthEntry {
    pub status: PaymentStatus,
    pub paid: i64,
    pub due: i64,
}

impl MonthEntry {
    /// Builds an entry from arbitrary JSON. Anything that is not an object
    /// becomes the zero record; unknown statuses fall back to `Due`.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        Self {
            status: obj
                .get("status")
                .and_then(Value::as_str)
                .and_then(PaymentStatus::parse)
                .unwrap_or_default(),
            paid: obj.get("paid").map(coerce_amount).unwrap_or(0),
            due: obj.get("due").map(coerce_amount).unwrap_or(0),
        }
    }
}

/// Coerces a numeric-like JSON value into a non-negative integer amount.
///
/// Integers pass through, floats and numeric strings are truncated, booleans
/// count as 0/1, everything else (and anything negative) becomes 0.
pub fn coerce_amount(value: &Value) -> i64 {
    fn from_float(f: f64) -> Option<i64> {
        f.is_finite().then(|| f.trunc() as i64)
    }

    let amount = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(from_float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(from_float))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    };

    amount.unwrap_or(0).max(0)
}

/// All thirteen ledger entries, always complete.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonthLedger {
    entries: [MonthEntry; 13],
}

impl MonthLedger {
    /// A fresh ledger: every slot `{Due, 0, 0}`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes an arbitrary JSON representation into a closed ledger.
    ///
    /// Missing keys, non-object entries and a missing `Annual` slot are all
    /// replaced by the zero record. Keys outside the thirteen slots are
    /// dropped. Normalizing an already-normalized ledger is a no-op.
    pub fn normalize(raw: &Value) -> Self {
        let mut ledger = Self::default();
        if let Some(obj) = raw.as_object() {
            for month in FeeMonth::ALL {
                if let Some(value) = obj.get(month.as_str()) {
                    ledger.entries[month.index()] = MonthEntry::from_value(value);
                }
            }
        }
        ledger
    }

    /// Parses the persisted JSON text; unreadable text yields a fresh ledger.
    pub fn from_json_str(raw: &str) -> Self {
        serde_json::from_str::<Value>(raw)
            .map(|value| Self::normalize(&value))
            .unwrap_or_default()
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn get(&self, month: FeeMonth) -> &MonthEntry {
        &self.entries[month.index()]
    }

    pub fn get_mut(&mut self, month: FeeMonth) -> &mut MonthEntry {
        &mut self.entries[month.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeeMonth, &MonthEntry)> {
        FeeMonth::ALL.into_iter().zip(self.entries.iter())
    }

    /// Outstanding amount carried into the next session: the sum of `due`
    /// over all thirteen slots.
    pub fn carry_forward(&self) -> i64 {
        self.entries
            .iter()
            .fold(0i64, |total, entry| total.saturating_add(entry.due))
    }

    pub fn total_paid(&self) -> i64 {
        self.entries
            .iter()
            .fold(0i64, |total, entry| total.saturating_add(entry.paid))
    }

    /// Amount collected against the annual charge.
    pub fn annual_paid(&self) -> i64 {
        self.get(FeeMonth::Annual).paid
    }
}

impl Serialize for MonthLedger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (month, entry) in self.iter() {
            map.serialize_entry(month.as_str(), entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MonthLedger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self::normalize(&raw))
    }
}
