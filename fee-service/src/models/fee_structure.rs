//! Per-class fee schedule.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Classes listed in every schedule, created with zero fees on first read.
pub const DEFAULT_CLASSES: [&str; 15] = [
    "Nursery",
    "LKG",
    "UKG",
    "1st",
    "2nd",
    "3rd",
    "4th",
    "5th",
    "6th",
    "7th",
    "8th",
    "9th",
    "10th",
    "11th Arts",
    "12th Arts",
];

/// Standard monthly tuition by class.
pub const STANDARD_MONTHLY_FEES: [(&str, i64); 19] = [
    ("Nursery", 1200),
    ("LKG", 1300),
    ("UKG", 1300),
    ("1st", 1300),
    ("2nd", 1300),
    ("3rd", 1300),
    ("4th", 1400),
    ("5th", 1400),
    ("6th", 1500),
    ("7th", 1500),
    ("8th", 1700),
    ("9th", 1900),
    ("10th", 1900),
    ("11th_Medical", 2200),
    ("11th_Commerce", 2100),
    ("11th_Art", 2100),
    ("12th_Medical", 2200),
    ("12th_Commerce", 2100),
    ("12th_Art", 2100),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FeeStructure {
    pub id: i64,
    pub class_name: String,
    pub monthly_fee: i64,
    pub annual_charge: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FeeUpdate {
    #[validate(length(min = 1, message = "class_name is required"))]
    pub class_name: String,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub monthly_fee: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub annual_charge: i64,
}
