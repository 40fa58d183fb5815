//! Reading types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Meter reading for one household and billing period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub id: i64,
    pub household_id: i64,
    pub period: String,
    pub consumption_m3: Decimal,
    pub amount_due: Decimal,
    pub is_paid: bool,
    /// Processing time of the import row, not a CSV value
    pub reading_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable reading fields, overwritten on conflict
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingValues {
    pub consumption_m3: Decimal,
    pub amount_due: Decimal,
    pub is_paid: bool,
    pub reading_date: DateTime<Utc>,
}

/// Values for a reading that does not exist yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub household_id: i64,
    pub period: String,
    pub values: ReadingValues,
}
