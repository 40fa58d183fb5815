//! Row validation and field rules

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::db::store::StoreError;
use crate::types::{ImportErrorKind, RawRecord};

/// Longest period label the readings table stores
pub const MAX_PERIOD_LEN: usize = 20;

/// Row-scoped failure; the row is skipped and the batch continues
#[derive(Debug, Error)]
pub enum RowError {
    #[error("Faltan campos requeridos: barrio, period, consumo_m3")]
    MissingRequired,

    #[error("Falta el barrio")]
    MissingBarrio,

    #[error("Valor numérico inválido en {field}: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Valor negativo en {field}: {value}")]
    NegativeNumber { field: &'static str, value: String },

    #[error("El período '{0}' supera los 20 caracteres")]
    PeriodTooLong(String),

    #[error("La fila repite barrio, coordenadas y período de la fila {earlier_row} sin columna id; ambas se guardarían en el hogar '{key}'")]
    KeyCollision { earlier_row: usize, key: String },

    #[error("El hogar '{key}' pertenece a otro barrio (id {existing}), no a '{barrio}'")]
    NeighborhoodMismatch { key: String, existing: i64, barrio: String },

    #[error("Error de base de datos: {0}")]
    Store(#[from] StoreError),
}

impl RowError {
    pub fn kind(&self) -> ImportErrorKind {
        match self {
            RowError::NeighborhoodMismatch { .. } | RowError::Store(_) => ImportErrorKind::Persistence,
            _ => ImportErrorKind::Validation,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RowError::Store(e) if e.is_transient())
    }
}

/// Validated import row
#[derive(Debug, Clone, PartialEq)]
pub struct MeterRow {
    /// CSV `id`, only when non-empty
    pub id: Option<String>,
    pub barrio: String,
    /// Raw coordinate text as written in the file, empty when absent
    pub lat_raw: String,
    pub lng_raw: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub period: String,
    pub consumption_m3: Decimal,
    pub amount_due: Decimal,
    pub is_debtor: bool,
}

impl MeterRow {
    pub fn from_record(record: &RawRecord) -> Result<Self, RowError> {
        let barrio = field(record, "barrio");
        let period = field(record, "period");
        let consumption = field(record, "consumo_m3");
        if barrio.is_empty() || period.is_empty() || consumption.is_empty() {
            return Err(RowError::MissingRequired);
        }
        if period.chars().count() > MAX_PERIOD_LEN {
            return Err(RowError::PeriodTooLong(period.to_string()));
        }

        let consumption_m3 = parse_amount("consumo_m3", consumption)?;
        let amount_due = match field(record, "amount_due") {
            "" => Decimal::ZERO,
            value => parse_amount("amount_due", value)?,
        };

        let lat_raw = field(record, "lat");
        let lng_raw = field(record, "lng");

        Ok(Self {
            id: Some(field(record, "id")).filter(|id| !id.is_empty()).map(str::to_string),
            barrio: barrio.to_string(),
            lat_raw: lat_raw.to_string(),
            lng_raw: lng_raw.to_string(),
            latitude: parse_coordinate(lat_raw),
            longitude: parse_coordinate(lng_raw),
            period: period.to_string(),
            consumption_m3,
            amount_due,
            is_debtor: is_debtor_flag(field(record, "moroso")),
        })
    }

    /// `id` if given, else `{neighborhoodId}_{lat}_{lng}` from the raw text
    pub fn household_key(&self, neighborhood_id: i64) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("{}_{}_{}", neighborhood_id, self.lat_raw, self.lng_raw),
        }
    }

    pub fn address(&self, neighborhood_name: &str) -> String {
        format!("{} - Lat: {}, Lng: {}", neighborhood_name, self.lat_raw, self.lng_raw)
    }

    pub fn is_paid(&self) -> bool {
        !self.is_debtor
    }
}

fn field<'a>(record: &'a RawRecord, name: &str) -> &'a str {
    record.get(name).map(|v| v.trim()).unwrap_or("")
}

/// Only the literal strings "true" and "1" mark a debtor
pub fn is_debtor_flag(value: &str) -> bool {
    value == "true" || value == "1"
}

/// Non-negative decimal rounded to cents, half away from zero like NUMERIC
pub fn parse_amount(field: &'static str, value: &str) -> Result<Decimal, RowError> {
    let invalid = || RowError::InvalidNumber { field, value: value.to_string() };
    // Decimal's parser accepts `_` digit separators
    if value.contains('_') {
        return Err(invalid());
    }
    let amount: Decimal = value.parse().map_err(|_| invalid())?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(RowError::NegativeNumber { field, value: value.to_string() });
    }
    Ok(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Coordinate or None when absent, unparsable or not finite
pub fn parse_coordinate(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{dec, record};

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("id", "H001"),
            ("barrio", "Centro"),
            ("lat", "-34.6037"),
            ("lng", "-58.3816"),
            ("period", "2024-01"),
            ("consumo_m3", "45.5"),
            ("moroso", "false"),
            ("amount_due", "0"),
        ]
    }

    fn with(overrides: &[(&'static str, &'static str)]) -> RawRecord {
        let mut pairs = base();
        for (key, value) in overrides {
            pairs.retain(|(k, _)| k != key);
            pairs.push((*key, *value));
        }
        record(&pairs)
    }

    #[test]
    fn test_valid_row() {
        let row = MeterRow::from_record(&with(&[])).unwrap();
        assert_eq!(row.id.as_deref(), Some("H001"));
        assert_eq!(row.consumption_m3, dec("45.5"));
        assert_eq!(row.amount_due, Decimal::ZERO);
        assert_eq!(row.latitude, Some(-34.6037));
        assert!(!row.is_debtor);
        assert!(row.is_paid());
    }

    #[test]
    fn test_missing_required_fields() {
        for missing in ["barrio", "period", "consumo_m3"] {
            let row = MeterRow::from_record(&with(&[(missing, "")]));
            let err = row.unwrap_err();
            assert!(matches!(err, RowError::MissingRequired), "{missing}");
            assert_eq!(err.to_string(), "Faltan campos requeridos: barrio, period, consumo_m3");
            assert_eq!(err.kind(), ImportErrorKind::Validation);
        }
    }

    #[test]
    fn test_absent_columns_are_empty() {
        let row = MeterRow::from_record(&record(&[
            ("barrio", "Centro"),
            ("period", "2024-01"),
            ("consumo_m3", "10"),
        ]))
        .unwrap();
        assert_eq!(row.id, None);
        assert_eq!(row.latitude, None);
        assert_eq!(row.amount_due, Decimal::ZERO);
        assert!(!row.is_debtor);
        assert_eq!(row.household_key(7), "7__");
        assert_eq!(row.address("Centro"), "Centro - Lat: , Lng: ");
    }

    #[test]
    fn test_unparsable_numbers_are_errors_not_zero() {
        let err = MeterRow::from_record(&with(&[("consumo_m3", "abc")])).unwrap_err();
        assert_eq!(err.to_string(), "Valor numérico inválido en consumo_m3: 'abc'");

        let err = MeterRow::from_record(&with(&[("amount_due", "1,200")])).unwrap_err();
        assert!(matches!(err, RowError::InvalidNumber { field: "amount_due", .. }));

        let err = MeterRow::from_record(&with(&[("consumo_m3", "1_000")])).unwrap_err();
        assert!(matches!(err, RowError::InvalidNumber { field: "consumo_m3", .. }));
    }

    #[test]
    fn test_negative_numbers_are_errors() {
        let err = MeterRow::from_record(&with(&[("consumo_m3", "-3")])).unwrap_err();
        assert!(matches!(err, RowError::NegativeNumber { field: "consumo_m3", .. }));
        assert!(MeterRow::from_record(&with(&[("amount_due", "-0")])).is_ok());
    }

    #[test]
    fn test_amounts_round_to_cents() {
        let row = MeterRow::from_record(&with(&[("consumo_m3", "10.005"), ("amount_due", "99.999")])).unwrap();
        assert_eq!(row.consumption_m3, dec("10.01"));
        assert_eq!(row.amount_due, dec("100.00"));
    }

    #[test]
    fn test_debtor_truthiness() {
        assert!(is_debtor_flag("true"));
        assert!(is_debtor_flag("1"));
        for value in ["false", "0", "no", "", "TRUE", "yes", "True"] {
            assert!(!is_debtor_flag(value), "{value}");
        }
    }

    #[test]
    fn test_invalid_coordinates_become_none() {
        let row = MeterRow::from_record(&with(&[("lat", "norte"), ("lng", "NaN")])).unwrap();
        assert_eq!(row.latitude, None);
        assert_eq!(row.longitude, None);
        assert_eq!(row.lat_raw, "norte");
    }

    #[test]
    fn test_household_key_prefers_id() {
        let row = MeterRow::from_record(&with(&[])).unwrap();
        assert_eq!(row.household_key(3), "H001");

        let row = MeterRow::from_record(&with(&[("id", "")])).unwrap();
        assert_eq!(row.household_key(3), "3_-34.6037_-58.3816");
        assert_eq!(row.address("Centro"), "Centro - Lat: -34.6037, Lng: -58.3816");
    }

    #[test]
    fn test_period_length_limit() {
        let err = MeterRow::from_record(&with(&[("period", "2024-01-primera-quincena")])).unwrap_err();
        assert!(matches!(err, RowError::PeriodTooLong(_)));
    }

    #[test]
    fn test_store_errors_are_persistence() {
        let err = RowError::from(StoreError::Conflict("x".to_string()));
        assert_eq!(err.kind(), ImportErrorKind::Persistence);
        assert!(err.is_transient());
    }
}
