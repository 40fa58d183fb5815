//! CSV import types

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

/// One parsed CSV line: header name -> trimmed value
pub type RawRecord = BTreeMap<String, String>;

/// How household status fields react to rows for an already known household
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverwritePolicy {
    /// Every row overwrites debtor flag, debt and reading date
    #[default]
    Always,
    /// Only rows whose period is not older than the last written one overwrite
    NewerPeriod,
}

/// What to do when two rows without `id` synthesize the same household key
/// for the same billing period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyCollisionPolicy {
    /// Merge into one household and record a warning
    #[default]
    Merge,
    /// Record a row error and leave the store untouched
    Reject,
}

/// How neighborhood totals follow reading writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregateMode {
    /// Apply consumption/debt deltas in the row transaction
    #[default]
    Incremental,
    /// Rescan the whole neighborhood subtree after every row
    Full,
}

macro_rules! impl_policy_str {
    ($ty:ty, $( $variant:path => $name:literal ),+ $(,)?) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $( $name => Ok($variant), )+
                    other => Err(format!(
                        "unknown value '{}', expected one of: {}",
                        other,
                        [$( $name ),+].join(", ")
                    )),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $( $variant => $name, )+
                };
                f.write_str(name)
            }
        }
    };
}

impl_policy_str!(OverwritePolicy,
    OverwritePolicy::Always => "always",
    OverwritePolicy::NewerPeriod => "newer-period",
);

impl_policy_str!(KeyCollisionPolicy,
    KeyCollisionPolicy::Merge => "merge",
    KeyCollisionPolicy::Reject => "reject",
);

impl_policy_str!(AggregateMode,
    AggregateMode::Incremental => "incremental",
    AggregateMode::Full => "full",
);

/// Knobs for one import run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub overwrite_policy: OverwritePolicy,
    pub key_collision_policy: KeyCollisionPolicy,
    pub aggregate_mode: AggregateMode,
    /// Attempts per row, including the first one
    pub max_row_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            overwrite_policy: OverwritePolicy::default(),
            key_collision_policy: KeyCollisionPolicy::default(),
            aggregate_mode: AggregateMode::default(),
            max_row_attempts: crate::defaults::DEFAULT_IMPORT_MAX_ROW_ATTEMPTS,
            retry_delay_ms: crate::defaults::DEFAULT_IMPORT_RETRY_DELAY_MS,
        }
    }
}

// =============================================================================
// RESULT
// =============================================================================

/// Row reference in an import error: a 1-based data row or the whole file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRef {
    Row(usize),
    General,
}

impl Serialize for RowRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowRef::Row(row) => serializer.serialize_u64(*row as u64),
            RowRef::General => serializer.serialize_str("general"),
        }
    }
}

/// Import error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportErrorKind {
    Parse,
    Validation,
    Persistence,
}

/// Single failed row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRowError {
    pub row: RowRef,
    pub kind: ImportErrorKind,
    pub error: String,
    pub data: Option<RawRecord>,
}

/// Non-fatal observation about a committed row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportWarning {
    pub row: usize,
    pub message: String,
}

/// Summary of one CSV import
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub records_processed: u32,
    pub neighborhoods_created: u32,
    pub households_created: u32,
    pub readings_created: u32,
    pub readings_updated: u32,
    pub errors: Vec<ImportRowError>,
    pub warnings: Vec<ImportWarning>,
}

// =============================================================================
// MESSAGES
// =============================================================================

/// import.csv request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCsvRequest {
    pub filename: String,
    pub csv_content: String,
}

/// import.csv response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCsvResponse {
    pub filename: String,
    pub size: usize,
    #[serde(flatten)]
    pub result: ImportResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_ref_serializes_number_or_general() {
        assert_eq!(serde_json::to_string(&RowRef::Row(2)).unwrap(), "2");
        assert_eq!(serde_json::to_string(&RowRef::General).unwrap(), "\"general\"");
    }

    #[test]
    fn test_import_result_serializes_camel_case() {
        let mut data = RawRecord::new();
        data.insert("barrio".to_string(), "Centro".to_string());
        let result = ImportResult {
            records_processed: 2,
            errors: vec![ImportRowError {
                row: RowRef::Row(2),
                kind: ImportErrorKind::Validation,
                error: "Faltan campos requeridos: barrio, period, consumo_m3".to_string(),
                data: Some(data),
            }],
            ..Default::default()
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["recordsProcessed"], 2);
        assert_eq!(json["neighborhoodsCreated"], 0);
        assert_eq!(json["errors"][0]["row"], 2);
        assert_eq!(json["errors"][0]["kind"], "validation");
        assert_eq!(json["errors"][0]["data"]["barrio"], "Centro");
    }

    #[test]
    fn test_import_response_flattens_result() {
        let response = ImportCsvResponse {
            filename: "lecturas.csv".to_string(),
            size: 120,
            result: ImportResult {
                readings_created: 3,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["filename"], "lecturas.csv");
        assert_eq!(json["readingsCreated"], 3);
    }

    #[test]
    fn test_policies_parse_from_str() {
        assert_eq!("always".parse::<OverwritePolicy>().unwrap(), OverwritePolicy::Always);
        assert_eq!("Newer-Period".parse::<OverwritePolicy>().unwrap(), OverwritePolicy::NewerPeriod);
        assert_eq!("reject".parse::<KeyCollisionPolicy>().unwrap(), KeyCollisionPolicy::Reject);
        assert_eq!(" full ".parse::<AggregateMode>().unwrap(), AggregateMode::Full);

        let err = "sometimes".parse::<OverwritePolicy>().unwrap_err();
        assert!(err.contains("always, newer-period"));
    }

    #[test]
    fn test_policies_display_round_trips_names() {
        assert_eq!(OverwritePolicy::NewerPeriod.to_string(), "newer-period");
        assert_eq!(AggregateMode::Incremental.to_string(), "incremental");
    }

    #[test]
    fn test_import_options_default() {
        let options = ImportOptions::default();
        assert_eq!(options.overwrite_policy, OverwritePolicy::Always);
        assert_eq!(options.key_collision_policy, KeyCollisionPolicy::Merge);
        assert_eq!(options.aggregate_mode, AggregateMode::Incremental);
        assert!(options.max_row_attempts >= 1);
    }
}
