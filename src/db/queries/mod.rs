//! Database queries

pub mod household;
pub mod neighborhood;
pub mod stats;

/// ILIKE pattern matching `value` as a literal substring
pub fn contains_pattern(value: &str) -> String {
    let escaped = value
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
