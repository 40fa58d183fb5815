//! Shared test helpers

use rust_decimal::Decimal;

use crate::types::RawRecord;

pub const CSV_HEADER: &str = "id,barrio,lat,lng,period,consumo_m3,moroso,amount_due";

/// Two readings of one Centro household, the second one in debt
pub const CENTRO_CSV: &str = "\
id,barrio,lat,lng,period,consumo_m3,moroso,amount_due
H001,Centro,-34.6037,-58.3816,2024-01,45.5,false,0
H001,Centro,-34.6037,-58.3816,2024-02,60,true,1200
";

pub fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

/// CSV with the standard header and the given data lines
pub fn csv(lines: &[&str]) -> String {
    let mut content = String::from(CSV_HEADER);
    for line in lines {
        content.push('\n');
        content.push_str(line);
    }
    content.push('\n');
    content
}

pub fn record(pairs: &[(&str, &str)]) -> RawRecord {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}
