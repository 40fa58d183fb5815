//! CSV record parser

use thiserror::Error;

use crate::types::RawRecord;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Batch-fatal CSV failure
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("El archivo no es UTF-8 válido: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Comillas sin cerrar en el archivo CSV")]
    UnterminatedQuote,

    #[error("La línea {line} tiene {found} columnas, se esperaban {expected}")]
    RaggedRow { line: u64, expected: usize, found: usize },

    #[error("CSV mal formado: {0}")]
    Csv(#[from] csv::Error),
}

/// Parse a CSV buffer with a header row into header → trimmed value maps.
///
/// Blank lines are skipped. Any malformed line fails the whole buffer.
pub fn parse_records(buffer: &[u8]) -> Result<Vec<RawRecord>, ParseError> {
    let buffer = buffer.strip_prefix(UTF8_BOM).unwrap_or(buffer);
    let content = std::str::from_utf8(buffer)?;

    // Quotes are always escaped in pairs, so an odd count means one never closed
    if content.bytes().filter(|&b| b == b'"').count() % 2 != 0 {
        return Err(ParseError::UnterminatedQuote);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        // A blank or whitespace-only line; a row of empty fields is still a record
        if row.len() == 1 && row.get(0) == Some("") {
            continue;
        }
        if row.len() != headers.len() {
            return Err(ParseError::RaggedRow {
                line: row.position().map(|p| p.line()).unwrap_or_default(),
                expected: headers.len(),
                found: row.len(),
            });
        }
        records.push(
            headers
                .iter()
                .zip(row.iter())
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        );
    }

    Ok(records)
}
