// src/pipeline/parse.rs

//! Landing file parsing: bytes to raw records.

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{FileFormat, LandingFile, RawRecord};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Records read from one landing file.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    /// Column names in source order
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
}

/// Parse a landing file into raw records.
///
/// CSV files need a header row; every data row becomes one record of string
/// values. JSON files hold an object (one record) or an array of objects.
/// Anything else is a whole-file parse error.
pub fn parse_file(file: &LandingFile, bytes: &[u8]) -> Result<ParsedFile> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match file.format {
        FileFormat::Csv => parse_csv(&file.name, bytes),
        FileFormat::Json => parse_json(&file.name, bytes),
    }
}

fn parse_csv(name: &str, bytes: &[u8]) -> Result<ParsedFile> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::parse(name, e))?
        .iter()
        .map(str::to_string)
        .collect();

    if columns.is_empty() || columns.iter().all(String::is_empty) {
        return Err(AppError::parse(name, "missing header row"));
    }
    for (i, column) in columns.iter().enumerate() {
        if column.is_empty() {
            return Err(AppError::parse(name, format!("column {} has no name", i + 1)));
        }
        if columns[..i].contains(column) {
            return Err(AppError::parse(name, format!("duplicate column '{column}'")));
        }
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| AppError::parse(name, e))?;
        let record: RawRecord = columns
            .iter()
            .zip(row.iter())
            .map(|(column, cell)| (column.clone(), Value::String(cell.to_string())))
            .collect();
        records.push(record);
    }

    Ok(ParsedFile { columns, records })
}

fn parse_json(name: &str, bytes: &[u8]) -> Result<ParsedFile> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| AppError::parse(name, e))?;

    let records = match value {
        Value::Object(map) => vec![map],
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(AppError::parse(
                    name,
                    format!("element {} is not an object: {}", i, other),
                )),
            })
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(AppError::parse(
                name,
                format!("expected an object or an array, got {other}"),
            ));
        }
    };

    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    Ok(ParsedFile { columns, records })
}
