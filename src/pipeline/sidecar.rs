// src/pipeline/sidecar.rs

//! Per-file error sidecars.
//!
//! A sidecar collects the raw form of every record that failed while its
//! landing file was processed. It is staged in memory, created on the first
//! failure and persisted as `error_<file name>` once the file is done. CSV
//! sidecars keep the source columns plus an `error_reason` column; JSON
//! sidecars are an array of the failed objects with an `error_reason` key.

use serde_json::Value;

use crate::error::Result;
use crate::models::{FileFormat, LandingFile, RawRecord};
use crate::storage::join_key;

/// Column or key carrying the failure context.
pub const ERROR_COLUMN: &str = "error_reason";

/// Failed records of one landing file.
#[derive(Debug, Clone)]
pub struct ErrorSidecar {
    source_name: String,
    format: FileFormat,
    columns: Vec<String>,
    rows: Vec<(RawRecord, String)>,
}

impl ErrorSidecar {
    pub fn new(file: &LandingFile, columns: &[String]) -> Self {
        Self {
            source_name: file.name.clone(),
            format: file.format,
            columns: columns.to_vec(),
            rows: Vec::new(),
        }
    }

    /// Append a failed record with its reason.
    pub fn push(&mut self, record: &RawRecord, reason: impl Into<String>) {
        self.rows.push((record.clone(), reason.into()));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sidecar file name for a landing file name.
    pub fn file_name(source_name: &str) -> String {
        format!("error_{source_name}")
    }

    /// Storage key inside an error folder.
    pub fn key(&self, error_folder: &str) -> String {
        join_key(error_folder, &Self::file_name(&self.source_name))
    }

    /// Render the staged rows in the source file's format.
    pub fn render(&self) -> Result<Vec<u8>> {
        match self.format {
            FileFormat::Csv => self.render_csv(),
            FileFormat::Json => self.render_json(),
        }
    }

    fn render_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        header.push(ERROR_COLUMN);
        writer.write_record(&header)?;

        for (record, reason) in &self.rows {
            let mut row: Vec<String> = self
                .columns
                .iter()
                .map(|c| record.get(c).map(cell).unwrap_or_default())
                .collect();
            row.push(reason.clone());
            writer.write_record(&row)?;
        }

        writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()).into())
    }

    fn render_json(&self) -> Result<Vec<u8>> {
        let items: Vec<Value> = self
            .rows
            .iter()
            .map(|(record, reason)| {
                let mut item = record.clone();
                item.insert(ERROR_COLUMN.to_string(), Value::String(reason.clone()));
                Value::Object(item)
            })
            .collect();
        Ok(serde_json::to_vec_pretty(&items)?)
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
