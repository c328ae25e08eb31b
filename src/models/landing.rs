//! Landing areas, landing files and batch results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A landing area: one kind of input dropped by producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    Templates,
    Tags,
    Taxonomies,
    Dlp,
}

impl Area {
    pub const ALL: [Area; 4] = [Area::Templates, Area::Tags, Area::Taxonomies, Area::Dlp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Area::Templates => "templates",
            Area::Tags => "tags",
            Area::Taxonomies => "taxonomies",
            Area::Dlp => "dlp",
        }
    }

    /// Content format expected in this area.
    pub fn format(&self) -> FileFormat {
        match self {
            Area::Tags => FileFormat::Csv,
            Area::Templates | Area::Taxonomies | Area::Dlp => FileFormat::Json,
        }
    }

    /// File name prefix required when none is configured.
    pub fn default_name_prefix(&self) -> Option<&'static str> {
        match self {
            Area::Templates => Some("template"),
            Area::Taxonomies => Some("taxonomy"),
            Area::Tags | Area::Dlp => None,
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content format of a landing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
}

impl FileFormat {
    pub fn suffix(&self) -> &'static str {
        match self {
            FileFormat::Csv => ".csv",
            FileFormat::Json => ".json",
        }
    }
}

/// One unit of input discovered in a landing area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingFile {
    /// Full storage key, e.g. `tags/landing/ds1.tbl1.csv`
    pub key: String,
    /// Last path segment of the key
    pub name: String,
    pub format: FileFormat,
}

impl LandingFile {
    pub fn new(key: impl Into<String>, format: FileFormat) -> Self {
        let key = key.into();
        let name = file_name(&key).to_string();
        Self { key, name, format }
    }

    /// Name without the format suffix.
    pub fn stem(&self) -> &str {
        self.name
            .strip_suffix(self.format.suffix())
            .unwrap_or(&self.name)
    }
}

/// Last `/`-separated segment of a storage key.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Aggregate outcome of one pass over a landing area.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub area: Area,
    /// Files moved to the processed folder
    pub files_processed: usize,
    /// Files left in landing because they could not be read, parsed or moved
    pub files_skipped: usize,
    pub records_processed: usize,
    pub records_failed: usize,
    pub sidecars_written: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    pub fn new(area: Area) -> Self {
        let now = Utc::now();
        Self {
            area,
            files_processed: 0,
            files_skipped: 0,
            records_processed: 0,
            records_failed: 0,
            sidecars_written: 0,
            started_at: now,
            finished_at: now,
        }
    }

    /// True when nothing was found to process.
    pub fn is_empty(&self) -> bool {
        self.files_processed == 0 && self.files_skipped == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landing_file_name_and_stem() {
        let file = LandingFile::new("tags/landing/ds1.tbl1.tmplA.eu.csv", FileFormat::Csv);
        assert_eq!(file.name, "ds1.tbl1.tmplA.eu.csv");
        assert_eq!(file.stem(), "ds1.tbl1.tmplA.eu");
    }

    #[test]
    fn test_file_name_without_folder() {
        assert_eq!(file_name("plain.json"), "plain.json");
    }

    #[test]
    fn test_area_serde_names() {
        let area: Area = serde_json::from_str("\"taxonomies\"").unwrap();
        assert_eq!(area, Area::Taxonomies);
        assert_eq!(Area::Dlp.to_string(), "dlp");
        assert_eq!(Area::Tags.format(), FileFormat::Csv);
    }
}
