// src/models/mod.rs

//! Domain models for the catalog steward.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod dlp;
mod extract;
mod landing;
mod record;
mod tag;
mod taxonomy;
mod template;

// Re-export all public types
pub use config::{
    ApiConfig, AreaConfig, AreaPaths, AreasConfig, DefaultTemplates, DlpConfig, ExtractConfig,
    JobConfig, LoggingConfig, StorageBackend, StorageConfig, TemplateRef,
};
pub use dlp::{ColumnFinding, DlpJobSpec, FINDINGS_SUFFIX, InspectRequest, POLICY_TAG_PREFIX, findings_table};
pub use extract::{TagInfoRow, TemplateInfoRow};
pub use landing::{Area, BatchResult, FileFormat, LandingFile, file_name};
pub use record::{NormalizedRecord, RawRecord, normalize};
pub use tag::{EntryTarget, Tag, TagFileSpec, TagLevel, TagValue};
pub use taxonomy::{PolicyTag, PolicyTagSpec, Taxonomy, TaxonomyConfig};
pub use template::{
    FieldSpec, FieldType, TagTemplate, TemplateConfig, TemplateField, parse_template_path,
    template_path,
};

use serde::{Deserialize, Deserializer};

/// Accept a string, number or boolean where an identifier is expected.
///
/// Normalization turns all-digit cells into integers; identifiers such as a
/// numeric dataset id must still deserialize as text.
pub(crate) fn string_like<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!("expected a string, got {other}"))),
    }
}
