//! Sensitive-data scan jobs and findings.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{DlpConfig, string_like};

/// Suffix of the table the scan writes its findings to.
pub const FINDINGS_SUFFIX: &str = "_DLP";

/// Prefix of the policy tags generated from findings.
pub const POLICY_TAG_PREFIX: &str = "DLP-";

const MAX_IDENTIFIER_LEN: usize = 1024;

static PROJECT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9.:-]{0,127}$").expect("valid regex"));

static DATASET_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"));

static TABLE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{L}\p{M}\p{N}\p{Pc}\p{Pd} ]+$").expect("valid regex")
});

fn check_identifier(kind: &str, value: &str, pattern: &Regex) -> Result<()> {
    if value.len() > MAX_IDENTIFIER_LEN || !pattern.is_match(value) {
        return Err(AppError::validation(format!("invalid {kind} '{value}'")));
    }
    Ok(())
}

/// A scan request as dropped in the DLP landing area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlpJobSpec {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(deserialize_with = "string_like")]
    pub dataset_id: String,
    #[serde(alias = "table_id", deserialize_with = "string_like")]
    pub table_name: String,
    #[serde(default)]
    pub info_types: Option<Vec<String>>,
    #[serde(default)]
    pub min_count: Option<u64>,
    #[serde(default)]
    pub max_rows: Option<u64>,
    #[serde(default)]
    pub location: Option<String>,
}

impl DlpJobSpec {
    /// Fill gaps from the job configuration.
    pub fn resolve(
        &self,
        project_id: &str,
        default_location: &str,
        dlp: &DlpConfig,
    ) -> Result<InspectRequest> {
        if self.dataset_id.trim().is_empty() || self.table_name.trim().is_empty() {
            return Err(AppError::validation("dataset_id and table_name are required"));
        }
        let info_types = self
            .info_types
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| dlp.info_types.clone());
        if info_types.is_empty() {
            return Err(AppError::validation("no info types to inspect"));
        }

        let location = self
            .location
            .clone()
            .or_else(|| dlp.location.clone())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| default_location.to_string());

        let project_id = self
            .project_id
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| project_id.to_string());
        check_identifier("project_id", &project_id, &PROJECT_ID)?;
        check_identifier("dataset_id", &self.dataset_id, &DATASET_ID)?;
        check_identifier("table_name", &self.table_name, &TABLE_ID)?;

        Ok(InspectRequest {
            project_id,
            dataset_id: self.dataset_id.clone(),
            table_id: self.table_name.clone(),
            findings_table: findings_table(&self.table_name),
            info_types,
            max_rows: self.max_rows.unwrap_or(dlp.max_rows),
            min_count: self.min_count.unwrap_or(dlp.min_count),
            location,
            topic_id: dlp.topic_id.clone(),
        })
    }
}

/// Name of the findings table for a scanned table.
pub fn findings_table(table: &str) -> String {
    if table.ends_with(FINDINGS_SUFFIX) {
        table.to_string()
    } else {
        format!("{table}{FINDINGS_SUFFIX}")
    }
}

/// Fully resolved inspect job parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectRequest {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    pub findings_table: String,
    pub info_types: Vec<String>,
    pub max_rows: u64,
    pub min_count: u64,
    pub location: String,
    pub topic_id: String,
}

/// Aggregated findings for one column, most frequent info type first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFinding {
    pub field_name: String,
    pub info_types: Vec<String>,
}

impl ColumnFinding {
    /// Build from the comma-joined aggregate the findings query returns.
    pub fn from_aggregate(field_name: impl Into<String>, joined: &str) -> Self {
        Self {
            field_name: field_name.into(),
            info_types: joined
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Policy tag display name for the dominant info type.
    pub fn policy_tag_name(&self) -> Option<String> {
        self.info_types
            .first()
            .map(|t| format!("{POLICY_TAG_PREFIX}{t}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_with_defaults() {
        let spec: DlpJobSpec =
            serde_json::from_value(json!({"dataset_id": "ds", "table_id": "people"})).unwrap();
        let dlp = DlpConfig {
            topic_id: "dlp-done".into(),
            ..DlpConfig::default()
        };
        let req = spec.resolve("proj", "eu", &dlp).unwrap();

        assert_eq!(req.project_id, "proj");
        assert_eq!(req.findings_table, "people_DLP");
        assert_eq!(req.location, "eu");
        assert_eq!(req.max_rows, 1000);
        assert_eq!(req.info_types, dlp.info_types);
        assert_eq!(req.topic_id, "dlp-done");
    }

    #[test]
    fn test_resolve_overrides() {
        let spec: DlpJobSpec = serde_json::from_value(json!({
            "project_id": "other",
            "dataset_id": "ds",
            "table_name": "t",
            "info_types": ["EMAIL_ADDRESS"],
            "min_count": 5,
            "max_rows": 10,
            "location": "us"
        }))
        .unwrap();
        let req = spec.resolve("proj", "eu", &DlpConfig::default()).unwrap();
        assert_eq!(req.project_id, "other");
        assert_eq!(req.info_types, vec!["EMAIL_ADDRESS".to_string()]);
        assert_eq!(req.min_count, 5);
        assert_eq!(req.max_rows, 10);
        assert_eq!(req.location, "us");
    }

    #[test]
    fn test_identifiers_checked_before_query_use() {
        let dlp = DlpConfig::default();
        let spec: DlpJobSpec = serde_json::from_value(
            json!({"dataset_id": "ds` WHERE 1=1 --", "table_name": "t"}),
        )
        .unwrap();
        let err = spec.resolve("proj", "eu", &dlp).unwrap_err();
        assert!(err.to_string().contains("invalid dataset_id"));

        let spec: DlpJobSpec =
            serde_json::from_value(json!({"dataset_id": "ds", "table_name": "a`.b"})).unwrap();
        assert!(spec.resolve("proj", "eu", &dlp).is_err());

        let spec: DlpJobSpec = serde_json::from_value(
            json!({"dataset_id": "ds", "table_name": "t", "project_id": "p`x"}),
        )
        .unwrap();
        assert!(spec.resolve("proj", "eu", &dlp).is_err());

        let spec: DlpJobSpec =
            serde_json::from_value(json!({"dataset_id": "sales_2024", "table_name": "daily-orders"}))
                .unwrap();
        assert_eq!(spec.resolve("proj", "eu", &dlp).unwrap().findings_table, "daily-orders_DLP");
    }

    #[test]
    fn test_findings_table_not_doubled() {
        assert_eq!(findings_table("t_DLP"), "t_DLP");
    }

    #[test]
    fn test_dominant_info_type() {
        let finding = ColumnFinding::from_aggregate("email", "EMAIL_ADDRESS, PERSON_NAME");
        assert_eq!(finding.policy_tag_name().as_deref(), Some("DLP-EMAIL_ADDRESS"));
        assert_eq!(ColumnFinding::from_aggregate("x", "").policy_tag_name(), None);
    }
}
