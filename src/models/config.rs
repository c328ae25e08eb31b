//! Job configuration structures.
//!
//! The whole run is parameterised by one document (JSON, or TOML when the
//! file name ends in `.toml`). Every key the run depends on is a field here
//! and is checked by [`JobConfig::validate`] before any landing file is
//! touched.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Area, TagLevel};

/// Root job configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig {
    /// Project that owns the catalog, warehouse and DLP resources
    #[serde(default)]
    pub project_id: String,

    /// Default location for templates, taxonomies and jobs (e.g. `eu`)
    #[serde(default)]
    pub resource_location: String,

    /// Where landing files live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Folder layout per landing area
    #[serde(default)]
    pub areas: AreasConfig,

    /// Fallback tag templates per tag level
    #[serde(default)]
    pub default_templates: DefaultTemplates,

    /// Sensitive-data scan parameters
    #[serde(default)]
    pub dlp: DlpConfig,

    /// Catalog export parameters
    #[serde(default)]
    pub extract: ExtractConfig,

    /// REST endpoints and credentials
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl JobConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content, &path.to_string_lossy())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration document, choosing the format by file name.
    pub fn parse(content: &str, name: &str) -> Result<Self> {
        if name.ends_with(".toml") {
            Ok(toml::from_str(content)?)
        } else {
            Ok(serde_json::from_str(content)?)
        }
    }

    /// Validate the keys every command depends on.
    pub fn validate(&self) -> Result<()> {
        require("project_id", &self.project_id)?;
        require("resource_location", &self.resource_location)?;

        match self.storage.backend {
            StorageBackend::Local => require("storage.root", &self.storage.root)?,
            StorageBackend::S3 => require("storage.bucket", &self.storage.bucket)?,
        }

        for area in Area::ALL {
            let paths = self.areas.paths(area);
            if paths.landing == paths.processed || paths.landing == paths.error {
                return Err(AppError::validation(format!(
                    "areas.{}: landing folder must differ from processed and error folders",
                    area
                )));
            }
        }

        if self.api.timeout_secs == 0 {
            return Err(AppError::validation("api.timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Validate the keys the sensitive-data scan depends on.
    pub fn validate_dlp(&self) -> Result<()> {
        require("dlp.topic_id", &self.dlp.topic_id)?;
        require("dlp.subscription_id", &self.dlp.subscription_id)?;
        if self.dlp.timeout_secs == 0 {
            return Err(AppError::validation("dlp.timeout_secs must be > 0"));
        }
        if self.dlp.apply_policy_tags {
            let taxonomy = self.dlp.taxonomy_display_name.as_deref().unwrap_or("");
            require("dlp.taxonomy_display_name", taxonomy)?;
        }
        Ok(())
    }

    /// Validate the keys the catalog export depends on.
    pub fn validate_extract(&self) -> Result<()> {
        require("extract.folder", &self.extract.folder)?;
        require("extract.destination_dataset", &self.extract.destination_dataset)?;
        require("extract.template_table", &self.extract.template_table)?;
        require("extract.tag_table", &self.extract.tag_table)?;
        Ok(())
    }

    /// Location used when nothing more specific is configured.
    pub fn location_or_default<'a>(&'a self, location: Option<&'a str>) -> &'a str {
        location
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&self.resource_location)
    }
}

fn require(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::missing_key(key));
    }
    Ok(())
}

/// Which backend holds the landing areas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root directory for the local backend
    #[serde(default = "defaults::storage_root")]
    pub root: String,

    /// Bucket name for the object storage backend
    #[serde(default)]
    pub bucket: String,

    /// Key prefix inside the bucket
    #[serde(default)]
    pub prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: defaults::storage_root(),
            bucket: String::new(),
            prefix: String::new(),
        }
    }
}

/// Folder overrides for one landing area. Blank entries use the
/// `<area>/landing`, `<area>/processed`, `<area>/error` convention.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AreaConfig {
    #[serde(default)]
    pub landing: String,
    #[serde(default)]
    pub processed: String,
    #[serde(default)]
    pub error: String,
    /// Only files whose name starts with this are picked up
    #[serde(default)]
    pub name_prefix: Option<String>,
}

/// Resolved folder layout for one area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaPaths {
    pub area: Area,
    pub landing: String,
    pub processed: String,
    pub error: String,
    pub name_prefix: Option<String>,
}

/// Folder layout for all areas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AreasConfig {
    #[serde(default)]
    pub templates: AreaConfig,
    #[serde(default)]
    pub tags: AreaConfig,
    #[serde(default)]
    pub taxonomies: AreaConfig,
    #[serde(default)]
    pub dlp: AreaConfig,
}

impl AreasConfig {
    fn get(&self, area: Area) -> &AreaConfig {
        match area {
            Area::Templates => &self.templates,
            Area::Tags => &self.tags,
            Area::Taxonomies => &self.taxonomies,
            Area::Dlp => &self.dlp,
        }
    }

    /// Resolve the folders for an area, filling in conventions.
    pub fn paths(&self, area: Area) -> AreaPaths {
        let cfg = self.get(area);
        let folder = |value: &str, leaf: &str| {
            let trimmed = value.trim().trim_matches('/');
            if trimmed.is_empty() {
                format!("{}/{}", area, leaf)
            } else {
                trimmed.to_string()
            }
        };
        let name_prefix = match &cfg.name_prefix {
            Some(p) if p.is_empty() => None,
            Some(p) => Some(p.clone()),
            None => area.default_name_prefix().map(str::to_string),
        };

        AreaPaths {
            area,
            landing: folder(&cfg.landing, "landing"),
            processed: folder(&cfg.processed, "processed"),
            error: folder(&cfg.error, "error"),
            name_prefix,
        }
    }
}

/// A tag template identified by id and location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub template_id: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Default tag templates per tag level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultTemplates {
    #[serde(default)]
    pub dataset: Option<TemplateRef>,
    #[serde(default)]
    pub table: Option<TemplateRef>,
    #[serde(default)]
    pub column: Option<TemplateRef>,
}

impl DefaultTemplates {
    pub fn for_level(&self, level: TagLevel) -> Option<&TemplateRef> {
        match level {
            TagLevel::Dataset => self.dataset.as_ref(),
            TagLevel::Table => self.table.as_ref(),
            TagLevel::Column => self.column.as_ref(),
        }
    }
}

/// Sensitive-data scan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlpConfig {
    /// Info types inspected when the job file does not list any
    #[serde(default = "defaults::info_types")]
    pub info_types: Vec<String>,

    /// Row sample limit
    #[serde(default = "defaults::max_rows")]
    pub max_rows: u64,

    /// Findings per column must exceed this to count
    #[serde(default)]
    pub min_count: u64,

    #[serde(default)]
    pub location: Option<String>,

    /// Topic the scan job notifies on completion
    #[serde(default)]
    pub topic_id: String,

    /// Subscription the waiter pulls completion messages from
    #[serde(default)]
    pub subscription_id: String,

    #[serde(default = "defaults::dlp_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_ms: u64,

    /// Attach `DLP-<INFO_TYPE>` policy tags to flagged columns
    #[serde(default)]
    pub apply_policy_tags: bool,

    /// Taxonomy holding the generated policy tags
    #[serde(default)]
    pub taxonomy_display_name: Option<String>,

    /// Drop the findings table once read
    #[serde(default)]
    pub cleanup_findings: bool,
}

impl Default for DlpConfig {
    fn default() -> Self {
        Self {
            info_types: defaults::info_types(),
            max_rows: defaults::max_rows(),
            min_count: 0,
            location: None,
            topic_id: String::new(),
            subscription_id: String::new(),
            timeout_secs: defaults::dlp_timeout(),
            poll_interval_ms: defaults::poll_interval(),
            apply_policy_tags: false,
            taxonomy_display_name: None,
            cleanup_findings: false,
        }
    }
}

/// Catalog export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "defaults::extract_folder")]
    pub folder: String,

    #[serde(default)]
    pub destination_dataset: String,

    #[serde(default)]
    pub template_table: String,

    #[serde(default)]
    pub tag_table: String,

    /// Column name to warehouse type for the template report table
    #[serde(default = "defaults::template_schema")]
    pub template_schema: BTreeMap<String, String>,

    /// Column name to warehouse type for the tag report table
    #[serde(default = "defaults::tag_schema")]
    pub tag_schema: BTreeMap<String, String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            folder: defaults::extract_folder(),
            destination_dataset: String::new(),
            template_table: String::new(),
            tag_table: String::new(),
            template_schema: defaults::template_schema(),
            tag_schema: defaults::tag_schema(),
        }
    }
}

/// REST endpoints and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Environment variable holding the OAuth bearer token
    #[serde(default = "defaults::access_token_env")]
    pub access_token_env: String,

    #[serde(default = "defaults::api_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "defaults::catalog_endpoint")]
    pub catalog_endpoint: String,

    #[serde(default = "defaults::bigquery_endpoint")]
    pub bigquery_endpoint: String,

    /// Media upload endpoint for warehouse load jobs
    #[serde(default = "defaults::bigquery_upload_endpoint")]
    pub bigquery_upload_endpoint: String,

    #[serde(default = "defaults::dlp_endpoint")]
    pub dlp_endpoint: String,

    #[serde(default = "defaults::pubsub_endpoint")]
    pub pubsub_endpoint: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            access_token_env: defaults::access_token_env(),
            timeout_secs: defaults::api_timeout(),
            catalog_endpoint: defaults::catalog_endpoint(),
            bigquery_endpoint: defaults::bigquery_endpoint(),
            bigquery_upload_endpoint: defaults::bigquery_upload_endpoint(),
            dlp_endpoint: defaults::dlp_endpoint(),
            pubsub_endpoint: defaults::pubsub_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::collections::BTreeMap;

    pub fn storage_root() -> String {
        ".".into()
    }

    // DLP defaults
    pub fn info_types() -> Vec<String> {
        vec![
            "EMAIL_ADDRESS".into(),
            "PHONE_NUMBER".into(),
            "PERSON_NAME".into(),
            "CREDIT_CARD_NUMBER".into(),
        ]
    }
    pub fn max_rows() -> u64 {
        1000
    }
    pub fn dlp_timeout() -> u64 {
        300
    }
    pub fn poll_interval() -> u64 {
        1000
    }

    // Extract defaults
    pub fn extract_folder() -> String {
        "catalog_extract".into()
    }

    fn schema(columns: &[(&str, &str)]) -> BTreeMap<String, String> {
        columns
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    pub fn template_schema() -> BTreeMap<String, String> {
        schema(&[
            ("project_id", "STRING"),
            ("template_id", "STRING"),
            ("template_location", "STRING"),
            ("field_id", "STRING"),
            ("field_display_name", "STRING"),
            ("field_type", "STRING"),
            ("field_allowed_values", "STRING"),
            ("required_field", "BOOLEAN"),
            ("field_description", "STRING"),
            ("extract_timestamp", "STRING"),
        ])
    }

    pub fn tag_schema() -> BTreeMap<String, String> {
        schema(&[
            ("project_id", "STRING"),
            ("dataset_name", "STRING"),
            ("table_name", "STRING"),
            ("column_name", "STRING"),
            ("template_id", "STRING"),
            ("template_location", "STRING"),
            ("tag_field_id", "STRING"),
            ("tag_field_value", "STRING"),
            ("extract_timestamp", "STRING"),
        ])
    }

    // API defaults
    pub fn access_token_env() -> String {
        "GCP_ACCESS_TOKEN".into()
    }
    pub fn api_timeout() -> u64 {
        60
    }
    pub fn catalog_endpoint() -> String {
        "https://datacatalog.googleapis.com/v1/".into()
    }
    pub fn bigquery_endpoint() -> String {
        "https://bigquery.googleapis.com/bigquery/v2/".into()
    }
    pub fn bigquery_upload_endpoint() -> String {
        "https://bigquery.googleapis.com/upload/bigquery/v2/".into()
    }
    pub fn dlp_endpoint() -> String {
        "https://dlp.googleapis.com/v2/".into()
    }
    pub fn pubsub_endpoint() -> String {
        "https://pubsub.googleapis.com/v1/".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> JobConfig {
        JobConfig::parse(
            r#"{"project_id": "proj", "resource_location": "eu"}"#,
            "config.json",
        )
        .unwrap()
    }

    #[test]
    fn test_minimal_config_is_valid() {
        let config = minimal();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.dlp.max_rows, 1000);
    }

    #[test]
    fn test_missing_project_id() {
        let config = JobConfig::parse(r#"{"resource_location": "eu"}"#, "c.json").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::MissingConfigKey(ref k) if k == "project_id"));
    }

    #[test]
    fn test_s3_requires_bucket() {
        let config = JobConfig::parse(
            r#"{"project_id": "p", "resource_location": "eu", "storage": {"backend": "s3"}}"#,
            "c.json",
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required configuration key: storage.bucket"
        );
    }

    #[test]
    fn test_area_conventions() {
        let config = minimal();
        let tags = config.areas.paths(Area::Tags);
        assert_eq!(tags.landing, "tags/landing");
        assert_eq!(tags.processed, "tags/processed");
        assert_eq!(tags.error, "tags/error");
        assert_eq!(tags.name_prefix, None);

        let templates = config.areas.paths(Area::Templates);
        assert_eq!(templates.name_prefix.as_deref(), Some("template"));
    }

    #[test]
    fn test_area_overrides() {
        let config = JobConfig::parse(
            r#"{
                "project_id": "p",
                "resource_location": "eu",
                "areas": {"tags": {"landing": "/in/tags/", "name_prefix": ""}}
            }"#,
            "c.json",
        )
        .unwrap();
        let tags = config.areas.paths(Area::Tags);
        assert_eq!(tags.landing, "in/tags");
        assert_eq!(tags.processed, "tags/processed");
    }

    #[test]
    fn test_landing_equal_to_processed_rejected() {
        let config = JobConfig::parse(
            r#"{
                "project_id": "p",
                "resource_location": "eu",
                "areas": {"dlp": {"landing": "x", "processed": "x"}}
            }"#,
            "c.json",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_dlp_validation() {
        let mut config = minimal();
        assert!(matches!(
            config.validate_dlp(),
            Err(AppError::MissingConfigKey(_))
        ));
        config.dlp.topic_id = "topic".into();
        config.dlp.subscription_id = "sub".into();
        assert!(config.validate_dlp().is_ok());

        config.dlp.apply_policy_tags = true;
        assert!(config.validate_dlp().is_err());
        config.dlp.taxonomy_display_name = Some("Sensitivity".into());
        assert!(config.validate_dlp().is_ok());
    }

    #[test]
    fn test_toml_config() {
        let config = JobConfig::parse(
            "project_id = \"p\"\nresource_location = \"us\"\n[default_templates.table]\ntemplate_id = \"tbl\"\n",
            "config.toml",
        )
        .unwrap();
        assert_eq!(config.resource_location, "us");
        let table = config.default_templates.for_level(TagLevel::Table).unwrap();
        assert_eq!(table.template_id, "tbl");
        assert!(config.default_templates.for_level(TagLevel::Column).is_none());
    }
}
