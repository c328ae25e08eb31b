// src/services/templates.rs

//! Template area executor: registers tag templates.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use crate::error::Result;
use crate::models::{LandingFile, NormalizedRecord, TemplateConfig};
use crate::pipeline::RecordOperation;
use crate::services::CatalogService;

/// Creates one tag template per record, replacing any existing one.
pub struct TemplateExecutor {
    catalog: Arc<dyn CatalogService>,
    project_id: String,
    default_location: String,
}

impl TemplateExecutor {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        project_id: impl Into<String>,
        default_location: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            project_id: project_id.into(),
            default_location: default_location.into(),
        }
    }
}

#[async_trait]
impl RecordOperation for TemplateExecutor {
    fn name(&self) -> &str {
        "templates"
    }

    async fn apply(&self, _file: &LandingFile, record: &NormalizedRecord) -> Result<()> {
        let config: TemplateConfig = record.to_typed()?;
        let template = config.to_template(&self.project_id, &self.default_location)?;

        // Recreating drops every tag attached to the old template.
        if self.catalog.get_template(&template.name).await?.is_some() {
            debug!("Deleting existing template {}", template.name);
            match self.catalog.delete_template(&template.name).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        self.catalog.create_template(&template).await?;
        info!(
            "Created template {} with {} fields",
            template.name,
            template.fields.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileFormat, Tag};
    use crate::services::memory::MemoryCatalog;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn file() -> LandingFile {
        LandingFile::new("templates/landing/template_gov.json", FileFormat::Json)
    }

    fn record(value: serde_json::Value) -> NormalizedRecord {
        NormalizedRecord::from(value.as_object().cloned().unwrap())
    }

    fn governance(fields: serde_json::Value) -> NormalizedRecord {
        record(json!({
            "template_id": "data_governance",
            "display_name": "Data Governance",
            "fields": fields
        }))
    }

    #[tokio::test]
    async fn test_creates_template_in_default_location() {
        let catalog = Arc::new(MemoryCatalog::new());
        let executor = TemplateExecutor::new(catalog.clone(), "proj", "eu");

        executor
            .apply(
                &file(),
                &governance(json!([{"id": "owner", "display_name": "Owner", "type": "string"}])),
            )
            .await
            .unwrap();

        let template = catalog
            .template("projects/proj/locations/eu/tagTemplates/data_governance")
            .unwrap();
        assert_eq!(template.display_name, "Data Governance");
        assert!(template.fields.contains_key("owner"));
    }

    #[tokio::test]
    async fn test_existing_template_replaced() {
        let catalog = Arc::new(MemoryCatalog::new());
        let executor = TemplateExecutor::new(catalog.clone(), "proj", "eu");
        let name = "projects/proj/locations/eu/tagTemplates/data_governance";

        executor
            .apply(
                &file(),
                &governance(json!([{"id": "owner", "display_name": "Owner", "type": "string"}])),
            )
            .await
            .unwrap();
        let tag = Tag {
            name: None,
            template: name.into(),
            column: None,
            fields: BTreeMap::new(),
        };
        catalog.create_tag("entries/proj.ds", &tag).await.unwrap();

        executor
            .apply(
                &file(),
                &governance(json!([{"id": "steward", "display_name": "Steward", "type": "string"}])),
            )
            .await
            .unwrap();

        let template = catalog.template(name).unwrap();
        assert!(template.fields.contains_key("steward"));
        assert!(!template.fields.contains_key("owner"));
        assert!(catalog.list_tags("entries/proj.ds").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_definition_fails_record() {
        let catalog = Arc::new(MemoryCatalog::new());
        let executor = TemplateExecutor::new(catalog.clone(), "proj", "eu");

        let result = executor
            .apply(&file(), &record(json!({"template_id": "t", "fields": []})))
            .await;
        assert!(result.is_err());
        assert!(catalog.search_templates("proj").await.unwrap().is_empty());
    }
}
