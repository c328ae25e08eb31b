// src/services/taxonomies.rs

//! Taxonomy area executor: creates policy tag hierarchies.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{LandingFile, NormalizedRecord, PolicyTag, PolicyTagSpec, TaxonomyConfig};
use crate::pipeline::RecordOperation;
use crate::services::CatalogService;

/// Creates a taxonomy and its nested policy tags per record.
pub struct TaxonomyExecutor {
    catalog: Arc<dyn CatalogService>,
    project_id: String,
    default_location: String,
}

impl TaxonomyExecutor {
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

    /// Create the tags depth-first so every parent exists before its
    /// children. Tags already present under the same parent are reused.
    async fn create_tags(
        &self,
        taxonomy: &str,
        roots: &[PolicyTagSpec],
        existing: &[PolicyTag],
    ) -> Result<usize> {
        let mut stack: Vec<(&PolicyTagSpec, Option<String>)> =
            roots.iter().rev().map(|spec| (spec, None)).collect();
        let mut created = 0;

        while let Some((spec, parent)) = stack.pop() {
            let found = existing
                .iter()
                .find(|t| t.display_name == spec.display_name && t.parent_policy_tag == parent)
                .map(|t| t.name.clone());
            let name = match found {
                Some(name) => name,
                None => {
                    let tag = self
                        .catalog
                        .create_policy_tag(
                            taxonomy,
                            &spec.display_name,
                            spec.description.as_deref(),
                            parent.as_deref(),
                        )
                        .await?;
                    debug!("Created policy tag {} ({})", spec.display_name, tag.name);
                    created += 1;
                    tag.name
                }
            };

            for child in spec.sub_tag.iter().rev() {
                stack.push((child, Some(name.clone())));
            }
        }
        Ok(created)
    }
}

#[async_trait]
impl RecordOperation for TaxonomyExecutor {
    fn name(&self) -> &str {
        "taxonomies"
    }

    async fn apply(&self, _file: &LandingFile, record: &NormalizedRecord) -> Result<()> {
        let config: TaxonomyConfig = record.to_typed()?;
        config.validate()?;

        let location = config
            .location
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(&self.default_location);

        let found = self
            .catalog
            .list_taxonomies(&self.project_id, location)
            .await?
            .into_iter()
            .find(|t| t.display_name == config.taxonomy_display_name);

        let Some(taxonomy) = found else {
            let taxonomy = self
                .catalog
                .create_taxonomy(
                    &self.project_id,
                    location,
                    &config.taxonomy_display_name,
                    config.description.as_deref(),
                )
                .await?;
            let created = self
                .create_tags(&taxonomy.name, &config.policy_tags, &[])
                .await?;
            info!(
                "Created taxonomy {} with {} policy tags",
                config.taxonomy_display_name, created
            );
            return Ok(());
        };

        // A partially built taxonomy from an earlier failed pass is completed.
        let existing = self.catalog.list_policy_tags(&taxonomy.name).await?;
        let created = self
            .create_tags(&taxonomy.name, &config.policy_tags, &existing)
            .await?;
        if created == 0 {
            return Err(AppError::already_exists(format!(
                "taxonomy '{}' in {}",
                config.taxonomy_display_name, location
            )));
        }
        info!(
            "Completed taxonomy {} with {} missing policy tags",
            config.taxonomy_display_name, created
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileFormat;
    use crate::services::memory::MemoryCatalog;
    use serde_json::json;

    fn file() -> LandingFile {
        LandingFile::new("taxonomies/landing/taxonomy_sensitivity.json", FileFormat::Json)
    }

    fn record() -> NormalizedRecord {
        NormalizedRecord::from(
            json!({
                "taxonomy_display_name": "Sensitivity",
                "description": "Data sensitivity levels",
                "policy_tags": [
                    {"display_name": "High", "sub_tag": [
                        {"display_name": "PII", "sub_tag": [{"display_name": "Email"}]}
                    ]},
                    {"display_name": "Low"}
                ]
            })
            .as_object()
            .cloned()
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_nested_policy_tags_linked_to_parents() {
        let catalog = Arc::new(MemoryCatalog::new());
        let executor = TaxonomyExecutor::new(catalog.clone(), "proj", "eu");

        executor.apply(&file(), &record()).await.unwrap();

        let taxonomies = catalog.taxonomies();
        assert_eq!(taxonomies.len(), 1);
        let tags = catalog.policy_tags(&taxonomies[0].name);
        assert_eq!(tags.len(), 4);

        let by_name = |n: &str| tags.iter().find(|t| t.display_name == n).unwrap();
        assert_eq!(by_name("High").parent_policy_tag, None);
        assert_eq!(
            by_name("PII").parent_policy_tag.as_deref(),
            Some(by_name("High").name.as_str())
        );
        assert_eq!(
            by_name("Email").parent_policy_tag.as_deref(),
            Some(by_name("PII").name.as_str())
        );
        assert_eq!(by_name("Low").parent_policy_tag, None);
    }

    #[tokio::test]
    async fn test_existing_taxonomy_fails_record() {
        let catalog = Arc::new(MemoryCatalog::new());
        let executor = TaxonomyExecutor::new(catalog.clone(), "proj", "eu");

        executor.apply(&file(), &record()).await.unwrap();
        let err = executor.apply(&file(), &record()).await.unwrap_err();

        assert!(matches!(err, AppError::AlreadyExists(_)));
        assert!(err.to_string().to_lowercase().contains("already exists"));
        assert_eq!(catalog.taxonomies().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_completes_partial_taxonomy() {
        let catalog = Arc::new(MemoryCatalog::new());
        let executor = TaxonomyExecutor::new(catalog.clone(), "proj", "eu");
        catalog.fail_policy_tag_once("PII");

        let err = executor.apply(&file(), &record()).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        let taxonomy = catalog.taxonomies()[0].name.clone();
        assert_eq!(catalog.policy_tags(&taxonomy).len(), 1);

        executor.apply(&file(), &record()).await.unwrap();

        let tags = catalog.policy_tags(&taxonomy);
        assert_eq!(catalog.taxonomies().len(), 1);
        assert_eq!(tags.len(), 4);
        let by_name = |n: &str| tags.iter().find(|t| t.display_name == n).unwrap();
        assert_eq!(
            by_name("PII").parent_policy_tag.as_deref(),
            Some(by_name("High").name.as_str())
        );
        assert_eq!(
            by_name("Email").parent_policy_tag.as_deref(),
            Some(by_name("PII").name.as_str())
        );

        let err = executor.apply(&file(), &record()).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
        assert_eq!(catalog.policy_tags(&taxonomy).len(), 4);
    }
}
