// src/pipeline/extract.rs

//! Catalog export.
//!
//! Writes two timestamped CSV reports to the extract folder, one row per
//! template field and one row per tag field value, then loads each into its
//! reporting table. Datasets and tables without tags still get a placeholder
//! row so the report lists every entry.

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;

use crate::error::Result;
use crate::models::{EntryTarget, JobConfig, TagInfoRow, TemplateInfoRow, parse_template_path};
use crate::services::{Services, TableRef};
use crate::storage::{FileStore, join_key};

/// Timestamp format used in report names and rows.
pub const RUN_ID_FORMAT: &str = "%Y%m%d%H%M%S";

/// What an export produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractSummary {
    pub run_id: String,
    pub template_key: String,
    pub tag_key: String,
    pub template_rows: usize,
    pub tag_rows: usize,
    pub template_rows_loaded: u64,
    pub tag_rows_loaded: u64,
}

/// Export templates and tags and load both reports.
pub async fn run_extract(
    config: &JobConfig,
    store: &dyn FileStore,
    services: &Services,
) -> Result<ExtractSummary> {
    config.validate_extract()?;
    let run_id = Utc::now().format(RUN_ID_FORMAT).to_string();
    let extract = &config.extract;

    let template_rows = template_rows(config, services, &run_id).await?;
    let template_key = join_key(&extract.folder, &format!("template_info_{run_id}.csv"));
    let template_csv = to_csv(&TemplateInfoRow::COLUMNS, &template_rows)?;
    store.write(&template_key, &template_csv).await?;
    info!(
        "Wrote {} template rows to {}",
        template_rows.len(),
        store.uri(&template_key)
    );

    let tag_rows = tag_rows(config, services, &run_id).await?;
    let tag_key = join_key(&extract.folder, &format!("tag_info_{run_id}.csv"));
    let tag_csv = to_csv(&TagInfoRow::COLUMNS, &tag_rows)?;
    store.write(&tag_key, &tag_csv).await?;
    info!("Wrote {} tag rows to {}", tag_rows.len(), store.uri(&tag_key));

    let template_table = TableRef::new(
        &config.project_id,
        &extract.destination_dataset,
        &extract.template_table,
    );
    let template_rows_loaded = services
        .warehouse
        .load_csv(&template_table, &extract.template_schema, &template_csv)
        .await?;
    info!("Loaded {} rows to {}", template_rows_loaded, template_table);

    let tag_table = TableRef::new(
        &config.project_id,
        &extract.destination_dataset,
        &extract.tag_table,
    );
    let tag_rows_loaded = services
        .warehouse
        .load_csv(&tag_table, &extract.tag_schema, &tag_csv)
        .await?;
    info!("Loaded {} rows to {}", tag_rows_loaded, tag_table);

    Ok(ExtractSummary {
        run_id,
        template_key,
        tag_key,
        template_rows: template_rows.len(),
        tag_rows: tag_rows.len(),
        template_rows_loaded,
        tag_rows_loaded,
    })
}

async fn template_rows(
    config: &JobConfig,
    services: &Services,
    run_id: &str,
) -> Result<Vec<TemplateInfoRow>> {
    let mut rows = Vec::new();
    for name in services.catalog.search_templates(&config.project_id).await? {
        match services.catalog.get_template(&name).await {
            Ok(Some(template)) => {
                rows.extend(TemplateInfoRow::from_template(
                    &config.project_id,
                    &template,
                    run_id,
                ));
            }
            Ok(None) => warn!("Template {} disappeared during export", name),
            Err(e) => warn!("Cannot read template {}: {}", name, e),
        }
    }
    Ok(rows)
}

async fn tag_rows(config: &JobConfig, services: &Services, run_id: &str) -> Result<Vec<TagInfoRow>> {
    let project = &config.project_id;
    let mut rows = Vec::new();

    for dataset in services.warehouse.list_datasets(project).await? {
        let target = EntryTarget {
            project_id: project.clone(),
            dataset: dataset.clone(),
            table: None,
        };
        rows.extend(entry_rows(services, &target, run_id).await);

        for table in services.warehouse.list_tables(project, &dataset).await? {
            let target = EntryTarget {
                table: Some(table),
                ..target.clone()
            };
            rows.extend(entry_rows(services, &target, run_id).await);
        }
    }
    Ok(rows)
}

/// Rows for one entry, or its placeholder when it carries no tags.
async fn entry_rows(services: &Services, target: &EntryTarget, run_id: &str) -> Vec<TagInfoRow> {
    let placeholder = || {
        vec![TagInfoRow::untagged(
            &target.project_id,
            &target.dataset,
            target.table.as_deref(),
            run_id,
        )]
    };

    let tags = match services.catalog.lookup_entry(target).await {
        Ok(entry) => match services.catalog.list_tags(&entry).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Cannot list tags of {}: {}", target, e);
                return placeholder();
            }
        },
        Err(e) => {
            warn!("No catalog entry for {}: {}", target, e);
            return placeholder();
        }
    };
    if tags.is_empty() {
        return placeholder();
    }

    let mut rows = Vec::new();
    for tag in tags {
        let (template_id, template_location) = match parse_template_path(&tag.template) {
            Some((_, location, id)) => (id.to_string(), location.to_string()),
            None => (tag.template.clone(), String::new()),
        };
        for (field_id, value) in &tag.fields {
            rows.push(TagInfoRow {
                project_id: target.project_id.clone(),
                dataset_name: target.dataset.clone(),
                table_name: target.table.clone().unwrap_or_default(),
                column_name: tag.column.clone().unwrap_or_default(),
                template_id: template_id.clone(),
                template_location: template_location.clone(),
                tag_field_id: field_id.clone(),
                tag_field_value: value.to_string(),
                extract_timestamp: run_id.to_string(),
            });
        }
    }
    rows
}

/// Serialize report rows with a header, even when there are none.
fn to_csv<T: Serialize>(header: &[&str], rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldType, Tag, TagTemplate, TagValue, TemplateField};
    use crate::services::memory::MemoryServices;
    use crate::services::CatalogService;
    use crate::storage::LocalStore;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn config() -> JobConfig {
        let mut config = JobConfig {
            project_id: "proj".into(),
            resource_location: "eu".into(),
            ..JobConfig::default()
        };
        config.extract.destination_dataset = "reports".into();
        config.extract.template_table = "template_info".into();
        config.extract.tag_table = "tag_info".into();
        config
    }

    fn template() -> TagTemplate {
        TagTemplate {
            name: "projects/proj/locations/eu/tagTemplates/gov".into(),
            template_id: "gov".into(),
            location: "eu".into(),
            display_name: "Gov".into(),
            fields: BTreeMap::from([(
                "owner".to_string(),
                TemplateField {
                    display_name: "Owner".into(),
                    field_type: FieldType::String,
                    required: true,
                    description: None,
                    order: 1,
                },
            )]),
        }
    }

    #[tokio::test]
    async fn test_reports_written_and_loaded() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let fakes = MemoryServices::new();
        fakes.catalog.insert_template(template());
        fakes.warehouse.add_table("proj", "crm", Some("people"));
        fakes.warehouse.add_table("proj", "crm", Some("orders"));

        let people = EntryTarget {
            project_id: "proj".into(),
            dataset: "crm".into(),
            table: Some("people".into()),
        };
        let entry = fakes.catalog.lookup_entry(&people).await.unwrap();
        let tag = Tag {
            name: None,
            template: template().name,
            column: Some("email".into()),
            fields: BTreeMap::from([("owner".to_string(), TagValue::String("alice".into()))]),
        };
        fakes.catalog.create_tag(&entry, &tag).await.unwrap();

        let summary = run_extract(&config(), &store, &fakes.services())
            .await
            .unwrap();

        assert_eq!(summary.template_rows, 1);
        // crm placeholder, orders placeholder, one people tag field
        assert_eq!(summary.tag_rows, 3);
        assert!(summary.tag_key.starts_with("catalog_extract/tag_info_"));
        assert_eq!(summary.run_id.len(), 14);

        let text = String::from_utf8(store.read(&summary.tag_key).await.unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "project_id,dataset_name,table_name,column_name,template_id,template_location,tag_field_id,tag_field_value,extract_timestamp"
        );
        assert!(text.contains("proj,crm,people,email,gov,eu,owner,alice,"));

        let loads = fakes.warehouse.loads();
        assert_eq!(loads.len(), 2);
        assert_eq!(loads[0].0, TableRef::new("proj", "reports", "template_info"));
        assert_eq!(summary.tag_rows_loaded, 3);
    }

    #[test]
    fn test_empty_report_has_header() {
        let csv = to_csv::<TagInfoRow>(&TagInfoRow::COLUMNS, &[]).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap().trim_end(),
            TagInfoRow::COLUMNS.join(",")
        );
    }

    #[tokio::test]
    async fn test_extract_requires_destination() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let mut config = config();
        config.extract.destination_dataset.clear();

        let err = run_extract(&config, &store, &MemoryServices::new().services())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("extract.destination_dataset"));
    }
}
