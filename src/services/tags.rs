// src/services/tags.rs

//! Tag area executor.
//!
//! Each CSV row becomes one tag on a dataset, table or column entry. The
//! target comes from the file name (`<dataset>[.<table>][.<template>[.<location>]].csv`)
//! plus the row's `column` cell. The template is resolved, first hit wins:
//!
//! 1. the row's `template_id` / `template_location` cells
//! 2. the template and location segments of the file name
//! 3. `default_templates.<level>` from the job configuration
//!
//! A row with no template after these steps fails. A missing location
//! falls back to the default for the same level, then to
//! `resource_location`.
//!
//! Writing is replace-in-place: any tag from the same template on the same
//! column is deleted before the new one is created, so re-running a file
//! leaves one tag per template and column.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use log::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{
    DefaultTemplates, EntryTarget, LandingFile, NormalizedRecord, Tag, TagFileSpec, TagLevel,
    TagTemplate, TagValue, template_path,
};
use crate::pipeline::RecordOperation;
use crate::services::CatalogService;

/// Row cell naming the column a tag is scoped to.
pub const COLUMN_FIELD: &str = "column";
/// Row cell overriding the template id.
pub const TEMPLATE_ID_FIELD: &str = "template_id";
/// Row cell overriding the template location.
pub const TEMPLATE_LOCATION_FIELD: &str = "template_location";

const RESERVED_FIELDS: [&str; 3] = [COLUMN_FIELD, TEMPLATE_ID_FIELD, TEMPLATE_LOCATION_FIELD];

/// Writes tags from CSV rows.
pub struct TagExecutor {
    catalog: Arc<dyn CatalogService>,
    project_id: String,
    resource_location: String,
    defaults: DefaultTemplates,
    templates: Mutex<HashMap<String, TagTemplate>>,
}

impl TagExecutor {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        project_id: impl Into<String>,
        resource_location: impl Into<String>,
        defaults: DefaultTemplates,
    ) -> Self {
        Self {
            catalog,
            project_id: project_id.into(),
            resource_location: resource_location.into(),
            defaults,
            templates: Mutex::new(HashMap::new()),
        }
    }

    /// Resource name of the template a row uses.
    fn resolve_template(
        &self,
        spec: &TagFileSpec,
        level: TagLevel,
        record: &NormalizedRecord,
    ) -> Result<String> {
        let row_id = record
            .get_str(TEMPLATE_ID_FIELD)
            .filter(|s| !s.trim().is_empty());
        let row_location = record
            .get_str(TEMPLATE_LOCATION_FIELD)
            .filter(|s| !s.trim().is_empty());
        let default = self.defaults.for_level(level);

        let (template_id, location) = if let Some(id) = row_id {
            (id, row_location.or_else(|| spec.location.clone()))
        } else if let Some(id) = &spec.template_id {
            (id.clone(), row_location.or_else(|| spec.location.clone()))
        } else if let Some(default) = default {
            (
                default.template_id.clone(),
                row_location.or_else(|| default.location.clone()),
            )
        } else {
            return Err(AppError::validation(format!(
                "no template for {level}-level tag: set template_id in the row or file name, \
                 or default_templates.{level}"
            )));
        };

        let location = location
            .or_else(|| default.and_then(|d| d.location.clone()))
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.resource_location.clone());

        Ok(template_path(&self.project_id, &location, &template_id))
    }

    /// Fetch a template once per run.
    async fn template(&self, name: &str) -> Result<TagTemplate> {
        if let Some(template) = self.cached(name) {
            return Ok(template);
        }
        let template = self
            .catalog
            .get_template(name)
            .await?
            .ok_or_else(|| AppError::not_found(format!("template {name}")))?;
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), template.clone());
        Ok(template)
    }

    fn cached(&self, name: &str) -> Option<TagTemplate> {
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// Typed field values of a row, checked against the template.
fn tag_fields(
    template: &TagTemplate,
    record: &NormalizedRecord,
) -> Result<BTreeMap<String, TagValue>> {
    let mut fields = BTreeMap::new();
    for (key, value) in record.iter() {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        match template.fields.get(key) {
            Some(field) => {
                fields.insert(key.clone(), TagValue::from_json(key, field, value)?);
            }
            None => debug!("Skipping '{}': not a field of {}", key, template.template_id),
        }
    }

    let missing: Vec<&str> = template
        .fields
        .iter()
        .filter(|(id, field)| field.required && !fields.contains_key(*id))
        .map(|(id, _)| id.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(AppError::validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }
    if fields.is_empty() {
        return Err(AppError::validation(format!(
            "no values for any field of {}",
            template.template_id
        )));
    }
    Ok(fields)
}

#[async_trait]
impl RecordOperation for TagExecutor {
    fn name(&self) -> &str {
        "tags"
    }

    fn check_file(&self, file: &LandingFile) -> Result<()> {
        TagFileSpec::parse(file.stem()).map(|_| ())
    }

    async fn apply(&self, file: &LandingFile, record: &NormalizedRecord) -> Result<()> {
        let spec = TagFileSpec::parse(file.stem())?;
        let column = record
            .get_str(COLUMN_FIELD)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let level = match (&column, &spec.table) {
            (Some(_), None) => {
                return Err(AppError::validation(
                    "column-level tag in a dataset-level file",
                ));
            }
            (Some(_), Some(_)) => TagLevel::Column,
            (None, Some(_)) => TagLevel::Table,
            (None, None) => TagLevel::Dataset,
        };

        let template_name = self.resolve_template(&spec, level, record)?;
        let template = self.template(&template_name).await?;
        let fields = tag_fields(&template, record)?;

        let target = EntryTarget {
            project_id: self.project_id.clone(),
            dataset: spec.dataset.clone(),
            table: spec.table.clone(),
        };
        let entry = self.catalog.lookup_entry(&target).await?;

        for existing in self.catalog.list_tags(&entry).await? {
            if existing.template != template.name || existing.column != column {
                continue;
            }
            if let Some(name) = &existing.name {
                debug!("Replacing tag {}", name);
                match self.catalog.delete_tag(name).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let tag = Tag {
            name: None,
            template: template.name.clone(),
            column: column.clone(),
            fields,
        };
        self.catalog.create_tag(&entry, &tag).await?;

        match &column {
            Some(c) => info!("Tagged {}.{} with {}", target, c, template.template_id),
            None => info!("Tagged {} with {}", target, template.template_id),
        }
        Ok(())
    }
}
