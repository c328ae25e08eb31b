//! Rows of the catalog export reports.

use serde::Serialize;

use crate::models::TagTemplate;

/// One template field in the template report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateInfoRow {
    pub project_id: String,
    pub template_id: String,
    pub template_location: String,
    pub field_id: String,
    pub field_display_name: String,
    pub field_type: String,
    pub field_allowed_values: String,
    pub required_field: bool,
    pub field_description: String,
    pub extract_timestamp: String,
}

impl TemplateInfoRow {
    /// Report header, in field order.
    pub const COLUMNS: [&'static str; 10] = [
        "project_id",
        "template_id",
        "template_location",
        "field_id",
        "field_display_name",
        "field_type",
        "field_allowed_values",
        "required_field",
        "field_description",
        "extract_timestamp",
    ];

    /// One row per field of a template, highest display order first.
    pub fn from_template(project_id: &str, template: &TagTemplate, run_id: &str) -> Vec<Self> {
        let mut fields: Vec<_> = template.fields.iter().collect();
        fields.sort_by(|a, b| b.1.order.cmp(&a.1.order).then(a.0.cmp(b.0)));

        fields
            .into_iter()
            .map(|(id, field)| Self {
                project_id: project_id.to_string(),
                template_id: template.template_id.clone(),
                template_location: template.location.clone(),
                field_id: id.clone(),
                field_display_name: field.display_name.clone(),
                field_type: field.field_type.name().to_string(),
                field_allowed_values: field.field_type.allowed_values().join(","),
                required_field: field.required,
                field_description: field.description.clone().unwrap_or_default(),
                extract_timestamp: run_id.to_string(),
            })
            .collect()
    }
}

/// One tag field value, or a placeholder for an untagged entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagInfoRow {
    pub project_id: String,
    pub dataset_name: String,
    pub table_name: String,
    pub column_name: String,
    pub template_id: String,
    pub template_location: String,
    pub tag_field_id: String,
    pub tag_field_value: String,
    pub extract_timestamp: String,
}

impl TagInfoRow {
    /// Report header, in field order.
    pub const COLUMNS: [&'static str; 9] = [
        "project_id",
        "dataset_name",
        "table_name",
        "column_name",
        "template_id",
        "template_location",
        "tag_field_id",
        "tag_field_value",
        "extract_timestamp",
    ];

    /// Placeholder row so untagged datasets and tables still show up.
    pub fn untagged(project_id: &str, dataset: &str, table: Option<&str>, run_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            dataset_name: dataset.to_string(),
            table_name: table.unwrap_or_default().to_string(),
            column_name: String::new(),
            template_id: String::new(),
            template_location: String::new(),
            tag_field_id: String::new(),
            tag_field_value: String::new(),
            extract_timestamp: run_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldType, TemplateField};
    use std::collections::BTreeMap;

    #[test]
    fn test_template_rows_ordered() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "a_last".to_string(),
            TemplateField {
                display_name: "Last".into(),
                field_type: FieldType::String,
                required: false,
                description: None,
                order: 1,
            },
        );
        fields.insert(
            "z_first".to_string(),
            TemplateField {
                display_name: "First".into(),
                field_type: FieldType::Enum(vec!["x".into(), "y".into()]),
                required: true,
                description: Some("d".into()),
                order: 2,
            },
        );
        let template = TagTemplate {
            name: "projects/p/locations/eu/tagTemplates/t".into(),
            template_id: "t".into(),
            location: "eu".into(),
            display_name: "T".into(),
            fields,
        };

        let rows = TemplateInfoRow::from_template("p", &template, "20260101000000");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].field_id, "z_first");
        assert_eq!(rows[0].field_allowed_values, "x,y");
        assert!(rows[0].required_field);
        assert_eq!(rows[1].field_type, "string");
    }
}
