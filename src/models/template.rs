//! Tag template definitions.
//!
//! A template file dropped in the templates landing area describes the
//! schema of a tag: named fields with a primitive or enum type. The file is
//! parsed into [`TemplateConfig`] and converted into the typed
//! [`TagTemplate`] the catalog service accepts.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::string_like;

static TEMPLATE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,63}$").expect("valid regex"));

static FIELD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("valid regex"));

/// Type of a template field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Double,
    Bool,
    Timestamp,
    Richtext,
    Enum(Vec<String>),
}

impl FieldType {
    /// Short lowercase name, as used in template files and reports.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Double => "double",
            FieldType::Bool => "bool",
            FieldType::Timestamp => "timestamp",
            FieldType::Richtext => "richtext",
            FieldType::Enum(_) => "enum",
        }
    }

    pub fn allowed_values(&self) -> &[String] {
        match self {
            FieldType::Enum(values) => values,
            _ => &[],
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Primitive type names without enum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    String,
    Double,
    Bool,
    Timestamp,
    Richtext,
    Enum,
}

impl FromStr for TypeName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(TypeName::String),
            "double" => Ok(TypeName::Double),
            "bool" | "boolean" => Ok(TypeName::Bool),
            "timestamp" => Ok(TypeName::Timestamp),
            "richtext" => Ok(TypeName::Richtext),
            "enum" => Ok(TypeName::Enum),
            other => Err(AppError::validation(format!("unknown field type '{other}'"))),
        }
    }
}

/// One field as written in a template file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(deserialize_with = "string_like")]
    pub id: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub allowed_values: Vec<String>,
}

impl FieldSpec {
    /// Resolve the declared type, checking enum values.
    pub fn field_type(&self) -> Result<FieldType> {
        let field_type = match self.type_name.parse::<TypeName>()? {
            TypeName::String => FieldType::String,
            TypeName::Double => FieldType::Double,
            TypeName::Bool => FieldType::Bool,
            TypeName::Timestamp => FieldType::Timestamp,
            TypeName::Richtext => FieldType::Richtext,
            TypeName::Enum => {
                if self.allowed_values.is_empty() {
                    return Err(AppError::validation(format!(
                        "enum field '{}' has no allowed_values",
                        self.id
                    )));
                }
                FieldType::Enum(self.allowed_values.clone())
            }
        };
        Ok(field_type)
    }
}

/// A template file as dropped in the landing area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(deserialize_with = "string_like")]
    pub template_id: String,
    #[serde(default)]
    pub location: Option<String>,
    pub display_name: String,
    pub fields: Vec<FieldSpec>,
}

impl TemplateConfig {
    /// Convert into a catalog template, validating ids and field types.
    pub fn to_template(&self, project_id: &str, default_location: &str) -> Result<TagTemplate> {
        if !TEMPLATE_ID.is_match(&self.template_id) {
            return Err(AppError::validation(format!(
                "invalid template id '{}'",
                self.template_id
            )));
        }
        if self.fields.is_empty() {
            return Err(AppError::validation(format!(
                "template '{}' declares no fields",
                self.template_id
            )));
        }

        let mut seen = HashSet::new();
        let mut fields = BTreeMap::new();
        for (order, spec) in self.fields.iter().enumerate() {
            if !FIELD_ID.is_match(&spec.id) {
                return Err(AppError::validation(format!("invalid field id '{}'", spec.id)));
            }
            if !seen.insert(spec.id.clone()) {
                return Err(AppError::validation(format!("duplicate field id '{}'", spec.id)));
            }
            fields.insert(
                spec.id.clone(),
                TemplateField {
                    display_name: spec.display_name.clone(),
                    field_type: spec.field_type()?,
                    required: spec.required,
                    description: spec.description.clone(),
                    order: (self.fields.len() - order) as i32,
                },
            );
        }

        let location = self
            .location
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(default_location);

        Ok(TagTemplate {
            name: template_path(project_id, location, &self.template_id),
            template_id: self.template_id.clone(),
            location: location.to_string(),
            display_name: self.display_name.clone(),
            fields,
        })
    }
}

/// A field of a registered template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
    pub display_name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub description: Option<String>,
    /// Display order, higher first
    pub order: i32,
}

/// A tag template as known to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagTemplate {
    /// Full resource name
    pub name: String,
    pub template_id: String,
    pub location: String,
    pub display_name: String,
    pub fields: BTreeMap<String, TemplateField>,
}

/// Resource name of a template.
pub fn template_path(project_id: &str, location: &str, template_id: &str) -> String {
    format!("projects/{project_id}/locations/{location}/tagTemplates/{template_id}")
}

/// Split a template resource name into `(project, location, template_id)`.
pub fn parse_template_path(name: &str) -> Option<(&str, &str, &str)> {
    let parts: Vec<&str> = name.split('/').collect();
    match parts.as_slice() {
        ["projects", project, "locations", location, "tagTemplates", id] => {
            Some((project, location, id))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(fields: serde_json::Value) -> TemplateConfig {
        serde_json::from_value(json!({
            "template_id": "data_governance",
            "location": "eu",
            "display_name": "Data Governance",
            "fields": fields
        }))
        .unwrap()
    }

    #[test]
    fn test_typed_fields() {
        let cfg = config(json!([
            {"id": "owner", "display_name": "Owner", "type": "string", "required": true},
            {"id": "score", "display_name": "Score", "type": "double"},
            {"id": "pii", "display_name": "PII", "type": "BOOL"},
            {"id": "tier", "display_name": "Tier", "type": "enum", "allowed_values": ["gold", "silver"]}
        ]));
        let template = cfg.to_template("proj", "us").unwrap();

        assert_eq!(
            template.name,
            "projects/proj/locations/eu/tagTemplates/data_governance"
        );
        assert_eq!(template.fields["owner"].field_type, FieldType::String);
        assert!(template.fields["owner"].required);
        assert_eq!(template.fields["pii"].field_type, FieldType::Bool);
        assert_eq!(
            template.fields["tier"].field_type,
            FieldType::Enum(vec!["gold".into(), "silver".into()])
        );
        assert!(template.fields["owner"].order > template.fields["tier"].order);
    }

    #[test]
    fn test_enum_without_values_rejected() {
        let cfg = config(json!([{"id": "tier", "display_name": "Tier", "type": "enum"}]));
        assert!(cfg.to_template("proj", "eu").is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let cfg = config(json!([{"id": "x", "display_name": "X", "type": "blob"}]));
        let err = cfg.to_template("proj", "eu").unwrap_err();
        assert!(err.to_string().contains("unknown field type"));
    }

    #[test]
    fn test_invalid_template_id() {
        let mut cfg = config(json!([{"id": "x", "display_name": "X", "type": "string"}]));
        cfg.template_id = "Has-Dash".into();
        assert!(cfg.to_template("proj", "eu").is_err());
    }

    #[test]
    fn test_duplicate_field_id() {
        let cfg = config(json!([
            {"id": "x", "display_name": "X", "type": "string"},
            {"id": "x", "display_name": "X2", "type": "double"}
        ]));
        assert!(cfg.to_template("proj", "eu").is_err());
    }

    #[test]
    fn test_default_location() {
        let mut cfg = config(json!([{"id": "x", "display_name": "X", "type": "string"}]));
        cfg.location = None;
        let template = cfg.to_template("proj", "us").unwrap();
        assert_eq!(template.location, "us");
    }

    #[test]
    fn test_parse_template_path() {
        let parsed = parse_template_path("projects/p/locations/eu/tagTemplates/t1");
        assert_eq!(parsed, Some(("p", "eu", "t1")));
        assert_eq!(parse_template_path("projects/p/tagTemplates/t1"), None);
    }
}
