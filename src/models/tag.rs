//! Tags and tag targets.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{FieldType, TemplateField};

/// Level of the catalog entry a tag is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagLevel {
    Dataset,
    Table,
    Column,
}

impl fmt::Display for TagLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TagLevel::Dataset => "dataset",
            TagLevel::Table => "table",
            TagLevel::Column => "column",
        };
        f.write_str(s)
    }
}

/// What a tag file name says about its rows.
///
/// Grammar: `<dataset>[.<table>][.<template>[.<location>]]`. Empty segments
/// count as absent, so `ds1..tmpl` names a dataset-level file with a
/// template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFileSpec {
    pub dataset: String,
    pub table: Option<String>,
    pub template_id: Option<String>,
    pub location: Option<String>,
}

impl TagFileSpec {
    /// Parse a file stem (name without `.csv`).
    pub fn parse(stem: &str) -> Result<Self> {
        let parts: Vec<&str> = stem.split('.').collect();
        if parts.len() > 4 {
            return Err(AppError::validation(format!(
                "tag file name '{stem}' has more than four segments"
            )));
        }
        let segment = |i: usize| {
            parts
                .get(i)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let dataset = segment(0).ok_or_else(|| {
            AppError::validation(format!("tag file name '{stem}' does not name a dataset"))
        })?;

        Ok(Self {
            dataset,
            table: segment(1),
            template_id: segment(2),
            location: segment(3),
        })
    }
}

/// Catalog entry a tag is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryTarget {
    pub project_id: String,
    pub dataset: String,
    pub table: Option<String>,
}

impl EntryTarget {
    /// Linked resource name the catalog uses to look up the entry.
    pub fn linked_resource(&self) -> String {
        match &self.table {
            Some(table) => format!(
                "//bigquery.googleapis.com/projects/{}/datasets/{}/tables/{}",
                self.project_id, self.dataset, table
            ),
            None => format!(
                "//bigquery.googleapis.com/projects/{}/datasets/{}",
                self.project_id, self.dataset
            ),
        }
    }
}

impl fmt::Display for EntryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}.{}", self.project_id, self.dataset, table),
            None => write!(f, "{}.{}", self.project_id, self.dataset),
        }
    }
}

/// Typed value of one tag field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagValue {
    String(String),
    Double(f64),
    Bool(bool),
    Timestamp(String),
    Richtext(String),
    Enum(String),
}

impl TagValue {
    /// Convert a record value to the type a template field declares.
    pub fn from_json(field_id: &str, field: &TemplateField, value: &Value) -> Result<Self> {
        let mismatch = || {
            AppError::validation(format!(
                "field '{}' expects {} but got {}",
                field_id, field.field_type, value
            ))
        };

        let text = || match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        };

        match &field.field_type {
            FieldType::String => text().map(TagValue::String).ok_or_else(mismatch),
            FieldType::Richtext => text().map(TagValue::Richtext).ok_or_else(mismatch),
            FieldType::Timestamp => text().map(TagValue::Timestamp).ok_or_else(mismatch),
            FieldType::Double => match value {
                Value::Number(n) => n.as_f64().map(TagValue::Double).ok_or_else(mismatch),
                Value::String(s) => s.trim().parse().map(TagValue::Double).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            FieldType::Bool => match value {
                Value::Bool(b) => Ok(TagValue::Bool(*b)),
                _ => Err(mismatch()),
            },
            FieldType::Enum(allowed) => {
                let v = text().ok_or_else(mismatch)?;
                if allowed.iter().any(|a| a == &v) {
                    Ok(TagValue::Enum(v))
                } else {
                    Err(AppError::validation(format!(
                        "field '{}' value '{}' is not one of {:?}",
                        field_id, v, allowed
                    )))
                }
            }
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::String(s)
            | TagValue::Timestamp(s)
            | TagValue::Richtext(s)
            | TagValue::Enum(s) => f.write_str(s),
            TagValue::Double(d) => write!(f, "{d}"),
            TagValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A tag attached, or to be attached, to a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Resource name, assigned by the catalog on creation
    pub name: Option<String>,
    /// Resource name of the template
    pub template: String,
    /// Column the tag is scoped to; `None` for the entry itself
    pub column: Option<String>,
    pub fields: BTreeMap<String, TagValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(field_type: FieldType) -> TemplateField {
        TemplateField {
            display_name: "F".into(),
            field_type,
            required: false,
            description: None,
            order: 0,
        }
    }

    #[test]
    fn test_parse_full_file_name() {
        let spec = TagFileSpec::parse("ds1.tbl1.tmplA.eu").unwrap();
        assert_eq!(spec.dataset, "ds1");
        assert_eq!(spec.table.as_deref(), Some("tbl1"));
        assert_eq!(spec.template_id.as_deref(), Some("tmplA"));
        assert_eq!(spec.location.as_deref(), Some("eu"));
    }

    #[test]
    fn test_parse_dataset_only() {
        let spec = TagFileSpec::parse("ds1").unwrap();
        assert_eq!(spec.table, None);
        assert_eq!(spec.template_id, None);
    }

    #[test]
    fn test_parse_empty_segments() {
        let spec = TagFileSpec::parse("ds1..tmpl").unwrap();
        assert_eq!(spec.table, None);
        assert_eq!(spec.template_id.as_deref(), Some("tmpl"));
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        assert!(TagFileSpec::parse("a.b.c.d.e").is_err());
        assert!(TagFileSpec::parse(".tbl").is_err());
    }

    #[test]
    fn test_linked_resource() {
        let target = EntryTarget {
            project_id: "p".into(),
            dataset: "d".into(),
            table: Some("t".into()),
        };
        assert_eq!(
            target.linked_resource(),
            "//bigquery.googleapis.com/projects/p/datasets/d/tables/t"
        );
        assert_eq!(target.to_string(), "p.d.t");
    }

    #[test]
    fn test_tag_value_coercion() {
        let v = TagValue::from_json("s", &field(FieldType::String), &json!(42)).unwrap();
        assert_eq!(v, TagValue::String("42".into()));

        let v = TagValue::from_json("d", &field(FieldType::Double), &json!(3)).unwrap();
        assert_eq!(v, TagValue::Double(3.0));

        let v = TagValue::from_json("d", &field(FieldType::Double), &json!("2.5")).unwrap();
        assert_eq!(v, TagValue::Double(2.5));

        assert!(TagValue::from_json("b", &field(FieldType::Bool), &json!("yes")).is_err());
    }

    #[test]
    fn test_enum_value_must_be_allowed() {
        let f = field(FieldType::Enum(vec!["gold".into()]));
        assert!(TagValue::from_json("e", &f, &json!("gold")).is_ok());
        assert!(TagValue::from_json("e", &f, &json!("bronze")).is_err());
    }
}
