// src/services/rest/catalog.rs

//! Data catalog and policy tag manager client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{
    EntryTarget, FieldType, PolicyTag, Tag, TagTemplate, TagValue, Taxonomy, TemplateField,
    parse_template_path,
};
use crate::services::CatalogService;
use crate::services::rest::ApiClient;

pub struct RestCatalog {
    api: ApiClient,
}

impl RestCatalog {
    pub(crate) fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct EntryResponse {
    name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    column: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, WireTagField>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTagField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    double_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bool_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    richtext_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enum_value: Option<WireEnumValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnumValue {
    display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagPage {
    #[serde(default)]
    tags: Vec<WireTag>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    fields: BTreeMap<String, WireTemplateField>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTemplateField {
    #[serde(default)]
    display_name: String,
    #[serde(rename = "type")]
    field_type: WireFieldType,
    #[serde(default)]
    is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    order: i32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFieldType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    primitive_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enum_type: Option<WireEnumType>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnumType {
    #[serde(default)]
    allowed_values: Vec<WireEnumValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    results: Vec<SearchResult>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    search_result_subtype: String,
    #[serde(default)]
    relative_resource_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTaxonomy {
    #[serde(default)]
    name: String,
    display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaxonomyPage {
    #[serde(default)]
    taxonomies: Vec<WireTaxonomy>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePolicyTag {
    #[serde(default)]
    name: String,
    display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_policy_tag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyTagPage {
    #[serde(default)]
    policy_tags: Vec<WirePolicyTag>,
    next_page_token: Option<String>,
}

// --- Conversions ---

impl From<&TagValue> for WireTagField {
    fn from(value: &TagValue) -> Self {
        let mut field = WireTagField::default();
        match value {
            TagValue::String(s) => field.string_value = Some(s.clone()),
            TagValue::Double(d) => field.double_value = Some(*d),
            TagValue::Bool(b) => field.bool_value = Some(*b),
            TagValue::Timestamp(t) => field.timestamp_value = Some(t.clone()),
            TagValue::Richtext(r) => field.richtext_value = Some(r.clone()),
            TagValue::Enum(e) => {
                field.enum_value = Some(WireEnumValue {
                    display_name: e.clone(),
                })
            }
        }
        field
    }
}

impl WireTagField {
    fn into_value(self) -> Option<TagValue> {
        self.string_value
            .map(TagValue::String)
            .or(self.double_value.map(TagValue::Double))
            .or(self.bool_value.map(TagValue::Bool))
            .or(self.timestamp_value.map(TagValue::Timestamp))
            .or(self.richtext_value.map(TagValue::Richtext))
            .or(self.enum_value.map(|e| TagValue::Enum(e.display_name)))
    }
}

impl From<&Tag> for WireTag {
    fn from(tag: &Tag) -> Self {
        Self {
            name: None,
            template: tag.template.clone(),
            column: tag.column.clone(),
            fields: tag
                .fields
                .iter()
                .map(|(id, value)| (id.clone(), WireTagField::from(value)))
                .collect(),
        }
    }
}

impl From<WireTag> for Tag {
    fn from(wire: WireTag) -> Self {
        Self {
            name: wire.name,
            template: wire.template,
            column: wire.column.filter(|c| !c.is_empty()),
            fields: wire
                .fields
                .into_iter()
                .filter_map(|(id, field)| field.into_value().map(|v| (id, v)))
                .collect(),
        }
    }
}

fn primitive_name(field_type: &FieldType) -> Option<&'static str> {
    match field_type {
        FieldType::String => Some("STRING"),
        FieldType::Double => Some("DOUBLE"),
        FieldType::Bool => Some("BOOL"),
        FieldType::Timestamp => Some("TIMESTAMP"),
        FieldType::Richtext => Some("RICHTEXT"),
        FieldType::Enum(_) => None,
    }
}

impl From<&TemplateField> for WireTemplateField {
    fn from(field: &TemplateField) -> Self {
        let field_type = match &field.field_type {
            FieldType::Enum(values) => WireFieldType {
                primitive_type: None,
                enum_type: Some(WireEnumType {
                    allowed_values: values
                        .iter()
                        .map(|v| WireEnumValue {
                            display_name: v.clone(),
                        })
                        .collect(),
                }),
            },
            other => WireFieldType {
                primitive_type: primitive_name(other).map(str::to_string),
                enum_type: None,
            },
        };
        Self {
            display_name: field.display_name.clone(),
            field_type,
            is_required: field.required,
            description: field.description.clone(),
            order: field.order,
        }
    }
}

impl WireTemplateField {
    fn into_field(self) -> Result<TemplateField> {
        let field_type = match (self.field_type.primitive_type.as_deref(), self.field_type.enum_type) {
            (_, Some(enum_type)) => FieldType::Enum(
                enum_type
                    .allowed_values
                    .into_iter()
                    .map(|v| v.display_name)
                    .collect(),
            ),
            (Some("STRING"), None) => FieldType::String,
            (Some("DOUBLE"), None) => FieldType::Double,
            (Some("BOOL"), None) => FieldType::Bool,
            (Some("TIMESTAMP"), None) => FieldType::Timestamp,
            (Some("RICHTEXT"), None) => FieldType::Richtext,
            (other, None) => {
                return Err(AppError::service(
                    "catalog",
                    format!("unsupported field type {other:?}"),
                ));
            }
        };
        Ok(TemplateField {
            display_name: self.display_name,
            field_type,
            required: self.is_required,
            description: self.description.filter(|d| !d.is_empty()),
            order: self.order,
        })
    }
}

fn into_template(wire: WireTemplate, requested: &str) -> Result<TagTemplate> {
    let name = wire.name.unwrap_or_else(|| requested.to_string());
    let (_, location, template_id) = parse_template_path(&name)
        .ok_or_else(|| AppError::service("catalog", format!("unexpected template name {name}")))?;
    let (location, template_id) = (location.to_string(), template_id.to_string());

    let fields = wire
        .fields
        .into_iter()
        .map(|(id, field)| field.into_field().map(|f| (id, f)))
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(TagTemplate {
        name,
        template_id,
        location,
        display_name: wire.display_name,
        fields,
    })
}

/// Parent resource of a template name.
fn template_parent(name: &str) -> Result<String> {
    let (project, location, _) = parse_template_path(name)
        .ok_or_else(|| AppError::validation(format!("invalid template name {name}")))?;
    Ok(format!("projects/{project}/locations/{location}"))
}

#[async_trait]
impl CatalogService for RestCatalog {
    async fn lookup_entry(&self, target: &EntryTarget) -> Result<String> {
        let url = self
            .api
            .url_with("entries:lookup", &[("linkedResource", target.linked_resource().as_str())])?;
        let entry: EntryResponse = self.api.get(url).await?;
        Ok(entry.name)
    }

    async fn list_tags(&self, entry: &str) -> Result<Vec<Tag>> {
        let tags = self
            .api
            .get_pages(&format!("{entry}/tags"), &[], |page: TagPage| {
                (page.tags, page.next_page_token)
            })
            .await?;
        Ok(tags.into_iter().map(Tag::from).collect())
    }

    async fn create_tag(&self, entry: &str, tag: &Tag) -> Result<Tag> {
        let url = self.api.url(&format!("{entry}/tags"))?;
        let created: WireTag = self.api.post(url, &WireTag::from(tag)).await?;
        Ok(created.into())
    }

    async fn delete_tag(&self, tag_name: &str) -> Result<()> {
        self.api.delete(self.api.url(tag_name)?).await
    }

    async fn get_template(&self, name: &str) -> Result<Option<TagTemplate>> {
        match self.api.get::<WireTemplate>(self.api.url(name)?).await {
            Ok(wire) => Ok(Some(into_template(wire, name)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_template(&self, template: &TagTemplate) -> Result<TagTemplate> {
        let parent = template_parent(&template.name)?;
        let url = self.api.url_with(
            &format!("{parent}/tagTemplates"),
            &[("tagTemplateId", template.template_id.as_str())],
        )?;
        let body = WireTemplate {
            name: None,
            display_name: template.display_name.clone(),
            fields: template
                .fields
                .iter()
                .map(|(id, f)| (id.clone(), WireTemplateField::from(f)))
                .collect(),
        };
        let created: WireTemplate = self.api.post(url, &body).await?;
        into_template(created, &template.name)
    }

    async fn delete_template(&self, name: &str) -> Result<()> {
        let url = self.api.url_with(name, &[("force", "true")])?;
        self.api.delete(url).await
    }

    async fn search_templates(&self, project_id: &str) -> Result<Vec<String>> {
        let url = self.api.url("catalog:search")?;
        let mut names = Vec::new();
        let mut token = String::new();
        loop {
            let mut body = json!({
                "scope": {"includeProjectIds": [project_id]},
                "query": "type=tag_template",
                "pageSize": 500,
            });
            if !token.is_empty() {
                body["pageToken"] = json!(token);
            }
            let page: SearchPage = self.api.post(url.clone(), &body).await?;
            names.extend(
                page.results
                    .into_iter()
                    .filter(|r| r.search_result_subtype == "tag_template")
                    .map(|r| r.relative_resource_name),
            );
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => token = next,
                None => return Ok(names),
            }
        }
    }

    async fn list_taxonomies(&self, project_id: &str, location: &str) -> Result<Vec<Taxonomy>> {
        let path = format!("projects/{project_id}/locations/{location}/taxonomies");
        let taxonomies = self
            .api
            .get_pages(&path, &[], |page: TaxonomyPage| {
                (page.taxonomies, page.next_page_token)
            })
            .await?;
        Ok(taxonomies
            .into_iter()
            .map(|t| Taxonomy {
                name: t.name,
                display_name: t.display_name,
                description: t.description,
            })
            .collect())
    }

    async fn create_taxonomy(
        &self,
        project_id: &str,
        location: &str,
        display_name: &str,
        description: Option<&str>,
    ) -> Result<Taxonomy> {
        let url = self
            .api
            .url(&format!("projects/{project_id}/locations/{location}/taxonomies"))?;
        let body = json!({
            "displayName": display_name,
            "description": description.unwrap_or_default(),
            "activatedPolicyTypes": ["FINE_GRAINED_ACCESS_CONTROL"],
        });
        let created: WireTaxonomy = self.api.post(url, &body).await?;
        Ok(Taxonomy {
            name: created.name,
            display_name: created.display_name,
            description: created.description,
        })
    }

    async fn list_policy_tags(&self, taxonomy: &str) -> Result<Vec<PolicyTag>> {
        let tags = self
            .api
            .get_pages(&format!("{taxonomy}/policyTags"), &[], |page: PolicyTagPage| {
                (page.policy_tags, page.next_page_token)
            })
            .await?;
        Ok(tags.into_iter().map(into_policy_tag).collect())
    }

    async fn create_policy_tag(
        &self,
        taxonomy: &str,
        display_name: &str,
        description: Option<&str>,
        parent: Option<&str>,
    ) -> Result<PolicyTag> {
        let url = self.api.url(&format!("{taxonomy}/policyTags"))?;
        let body = WirePolicyTag {
            name: String::new(),
            display_name: display_name.to_string(),
            description: description.map(str::to_string),
            parent_policy_tag: parent.map(str::to_string),
        };
        let created: WirePolicyTag = self.api.post(url, &body).await?;
        Ok(into_policy_tag(created))
    }
}

fn into_policy_tag(wire: WirePolicyTag) -> PolicyTag {
    PolicyTag {
        name: wire.name,
        display_name: wire.display_name,
        description: wire.description.filter(|d| !d.is_empty()),
        parent_policy_tag: wire.parent_policy_tag.filter(|p| !p.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tag_wire_format() {
        let tag = Tag {
            name: None,
            template: "projects/p/locations/eu/tagTemplates/gov".into(),
            column: Some("email".into()),
            fields: BTreeMap::from([
                ("owner".to_string(), TagValue::String("alice".into())),
                ("tier".to_string(), TagValue::Enum("gold".into())),
                ("score".to_string(), TagValue::Double(0.5)),
            ]),
        };
        let wire = serde_json::to_value(WireTag::from(&tag)).unwrap();
        assert_eq!(
            wire,
            json!({
                "template": "projects/p/locations/eu/tagTemplates/gov",
                "column": "email",
                "fields": {
                    "owner": {"stringValue": "alice"},
                    "score": {"doubleValue": 0.5},
                    "tier": {"enumValue": {"displayName": "gold"}}
                }
            })
        );
    }

    #[test]
    fn test_tag_from_response() {
        let wire: WireTag = serde_json::from_value(json!({
            "name": "entries/e/tags/1",
            "template": "projects/p/locations/eu/tagTemplates/gov",
            "templateDisplayName": "Gov",
            "fields": {
                "pii": {"displayName": "PII", "boolValue": true},
                "when": {"displayName": "When", "timestampValue": "2024-01-01T00:00:00Z"}
            }
        }))
        .unwrap();
        let tag = Tag::from(wire);
        assert_eq!(tag.column, None);
        assert_eq!(tag.fields["pii"], TagValue::Bool(true));
        assert_eq!(
            tag.fields["when"],
            TagValue::Timestamp("2024-01-01T00:00:00Z".into())
        );
    }

    #[test]
    fn test_template_from_response() {
        let wire: WireTemplate = serde_json::from_value(json!({
            "name": "projects/p/locations/eu/tagTemplates/gov",
            "displayName": "Gov",
            "fields": {
                "owner": {"displayName": "Owner", "type": {"primitiveType": "STRING"}, "isRequired": true, "order": 2},
                "tier": {"displayName": "Tier", "type": {"enumType": {"allowedValues": [{"displayName": "gold"}]}}}
            }
        }))
        .unwrap();
        let template = into_template(wire, "ignored").unwrap();
        assert_eq!(template.template_id, "gov");
        assert_eq!(template.location, "eu");
        assert!(template.fields["owner"].required);
        assert_eq!(
            template.fields["tier"].field_type,
            FieldType::Enum(vec!["gold".into()])
        );
    }

    #[test]
    fn test_template_field_wire_format() {
        let field = TemplateField {
            display_name: "PII".into(),
            field_type: FieldType::Bool,
            required: false,
            description: None,
            order: 1,
        };
        let wire = serde_json::to_value(WireTemplateField::from(&field)).unwrap();
        assert_eq!(wire["type"], json!({"primitiveType": "BOOL"}));
        assert_eq!(wire["isRequired"], json!(false));
    }
}
