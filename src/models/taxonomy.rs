//! Policy tag taxonomies.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A taxonomy file as dropped in the landing area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    pub taxonomy_display_name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub policy_tags: Vec<PolicyTagSpec>,
}

/// One node of the policy tag hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTagSpec {
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sub_tag: Vec<PolicyTagSpec>,
}

impl TaxonomyConfig {
    /// Check names are present and unique among siblings.
    pub fn validate(&self) -> Result<()> {
        if self.taxonomy_display_name.trim().is_empty() {
            return Err(AppError::validation("taxonomy_display_name is empty"));
        }
        check_siblings(&self.policy_tags, &self.taxonomy_display_name)
    }

    /// Total number of policy tags at every depth.
    pub fn tag_count(&self) -> usize {
        fn count(tags: &[PolicyTagSpec]) -> usize {
            tags.iter().map(|t| 1 + count(&t.sub_tag)).sum()
        }
        count(&self.policy_tags)
    }
}

fn check_siblings(tags: &[PolicyTagSpec], parent: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for tag in tags {
        if tag.display_name.trim().is_empty() {
            return Err(AppError::validation(format!(
                "policy tag under '{parent}' has an empty display_name"
            )));
        }
        if !seen.insert(tag.display_name.as_str()) {
            return Err(AppError::validation(format!(
                "duplicate policy tag '{}' under '{}'",
                tag.display_name, parent
            )));
        }
        check_siblings(&tag.sub_tag, &tag.display_name)?;
    }
    Ok(())
}

/// A taxonomy as known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
}

/// A policy tag as known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTag {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub parent_policy_tag: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> TaxonomyConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_nested_tags_counted() {
        let cfg = config(json!({
            "taxonomy_display_name": "Sensitivity",
            "policy_tags": [
                {"display_name": "High", "sub_tag": [
                    {"display_name": "PII", "sub_tag": [{"display_name": "Email"}]}
                ]},
                {"display_name": "Low"}
            ]
        }));
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.tag_count(), 4);
    }

    #[test]
    fn test_duplicate_siblings_rejected() {
        let cfg = config(json!({
            "taxonomy_display_name": "Sensitivity",
            "policy_tags": [{"display_name": "High"}, {"display_name": "High"}]
        }));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_same_name_at_different_depth_allowed() {
        let cfg = config(json!({
            "taxonomy_display_name": "Sensitivity",
            "policy_tags": [{"display_name": "High", "sub_tag": [{"display_name": "High"}]}]
        }));
        assert!(cfg.validate().is_ok());
    }
}
