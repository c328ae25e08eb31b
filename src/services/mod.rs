// src/services/mod.rs

//! External service seams and the record operations built on them.
//!
//! Each managed service the steward talks to is a trait so the pipelines
//! can run against the REST clients in [`rest`] or the in-memory fakes in
//! [`memory`]. Clients are built once per process and passed in through
//! [`Services`].

pub mod dlp;
pub mod memory;
pub mod notify;
pub mod rest;
pub mod tags;
pub mod taxonomies;
pub mod templates;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{EntryTarget, InspectRequest, PolicyTag, Tag, TagTemplate, Taxonomy};

pub use dlp::DlpExecutor;
pub use notify::await_completion;
pub use tags::TagExecutor;
pub use taxonomies::TaxonomyExecutor;
pub use templates::TemplateExecutor;

/// Metadata catalog: entries, tags, templates and policy tag taxonomies.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Resource name of the catalog entry for a dataset or table.
    async fn lookup_entry(&self, target: &EntryTarget) -> Result<String>;

    /// Tags attached to an entry, including column-scoped ones.
    async fn list_tags(&self, entry: &str) -> Result<Vec<Tag>>;

    async fn create_tag(&self, entry: &str, tag: &Tag) -> Result<Tag>;

    async fn delete_tag(&self, tag_name: &str) -> Result<()>;

    /// Fetch a template by resource name; `None` when it does not exist.
    async fn get_template(&self, name: &str) -> Result<Option<TagTemplate>>;

    async fn create_template(&self, template: &TagTemplate) -> Result<TagTemplate>;

    /// Delete a template together with the tags created from it.
    async fn delete_template(&self, name: &str) -> Result<()>;

    /// Resource names of all templates in a project.
    async fn search_templates(&self, project_id: &str) -> Result<Vec<String>>;

    async fn list_taxonomies(&self, project_id: &str, location: &str) -> Result<Vec<Taxonomy>>;

    async fn create_taxonomy(
        &self,
        project_id: &str,
        location: &str,
        display_name: &str,
        description: Option<&str>,
    ) -> Result<Taxonomy>;

    async fn list_policy_tags(&self, taxonomy: &str) -> Result<Vec<PolicyTag>>;

    async fn create_policy_tag(
        &self,
        taxonomy: &str,
        display_name: &str,
        description: Option<&str>,
        parent: Option<&str>,
    ) -> Result<PolicyTag>;
}

/// One result row, column name to value.
pub type Row = BTreeMap<String, Value>;

/// Table reference inside the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Data warehouse query engine.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn list_datasets(&self, project_id: &str) -> Result<Vec<String>>;

    async fn list_tables(&self, project_id: &str, dataset_id: &str) -> Result<Vec<String>>;

    /// Run a standard SQL query and wait for its rows.
    async fn query(&self, project_id: &str, sql: &str) -> Result<Vec<Row>>;

    /// Attach a policy tag to one column, keeping the rest of the schema.
    async fn set_column_policy_tag(&self, table: &TableRef, column: &str, policy_tag: &str)
    -> Result<()>;

    /// Drop a table. A missing table is not an error.
    async fn delete_table(&self, table: &TableRef) -> Result<()>;

    /// Replace a table's content with a CSV file (header row skipped).
    /// Returns the number of rows loaded.
    async fn load_csv(
        &self,
        table: &TableRef,
        schema: &BTreeMap<String, String>,
        csv: &[u8],
    ) -> Result<u64>;
}

/// Sensitive-data discovery service.
#[async_trait]
pub trait DlpService: Send + Sync {
    /// Start an inspect job, returning its resource name.
    async fn create_inspect_job(&self, request: &InspectRequest) -> Result<String>;
}

/// A message delivered on a notification subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub ack_id: String,
    pub message_id: String,
    pub attributes: BTreeMap<String, String>,
}

/// Pull subscription on a notification channel.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Messages currently available. May be empty.
    async fn pull(&self) -> Result<Vec<Notification>>;

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()>;

    /// Hand messages back for other consumers without acknowledging them.
    async fn release(&self, _ack_ids: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Service clients shared by every pipeline in a process.
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn CatalogService>,
    pub warehouse: Arc<dyn Warehouse>,
    pub dlp: Arc<dyn DlpService>,
    pub subscription: Arc<dyn Subscription>,
}
