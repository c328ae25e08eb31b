// src/services/memory.rs

//! In-memory service fakes.
//!
//! Used by the test suite, where no request may leave the process. They keep enough state to observe what a run did: tags per
//! entry, templates, taxonomies, policy tag assignments and loads.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{
    EntryTarget, InspectRequest, PolicyTag, Tag, TagTemplate, Taxonomy, parse_template_path,
};
use crate::services::notify::JOB_ATTRIBUTE;
use crate::services::{
    CatalogService, DlpService, Notification, Row, Services, Subscription, TableRef, Warehouse,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// --- Catalog ---

#[derive(Default)]
struct CatalogState {
    missing_entries: HashSet<String>,
    tags: BTreeMap<String, Vec<Tag>>,
    templates: BTreeMap<String, TagTemplate>,
    taxonomies: Vec<(String, String, Taxonomy)>,
    policy_tags: BTreeMap<String, Vec<PolicyTag>>,
    failing_columns: HashSet<String>,
    failing_policy_tags: HashSet<String>,
    next_id: u64,
}

impl CatalogState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Catalog fake. Every dataset and table has an entry unless marked missing.
#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry name the fake assigns to a target.
    pub fn entry_name(target: &EntryTarget) -> String {
        format!("entries/{target}")
    }

    /// Make lookups for this target fail with not found.
    pub fn remove_entry(&self, target: &EntryTarget) {
        lock(&self.state)
            .missing_entries
            .insert(target.linked_resource());
    }

    /// Make tag creation fail for tags scoped to this column.
    pub fn fail_tags_on_column(&self, column: &str) {
        lock(&self.state).failing_columns.insert(column.to_string());
    }

    /// Make the next creation of this policy tag fail.
    pub fn fail_policy_tag_once(&self, display_name: &str) {
        lock(&self.state)
            .failing_policy_tags
            .insert(display_name.to_string());
    }

    pub fn insert_template(&self, template: TagTemplate) {
        lock(&self.state)
            .templates
            .insert(template.name.clone(), template);
    }

    pub fn template(&self, name: &str) -> Option<TagTemplate> {
        lock(&self.state).templates.get(name).cloned()
    }

    pub fn tags_for(&self, target: &EntryTarget) -> Vec<Tag> {
        lock(&self.state)
            .tags
            .get(&Self::entry_name(target))
            .cloned()
            .unwrap_or_default()
    }

    pub fn taxonomies(&self) -> Vec<Taxonomy> {
        lock(&self.state)
            .taxonomies
            .iter()
            .map(|(_, _, t)| t.clone())
            .collect()
    }

    pub fn policy_tags(&self, taxonomy: &str) -> Vec<PolicyTag> {
        lock(&self.state)
            .policy_tags
            .get(taxonomy)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CatalogService for MemoryCatalog {
    async fn lookup_entry(&self, target: &EntryTarget) -> Result<String> {
        let state = lock(&self.state);
        if state.missing_entries.contains(&target.linked_resource()) {
            return Err(AppError::not_found(format!("entry for {target}")));
        }
        Ok(Self::entry_name(target))
    }

    async fn list_tags(&self, entry: &str) -> Result<Vec<Tag>> {
        Ok(lock(&self.state).tags.get(entry).cloned().unwrap_or_default())
    }

    async fn create_tag(&self, entry: &str, tag: &Tag) -> Result<Tag> {
        let mut state = lock(&self.state);
        if !state.templates.contains_key(&tag.template) {
            return Err(AppError::not_found(format!("template {}", tag.template)));
        }
        if let Some(column) = &tag.column {
            if state.failing_columns.contains(column) {
                return Err(AppError::service("catalog", "simulated failure"));
            }
        }
        let id = state.next_id();
        let mut created = tag.clone();
        created.name = Some(format!("{entry}/tags/{id}"));
        state
            .tags
            .entry(entry.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn delete_tag(&self, tag_name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        for tags in state.tags.values_mut() {
            if let Some(pos) = tags.iter().position(|t| t.name.as_deref() == Some(tag_name)) {
                tags.remove(pos);
                return Ok(());
            }
        }
        Err(AppError::not_found(format!("tag {tag_name}")))
    }

    async fn get_template(&self, name: &str) -> Result<Option<TagTemplate>> {
        Ok(lock(&self.state).templates.get(name).cloned())
    }

    async fn create_template(&self, template: &TagTemplate) -> Result<TagTemplate> {
        let mut state = lock(&self.state);
        if state.templates.contains_key(&template.name) {
            return Err(AppError::already_exists(format!("template {}", template.name)));
        }
        state
            .templates
            .insert(template.name.clone(), template.clone());
        Ok(template.clone())
    }

    async fn delete_template(&self, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if state.templates.remove(name).is_none() {
            return Err(AppError::not_found(format!("template {name}")));
        }
        for tags in state.tags.values_mut() {
            tags.retain(|t| t.template != name);
        }
        Ok(())
    }

    async fn search_templates(&self, project_id: &str) -> Result<Vec<String>> {
        Ok(lock(&self.state)
            .templates
            .keys()
            .filter(|name| {
                parse_template_path(name).is_some_and(|(project, _, _)| project == project_id)
            })
            .cloned()
            .collect())
    }

    async fn list_taxonomies(&self, project_id: &str, location: &str) -> Result<Vec<Taxonomy>> {
        Ok(lock(&self.state)
            .taxonomies
            .iter()
            .filter(|(p, l, _)| p == project_id && l == location)
            .map(|(_, _, t)| t.clone())
            .collect())
    }

    async fn create_taxonomy(
        &self,
        project_id: &str,
        location: &str,
        display_name: &str,
        description: Option<&str>,
    ) -> Result<Taxonomy> {
        let mut state = lock(&self.state);
        let exists = state
            .taxonomies
            .iter()
            .any(|(p, l, t)| p == project_id && l == location && t.display_name == display_name);
        if exists {
            return Err(AppError::already_exists(format!("taxonomy {display_name}")));
        }
        let id = state.next_id();
        let taxonomy = Taxonomy {
            name: format!("projects/{project_id}/locations/{location}/taxonomies/{id}"),
            display_name: display_name.to_string(),
            description: description.map(str::to_string),
        };
        state.taxonomies.push((
            project_id.to_string(),
            location.to_string(),
            taxonomy.clone(),
        ));
        Ok(taxonomy)
    }

    async fn list_policy_tags(&self, taxonomy: &str) -> Result<Vec<PolicyTag>> {
        Ok(lock(&self.state)
            .policy_tags
            .get(taxonomy)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_policy_tag(
        &self,
        taxonomy: &str,
        display_name: &str,
        description: Option<&str>,
        parent: Option<&str>,
    ) -> Result<PolicyTag> {
        let mut state = lock(&self.state);
        if !state.taxonomies.iter().any(|(_, _, t)| t.name == taxonomy) {
            return Err(AppError::not_found(format!("taxonomy {taxonomy}")));
        }
        if state.failing_policy_tags.remove(display_name) {
            return Err(AppError::service("catalog", "quota exceeded"));
        }
        let id = state.next_id();
        let tag = PolicyTag {
            name: format!("{taxonomy}/policyTags/{id}"),
            display_name: display_name.to_string(),
            description: description.map(str::to_string),
            parent_policy_tag: parent.map(str::to_string),
        };
        state
            .policy_tags
            .entry(taxonomy.to_string())
            .or_default()
            .push(tag.clone());
        Ok(tag)
    }
}

// --- Warehouse ---

#[derive(Default)]
struct WarehouseState {
    datasets: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    query_result: Vec<Row>,
    queries: Vec<String>,
    column_tags: Vec<(TableRef, String, String)>,
    deleted: Vec<TableRef>,
    loads: Vec<(TableRef, Vec<u8>)>,
}

/// Warehouse fake. Every query returns the same configured rows.
#[derive(Default)]
pub struct MemoryWarehouse {
    state: Mutex<WarehouseState>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset, and a table in it when given.
    pub fn add_table(&self, project_id: &str, dataset: &str, table: Option<&str>) {
        let mut state = lock(&self.state);
        let tables = state
            .datasets
            .entry(project_id.to_string())
            .or_default()
            .entry(dataset.to_string())
            .or_default();
        if let Some(table) = table {
            tables.insert(table.to_string());
        }
    }

    pub fn set_query_result(&self, rows: Vec<Row>) {
        lock(&self.state).query_result = rows;
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.state).queries.clone()
    }

    /// `(table, column, policy tag)` assignments in call order.
    pub fn column_policy_tags(&self) -> Vec<(TableRef, String, String)> {
        lock(&self.state).column_tags.clone()
    }

    pub fn deleted_tables(&self) -> Vec<TableRef> {
        lock(&self.state).deleted.clone()
    }

    pub fn loads(&self) -> Vec<(TableRef, Vec<u8>)> {
        lock(&self.state).loads.clone()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn list_datasets(&self, project_id: &str) -> Result<Vec<String>> {
        Ok(lock(&self.state)
            .datasets
            .get(project_id)
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_tables(&self, project_id: &str, dataset_id: &str) -> Result<Vec<String>> {
        lock(&self.state)
            .datasets
            .get(project_id)
            .and_then(|d| d.get(dataset_id))
            .map(|t| t.iter().cloned().collect())
            .ok_or_else(|| AppError::not_found(format!("dataset {project_id}.{dataset_id}")))
    }

    async fn query(&self, _project_id: &str, sql: &str) -> Result<Vec<Row>> {
        let mut state = lock(&self.state);
        state.queries.push(sql.to_string());
        Ok(state.query_result.clone())
    }

    async fn set_column_policy_tag(
        &self,
        table: &TableRef,
        column: &str,
        policy_tag: &str,
    ) -> Result<()> {
        lock(&self.state).column_tags.push((
            table.clone(),
            column.to_string(),
            policy_tag.to_string(),
        ));
        Ok(())
    }

    async fn delete_table(&self, table: &TableRef) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(tables) = state
            .datasets
            .get_mut(&table.project_id)
            .and_then(|d| d.get_mut(&table.dataset_id))
        {
            tables.remove(&table.table_id);
        }
        state.deleted.push(table.clone());
        Ok(())
    }

    async fn load_csv(
        &self,
        table: &TableRef,
        _schema: &BTreeMap<String, String>,
        csv: &[u8],
    ) -> Result<u64> {
        let rows = csv::Reader::from_reader(csv).records().count() as u64;
        let mut state = lock(&self.state);
        state
            .datasets
            .entry(table.project_id.clone())
            .or_default()
            .entry(table.dataset_id.clone())
            .or_default()
            .insert(table.table_id.clone());
        state.loads.push((table.clone(), csv.to_vec()));
        Ok(rows)
    }
}

// --- DLP and notifications ---

/// DLP fake. When wired to a subscription, every job completes at once.
#[derive(Default)]
pub struct MemoryDlp {
    notify: Option<Arc<MemorySubscription>>,
    requests: Mutex<Vec<InspectRequest>>,
}

impl MemoryDlp {
    /// Jobs never report completion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs publish their completion message on `subscription` when created.
    pub fn completing(subscription: Arc<MemorySubscription>) -> Self {
        Self {
            notify: Some(subscription),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<InspectRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl DlpService for MemoryDlp {
    async fn create_inspect_job(&self, request: &InspectRequest) -> Result<String> {
        let job = {
            let mut requests = lock(&self.requests);
            requests.push(request.clone());
            format!(
                "projects/{}/locations/{}/dlpJobs/i-{}",
                request.project_id,
                request.location,
                requests.len()
            )
        };
        if let Some(subscription) = &self.notify {
            subscription.publish(&job);
        }
        Ok(job)
    }
}

#[derive(Default)]
struct SubscriptionState {
    pending: Vec<Notification>,
    acknowledged: Vec<String>,
    next_id: u64,
}

/// Subscription fake. Unacknowledged messages are redelivered on every pull.
#[derive(Default)]
pub struct MemorySubscription {
    state: Mutex<SubscriptionState>,
}

impl MemorySubscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a completion message for a job.
    pub fn publish(&self, job_name: &str) {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        state.pending.push(Notification {
            ack_id: format!("ack-{id}"),
            message_id: id.to_string(),
            attributes: BTreeMap::from([(JOB_ATTRIBUTE.to_string(), job_name.to_string())]),
        });
    }

    /// Messages not yet acknowledged.
    pub fn pending(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub fn acknowledged(&self) -> Vec<String> {
        lock(&self.state).acknowledged.clone()
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn pull(&self) -> Result<Vec<Notification>> {
        Ok(lock(&self.state).pending.clone())
    }

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()> {
        let mut state = lock(&self.state);
        state.pending.retain(|m| !ack_ids.contains(&m.ack_id));
        state.acknowledged.extend(ack_ids.iter().cloned());
        Ok(())
    }
}

/// A full set of fakes with typed handles for inspection.
#[derive(Clone)]
pub struct MemoryServices {
    pub catalog: Arc<MemoryCatalog>,
    pub warehouse: Arc<MemoryWarehouse>,
    pub dlp: Arc<MemoryDlp>,
    pub subscription: Arc<MemorySubscription>,
}

impl MemoryServices {
    /// Fakes whose DLP jobs complete immediately.
    pub fn new() -> Self {
        let subscription = Arc::new(MemorySubscription::new());
        Self {
            catalog: Arc::new(MemoryCatalog::new()),
            warehouse: Arc::new(MemoryWarehouse::new()),
            dlp: Arc::new(MemoryDlp::completing(subscription.clone())),
            subscription,
        }
    }

    /// Fakes whose DLP jobs never complete.
    pub fn silent() -> Self {
        Self {
            dlp: Arc::new(MemoryDlp::new()),
            ..Self::new()
        }
    }

    pub fn services(&self) -> Services {
        Services {
            catalog: self.catalog.clone(),
            warehouse: self.warehouse.clone(),
            dlp: self.dlp.clone(),
            subscription: self.subscription.clone(),
        }
    }
}

impl Default for MemoryServices {
    fn default() -> Self {
        Self::new()
    }
}
