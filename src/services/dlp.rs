// src/services/dlp.rs

//! DLP area executor: runs a sensitive-data scan per record.
//!
//! For each request the executor starts an inspect job that saves findings
//! to `<table>_DLP` and notifies the configured topic, waits for the
//! completion message, then reads the findings aggregated per column. A
//! scan that does not report within `dlp.timeout_secs` fails its record.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};

use crate::error::{AppError, Result};
use crate::models::{
    ColumnFinding, DlpConfig, DlpJobSpec, InspectRequest, LandingFile, NormalizedRecord,
};
use crate::pipeline::RecordOperation;
use crate::services::{Row, Services, TableRef, await_completion};

/// Likelihoods counted as a finding.
const LIKELIHOODS: [&str; 3] = ["POSSIBLE", "LIKELY", "VERY_LIKELY"];

/// Query aggregating a findings table per column, dominant info type first.
pub fn findings_query(request: &InspectRequest) -> String {
    let likelihoods = LIKELIHOODS
        .iter()
        .map(|l| format!("'{l}'"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT counts.field_name, \
           STRING_AGG(counts.info_type ORDER BY counts.total DESC) AS info_types \
         FROM ( \
           SELECT locations.record_location.field_id.name AS field_name, \
             info_type.name AS info_type, COUNT(*) AS total \
           FROM `{project}.{dataset}.{table}`, \
             UNNEST(location.content_locations) AS locations \
           WHERE likelihood IN ({likelihoods}) \
           GROUP BY field_name, info_type \
           HAVING total > {min_count} \
         ) AS counts \
         GROUP BY counts.field_name \
         ORDER BY counts.field_name",
        project = request.project_id,
        dataset = request.dataset_id,
        table = request.findings_table,
        min_count = request.min_count,
    )
}

fn finding_from_row(row: &Row) -> Option<ColumnFinding> {
    let field = row.get("field_name")?.as_str()?;
    let joined = row.get("info_types")?.as_str()?;
    Some(ColumnFinding::from_aggregate(field, joined))
}

/// Runs scans and optionally classifies flagged columns.
pub struct DlpExecutor {
    services: Services,
    project_id: String,
    resource_location: String,
    config: DlpConfig,
    /// Taxonomy resource name per location, looked up once per run
    taxonomies: Mutex<HashMap<String, String>>,
}

impl DlpExecutor {
    pub fn new(
        services: Services,
        project_id: impl Into<String>,
        resource_location: impl Into<String>,
        config: DlpConfig,
    ) -> Self {
        Self {
            services,
            project_id: project_id.into(),
            resource_location: resource_location.into(),
            config,
            taxonomies: Mutex::new(HashMap::new()),
        }
    }

    async fn taxonomy(&self, project_id: &str, location: &str) -> Result<String> {
        let cached = self
            .taxonomies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
            .cloned();
        if let Some(name) = cached {
            return Ok(name);
        }

        let display_name = self.config.taxonomy_display_name.as_deref().unwrap_or("");
        let name = self
            .services
            .catalog
            .list_taxonomies(project_id, location)
            .await?
            .into_iter()
            .find(|t| t.display_name == display_name)
            .map(|t| t.name)
            .ok_or_else(|| {
                AppError::not_found(format!("taxonomy '{display_name}' in {location}"))
            })?;

        self.taxonomies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.to_string(), name.clone());
        Ok(name)
    }

    /// Attach a `DLP-<INFO_TYPE>` policy tag to every flagged column.
    async fn classify(&self, request: &InspectRequest, findings: &[ColumnFinding]) -> Result<()> {
        let catalog = &self.services.catalog;
        let taxonomy = self.taxonomy(&request.project_id, &request.location).await?;
        let mut existing = catalog.list_policy_tags(&taxonomy).await?;
        let table = TableRef::new(&request.project_id, &request.dataset_id, &request.table_id);

        for finding in findings {
            let Some(tag_name) = finding.policy_tag_name() else {
                continue;
            };
            let found = existing
                .iter()
                .find(|t| t.display_name == tag_name && t.parent_policy_tag.is_none())
                .map(|t| t.name.clone());
            let policy_tag = match found {
                Some(name) => name,
                None => {
                    let description = format!("DLP generated tag for {}", finding.field_name);
                    let tag = catalog
                        .create_policy_tag(&taxonomy, &tag_name, Some(&description), None)
                        .await?;
                    let name = tag.name.clone();
                    existing.push(tag);
                    name
                }
            };

            self.services
                .warehouse
                .set_column_policy_tag(&table, &finding.field_name, &policy_tag)
                .await?;
            info!("Classified {}.{} as {}", table, finding.field_name, tag_name);
        }
        Ok(())
    }
}

#[async_trait]
impl RecordOperation for DlpExecutor {
    fn name(&self) -> &str {
        "dlp"
    }

    async fn apply(&self, _file: &LandingFile, record: &NormalizedRecord) -> Result<()> {
        let spec: DlpJobSpec = record.to_typed()?;
        let request = spec.resolve(&self.project_id, &self.resource_location, &self.config)?;

        let job = self.services.dlp.create_inspect_job(&request).await?;
        info!(
            "Started DLP job {} on {}.{}",
            job, request.dataset_id, request.table_id
        );

        let completed = await_completion(
            self.services.subscription.as_ref(),
            &job,
            Duration::from_secs(self.config.timeout_secs),
            Duration::from_millis(self.config.poll_interval_ms),
        )
        .await?;
        if !completed {
            return Err(AppError::Timeout(format!(
                "DLP job {} after {}s",
                job, self.config.timeout_secs
            )));
        }

        let rows = self
            .services
            .warehouse
            .query(&request.project_id, &findings_query(&request))
            .await?;
        let findings: Vec<ColumnFinding> = rows.iter().filter_map(finding_from_row).collect();
        if findings.len() < rows.len() {
            warn!(
                "Ignored {} malformed findings rows",
                rows.len() - findings.len()
            );
        }

        for finding in &findings {
            info!(
                "{}.{}: {}",
                request.table_id,
                finding.field_name,
                finding.policy_tag_name().unwrap_or_default()
            );
        }

        if self.config.apply_policy_tags && !findings.is_empty() {
            self.classify(&request, &findings).await?;
        }

        if self.config.cleanup_findings {
            let findings_table =
                TableRef::new(&request.project_id, &request.dataset_id, &request.findings_table);
            self.services.warehouse.delete_table(&findings_table).await?;
        }

        Ok(())
    }
}
