// src/services/rest/bigquery.rs

//! Warehouse client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::services::rest::ApiClient;
use crate::services::{Row, TableRef, Warehouse};

const JOB_POLL_INTERVAL: Duration = Duration::from_secs(2);
const QUERY_TIMEOUT_MS: u64 = 10_000;
const MULTIPART_BOUNDARY: &str = "catalog_steward_boundary";

pub struct RestWarehouse {
    api: ApiClient,
    upload: ApiClient,
}

impl RestWarehouse {
    pub(crate) fn new(api: ApiClient, upload: ApiClient) -> Self {
        Self { api, upload }
    }

    fn table_path(table: &TableRef) -> String {
        format!(
            "projects/{}/datasets/{}/tables/{}",
            table.project_id, table.dataset_id, table.table_id
        )
    }

    /// Poll a job until it reaches `DONE`.
    async fn wait_for_job(&self, project_id: &str, job: &JobReference) -> Result<JobResponse> {
        let path = format!("projects/{}/jobs/{}", project_id, job.job_id);
        let location = job.location.clone().unwrap_or_default();
        loop {
            let url = self.api.url_with(&path, &[("location", location.as_str())])?;
            let response: JobResponse = self.api.get(url).await?;
            if response.status.state == "DONE" {
                if let Some(error) = &response.status.error_result {
                    return Err(AppError::service(
                        "bigquery",
                        format!("job {} failed: {}", job.job_id, error.message),
                    ));
                }
                return Ok(response);
            }
            debug!("Job {} is {}", job.job_id, response.status.state);
            tokio::time::sleep(JOB_POLL_INTERVAL).await;
        }
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetPage {
    #[serde(default)]
    datasets: Vec<DatasetItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetItem {
    dataset_reference: DatasetReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    dataset_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TablePage {
    #[serde(default)]
    tables: Vec<TableItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableItem {
    table_reference: TableReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: JobReference,
    #[serde(default)]
    schema: Option<Schema>,
    #[serde(default)]
    rows: Vec<QueryRow>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Schema {
    #[serde(default)]
    fields: Vec<SchemaField>,
}

#[derive(Debug, Deserialize)]
struct SchemaField {
    name: String,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    #[serde(default)]
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResponse {
    job_reference: JobReference,
    status: JobStatus,
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<JobError>,
}

#[derive(Debug, Deserialize)]
struct JobError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatistics {
    #[serde(default)]
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    #[serde(default)]
    output_rows: Option<String>,
}

fn rows_from(schema: &[SchemaField], rows: Vec<QueryRow>) -> Vec<Row> {
    rows.into_iter()
        .map(|row| {
            schema
                .iter()
                .zip(row.f)
                .map(|(field, cell)| (field.name.clone(), cell.v))
                .collect()
        })
        .collect()
}

/// Load schema in CSV header order. Columns missing from the configured
/// schema load as STRING.
fn ordered_schema(csv: &[u8], schema: &BTreeMap<String, String>) -> Result<Vec<Value>> {
    let mut reader = csv::Reader::from_reader(csv);
    Ok(reader
        .headers()?
        .iter()
        .map(|name| {
            let field_type = schema.get(name).map(String::as_str).unwrap_or("STRING");
            json!({"name": name, "type": field_type})
        })
        .collect())
}

/// `multipart/related` body with the job metadata and the CSV media.
fn multipart_body(metadata: &Value, media: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(media.len() + 512);
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
             --{MULTIPART_BOUNDARY}\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

#[async_trait]
impl Warehouse for RestWarehouse {
    async fn list_datasets(&self, project_id: &str) -> Result<Vec<String>> {
        self.api
            .get_pages(
                &format!("projects/{project_id}/datasets"),
                &[],
                |page: DatasetPage| {
                    (
                        page.datasets
                            .into_iter()
                            .map(|d| d.dataset_reference.dataset_id)
                            .collect(),
                        page.next_page_token,
                    )
                },
            )
            .await
    }

    async fn list_tables(&self, project_id: &str, dataset_id: &str) -> Result<Vec<String>> {
        self.api
            .get_pages(
                &format!("projects/{project_id}/datasets/{dataset_id}/tables"),
                &[],
                |page: TablePage| {
                    (
                        page.tables
                            .into_iter()
                            .map(|t| t.table_reference.table_id)
                            .collect(),
                        page.next_page_token,
                    )
                },
            )
            .await
    }

    async fn query(&self, project_id: &str, sql: &str) -> Result<Vec<Row>> {
        let url = self.api.url(&format!("projects/{project_id}/queries"))?;
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": QUERY_TIMEOUT_MS,
        });
        let mut response: QueryResponse = self.api.post(url, &body).await?;

        let path = format!(
            "projects/{}/queries/{}",
            project_id, response.job_reference.job_id
        );
        let location = response.job_reference.location.clone().unwrap_or_default();
        let timeout = QUERY_TIMEOUT_MS.to_string();
        let mut rows = Vec::new();
        loop {
            if response.job_complete {
                let schema = response.schema.take().map(|s| s.fields).unwrap_or_default();
                rows.extend(rows_from(&schema, std::mem::take(&mut response.rows)));
                let Some(token) = response.page_token.take().filter(|t| !t.is_empty()) else {
                    return Ok(rows);
                };
                let url = self.api.url_with(
                    &path,
                    &[("location", location.as_str()), ("pageToken", token.as_str())],
                )?;
                response = self.api.get(url).await?;
            } else {
                tokio::time::sleep(JOB_POLL_INTERVAL).await;
                let url = self.api.url_with(
                    &path,
                    &[("location", location.as_str()), ("timeoutMs", timeout.as_str())],
                )?;
                response = self.api.get(url).await?;
            }
        }
    }

    async fn set_column_policy_tag(
        &self,
        table: &TableRef,
        column: &str,
        policy_tag: &str,
    ) -> Result<()> {
        let url = self.api.url(&Self::table_path(table))?;
        let current: Value = self.api.get(url.clone()).await?;
        let mut fields = current
            .pointer("/schema/fields")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let field = fields
            .iter_mut()
            .find(|f| f.get("name").and_then(Value::as_str) == Some(column))
            .ok_or_else(|| AppError::not_found(format!("column {column} in {table}")))?;
        field["policyTags"] = json!({"names": [policy_tag]});

        let _: Value = self
            .api
            .patch(url, &json!({"schema": {"fields": fields}}))
            .await?;
        Ok(())
    }

    async fn delete_table(&self, table: &TableRef) -> Result<()> {
        match self.api.delete(self.api.url(&Self::table_path(table))?).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn load_csv(
        &self,
        table: &TableRef,
        schema: &BTreeMap<String, String>,
        csv: &[u8],
    ) -> Result<u64> {
        let metadata = json!({
            "configuration": {
                "load": {
                    "destinationTable": {
                        "projectId": table.project_id,
                        "datasetId": table.dataset_id,
                        "tableId": table.table_id,
                    },
                    "schema": {"fields": ordered_schema(csv, schema)?},
                    "sourceFormat": "CSV",
                    "skipLeadingRows": 1,
                    "writeDisposition": "WRITE_TRUNCATE",
                }
            }
        });

        let url = self.upload.url_with(
            &format!("projects/{}/jobs", table.project_id),
            &[("uploadType", "multipart")],
        )?;
        let started: JobResponse = self
            .upload
            .post_raw(
                url,
                &format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
                multipart_body(&metadata, csv),
            )
            .await?;

        let done = self
            .wait_for_job(&table.project_id, &started.job_reference)
            .await?;
        let rows = done
            .statistics
            .and_then(|s| s.load)
            .and_then(|l| l.output_rows)
            .and_then(|r| r.parse().ok())
            .unwrap_or(0);
        info!("Load job {} wrote {} rows to {}", done.job_reference.job_id, rows, table);
        Ok(rows)
    }
}
