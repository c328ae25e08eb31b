// src/services/rest/dlp.rs

use async_trait::async_trait;
use log::info;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::Result;
use crate::models::InspectRequest;
use crate::services::DlpService;
use crate::services::rest::ApiClient;

pub struct RestDlp {
    api: ApiClient,
}

impl RestDlp {
    pub(crate) fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[derive(Debug, Deserialize)]
struct DlpJob {
    name: String,
}

/// Inspect job body: scan a table sample, save findings next to it and
/// announce completion on the topic.
fn inspect_job(request: &InspectRequest) -> Value {
    let info_types: Vec<Value> = request
        .info_types
        .iter()
        .map(|name| json!({"name": name}))
        .collect();

    json!({
        "inspectJob": {
            "storageConfig": {
                "bigQueryOptions": {
                    "tableReference": {
                        "projectId": request.project_id,
                        "datasetId": request.dataset_id,
                        "tableId": request.table_id,
                    },
                    "rowsLimit": request.max_rows,
                    "sampleMethod": "RANDOM_START",
                }
            },
            "inspectConfig": {
                "infoTypes": info_types,
                "includeQuote": false,
            },
            "actions": [
                {
                    "saveFindings": {
                        "outputConfig": {
                            "table": {
                                "projectId": request.project_id,
                                "datasetId": request.dataset_id,
                                "tableId": request.findings_table,
                            }
                        }
                    }
                },
                {
                    "pubSub": {
                        "topic": format!("projects/{}/topics/{}", request.project_id, request.topic_id),
                    }
                }
            ]
        }
    })
}

#[async_trait]
impl DlpService for RestDlp {
    async fn create_inspect_job(&self, request: &InspectRequest) -> Result<String> {
        let url = self.api.url(&format!(
            "projects/{}/locations/{}/dlpJobs",
            request.project_id, request.location
        ))?;
        let job: DlpJob = self.api.post(url, &inspect_job(request)).await?;
        info!(
            "Started inspect job {} for {}.{}",
            job.name, request.dataset_id, request.table_id
        );
        Ok(job.name)
    }
}
