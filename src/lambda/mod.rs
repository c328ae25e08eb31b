// src/lambda/mod.rs

//! AWS Lambda handler for the steward.
//!
//! Each invocation:
//! 1. Loads the job configuration from S3 (`CONFIG_BUCKET`, `CONFIG_KEY`)
//! 2. Opens the configured landing store
//! 3. Runs the requested command against the live services

use std::sync::Arc;

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::ConfigLoader;
use crate::error::{AppError, Result};
use crate::models::{Area, BatchResult, JobConfig};
use crate::pipeline::{self, ExtractSummary};
use crate::services::{Services, rest};
use crate::storage::{self, FileStore, S3Store};

const DEFAULT_CONFIG_KEY: &str = "config/config.json";

/// What to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Templates,
    Tags,
    Taxonomies,
    Dlp,
    #[default]
    All,
    Extract,
}

/// Lambda invocation payload.
#[derive(Debug, Default, Deserialize)]
pub struct StewardRequest {
    #[serde(default)]
    pub command: Command,

    /// Overrides `CONFIG_KEY` for this invocation
    #[serde(default)]
    pub config_key: Option<String>,
}

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
pub struct StewardResponse {
    pub success: bool,

    /// One entry per landing area processed
    pub results: Vec<BatchResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractSummary>,

    /// Error message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

/// Main Lambda handler function.
#[instrument(skip(event))]
pub async fn handler(
    event: LambdaEvent<StewardRequest>,
) -> std::result::Result<StewardResponse, LambdaError> {
    let start = std::time::Instant::now();
    let (request, _context) = event.into_parts();

    info!("Starting command: {:?}", request.command);

    match run(&request).await {
        Ok(mut response) => {
            response.success = true;
            response.execution_time_ms = start.elapsed().as_millis() as u64;
            let failed: usize = response.results.iter().map(|r| r.records_failed).sum();
            info!(
                "Command {:?} completed: {} areas, {} failed records in {}ms",
                request.command,
                response.results.len(),
                failed,
                response.execution_time_ms
            );
            Ok(response)
        }
        Err(e) => {
            error!("Command {:?} failed: {}", request.command, e);
            Ok(StewardResponse {
                success: false,
                error: Some(e.to_string()),
                execution_time_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            })
        }
    }
}

async fn run(request: &StewardRequest) -> Result<StewardResponse> {
    let config = load_lambda_config(request.config_key.as_deref()).await?;
    let store = storage::from_config(&config.storage).await?;
    let services = rest::services(&config)?;
    execute(request.command, &config, store, &services).await
}

/// Run one command against already built collaborators.
pub async fn execute(
    command: Command,
    config: &JobConfig,
    store: Arc<dyn FileStore>,
    services: &Services,
) -> Result<StewardResponse> {
    let mut response = StewardResponse::default();
    let area = match command {
        Command::All => {
            response.results = pipeline::run_all(config, store, services).await?;
            return Ok(response);
        }
        Command::Extract => {
            response.extract = Some(pipeline::run_extract(config, store.as_ref(), services).await?);
            return Ok(response);
        }
        Command::Templates => Area::Templates,
        Command::Tags => Area::Tags,
        Command::Taxonomies => Area::Taxonomies,
        Command::Dlp => Area::Dlp,
    };
    response
        .results
        .push(pipeline::run_area(area, config, store, services).await?);
    Ok(response)
}

/// Load the job configuration from S3.
async fn load_lambda_config(key: Option<&str>) -> Result<JobConfig> {
    let bucket = std::env::var("CONFIG_BUCKET")
        .map_err(|_| AppError::config("environment variable CONFIG_BUCKET is not set"))?;
    let key = key
        .map(str::to_string)
        .or_else(|| std::env::var("CONFIG_KEY").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_KEY.to_string());

    let store = Arc::new(S3Store::from_env(&bucket, "").await);
    ConfigLoader::new(store, &key).load_config().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryServices;
    use crate::storage::LocalStore;
    use tempfile::TempDir;

    #[test]
    fn test_request_defaults() {
        let req: StewardRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.command, Command::All);
        assert!(req.config_key.is_none());
    }

    #[test]
    fn test_request_with_command() {
        let req: StewardRequest =
            serde_json::from_str(r#"{"command": "taxonomies", "config_key": "a/b.toml"}"#)
                .unwrap();
        assert_eq!(req.command, Command::Taxonomies);
        assert_eq!(req.config_key.as_deref(), Some("a/b.toml"));
    }

    #[tokio::test]
    async fn test_execute_single_area() {
        let dir = TempDir::new().unwrap();
        let config = JobConfig {
            project_id: "proj".into(),
            resource_location: "eu".into(),
            ..JobConfig::default()
        };
        let store: Arc<dyn FileStore> = Arc::new(LocalStore::new(dir.path()));
        store
            .write(
                "taxonomies/landing/taxonomy_pii.json",
                br#"{"taxonomy_display_name": "PII", "policy_tags": [{"display_name": "Email"}]}"#,
            )
            .await
            .unwrap();
        let fakes = MemoryServices::new();

        let response = execute(Command::Taxonomies, &config, store, &fakes.services())
            .await
            .unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].files_processed, 1);
        assert_eq!(fakes.catalog.taxonomies().len(), 1);
    }
}
