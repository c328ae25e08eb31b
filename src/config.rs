// src/config.rs

//! Configuration loading utilities.
//!
//! Locally the job configuration is a file on disk. In Lambda it is an
//! object in the same store that holds the landing areas.

use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::error::{AppError, Result};
use crate::models::JobConfig;
use crate::storage::FileStore;

/// Config loader reading the job configuration from a file store.
pub struct ConfigLoader {
    store: Arc<dyn FileStore>,
    key: String,
}

impl ConfigLoader {
    pub fn new(store: Arc<dyn FileStore>, key: &str) -> Self {
        Self {
            store,
            key: key.trim_start_matches('/').to_string(),
        }
    }

    /// Load and validate the configuration document.
    pub async fn load_config(&self) -> Result<JobConfig> {
        info!("Loading config file from {}", self.store.uri(&self.key));
        let bytes = self
            .store
            .read_optional(&self.key)
            .await?
            .ok_or_else(|| AppError::config(format!("Config file not found: {}", self.key)))?;

        let content = String::from_utf8(bytes).map_err(|e| {
            AppError::config(format!("Config file {} is not valid UTF-8: {}", self.key, e))
        })?;
        let config = JobConfig::parse(&content, &self.key)?;
        config.validate()?;
        Ok(config)
    }
}

/// Load configuration from a local file.
pub fn load_config(path: &Path) -> Result<JobConfig> {
    if !path.exists() {
        return Err(AppError::config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    JobConfig::load(path)
}
