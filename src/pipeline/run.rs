// src/pipeline/run.rs

//! Area entry points.
//!
//! Each landing area is processed by the shared [`LandingPipeline`] with the
//! record operation of that area.

use std::sync::Arc;

use log::info;

use crate::error::Result;
use crate::models::{Area, BatchResult, JobConfig};
use crate::pipeline::{LandingPipeline, RecordOperation};
use crate::services::{DlpExecutor, Services, TagExecutor, TaxonomyExecutor, TemplateExecutor};
use crate::storage::FileStore;

/// Build the record operation for an area.
pub fn executor(area: Area, config: &JobConfig, services: &Services) -> Box<dyn RecordOperation> {
    let project = config.project_id.clone();
    let location = config.resource_location.clone();
    match area {
        Area::Templates => Box::new(TemplateExecutor::new(
            services.catalog.clone(),
            project,
            location,
        )),
        Area::Tags => Box::new(TagExecutor::new(
            services.catalog.clone(),
            project,
            location,
            config.default_templates.clone(),
        )),
        Area::Taxonomies => Box::new(TaxonomyExecutor::new(
            services.catalog.clone(),
            project,
            location,
        )),
        Area::Dlp => Box::new(DlpExecutor::new(
            services.clone(),
            project,
            location,
            config.dlp.clone(),
        )),
    }
}

/// Process every landing file of one area.
pub async fn run_area(
    area: Area,
    config: &JobConfig,
    store: Arc<dyn FileStore>,
    services: &Services,
) -> Result<BatchResult> {
    if area == Area::Dlp {
        config.validate_dlp()?;
    }

    let pipeline = LandingPipeline::new(store, config.areas.paths(area));
    let operation = executor(area, config, services);

    info!("Processing {} landing area", area);
    pipeline.run(operation.as_ref()).await
}

/// Templates first so that tags in the same run can use them.
pub async fn run_all(
    config: &JobConfig,
    store: Arc<dyn FileStore>,
    services: &Services,
) -> Result<Vec<BatchResult>> {
    let mut results = Vec::new();
    for area in [Area::Templates, Area::Tags] {
        results.push(run_area(area, config, store.clone(), services).await?);
    }
    Ok(results)
}
