//! Catalog Steward CLI
//!
//! Local execution entry point. For AWS Lambda, use `catalog-steward-lambda`.

use std::path::PathBuf;
use std::sync::Arc;

use catalog_steward::{
    config,
    error::Result,
    models::{Area, BatchResult, JobConfig},
    pipeline::{self, LandingPipeline},
    services::rest,
    storage::{self, FileStore},
};
use clap::{Parser, Subcommand};

/// Catalog Steward - landing-folder driven catalog governance
#[derive(Parser, Debug)]
#[command(
    name = "catalog-steward",
    version,
    about = "Apply catalog templates, tags, taxonomies and DLP scans from landing folders"
)]
struct Cli {
    /// Path to the job configuration (JSON, or TOML by extension)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// List what would be processed without calling any service
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or replace tag templates
    Templates,

    /// Attach tags to datasets, tables and columns
    Tags,

    /// Create policy-tag taxonomies
    Taxonomies,

    /// Run sensitive-data scans and classify columns
    Dlp,

    /// Run templates, then tags
    All,

    /// Export templates and tags to the warehouse
    Extract,

    /// Validate the configuration file
    Validate,
}

impl Command {
    fn areas(&self) -> &'static [Area] {
        match self {
            Command::Templates => &[Area::Templates],
            Command::Tags => &[Area::Tags],
            Command::Taxonomies => &[Area::Taxonomies],
            Command::Dlp => &[Area::Dlp],
            Command::All => &[Area::Templates, Area::Tags],
            Command::Extract | Command::Validate => &[],
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, config_level: Option<&str>) {
    let level = if verbose {
        "debug"
    } else {
        config_level.unwrap_or("info")
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn report(result: &BatchResult) {
    log::info!(
        "{}: {} files processed, {} skipped, {} records ({} failed), {} error files",
        result.area,
        result.files_processed,
        result.files_skipped,
        result.records_processed,
        result.records_failed,
        result.sidecars_written
    );
}

async fn dry_run(config: &JobConfig, store: Arc<dyn FileStore>, areas: &[Area]) -> Result<()> {
    for &area in areas {
        let pipeline = LandingPipeline::new(store.clone(), config.areas.paths(area));
        let files = pipeline.discover().await?;
        log::info!("{}: {} landing files", area, files.len());
        for file in files {
            log::info!("  {}", store.uri(&file.key));
        }
    }
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match config::load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging(cli.verbose, None);
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
    };
    init_logging(cli.verbose, Some(config.logging.level.as_str()));
    log::info!("Loaded configuration from {}", cli.config.display());

    if let Command::Validate = cli.command {
        if let Err(e) = config.validate_extract() {
            log::warn!("extract is not configured: {}", e);
        }
        if let Err(e) = config.validate_dlp() {
            log::warn!("dlp is not configured: {}", e);
        }
        log::info!("Config OK");
        return Ok(());
    }

    let store = storage::from_config(&config.storage).await?;

    if cli.dry_run {
        return dry_run(&config, store, cli.command.areas()).await;
    }

    let services = rest::services(&config)?;

    match cli.command {
        Command::Extract => {
            let summary = pipeline::run_extract(&config, store.as_ref(), &services).await?;
            log::info!(
                "Extract {}: {} template rows ({} loaded), {} tag rows ({} loaded)",
                summary.run_id,
                summary.template_rows,
                summary.template_rows_loaded,
                summary.tag_rows,
                summary.tag_rows_loaded
            );
        }
        Command::All => {
            for result in pipeline::run_all(&config, store, &services).await? {
                report(&result);
            }
        }
        command => {
            for &area in command.areas() {
                let result = pipeline::run_area(area, &config, store.clone(), &services).await?;
                report(&result);
            }
        }
    }

    log::info!("Done!");
    Ok(())
}
