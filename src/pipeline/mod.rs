//! Pipeline entry points.
//!
//! - `run_area`: Process one landing area (templates, tags, taxonomies, dlp)
//! - `run_all`: Templates, then tags
//! - `run_extract`: Export templates and tags to reporting tables

pub mod extract;
pub mod landing;
pub mod parse;
pub mod run;
pub mod sidecar;

pub use extract::{ExtractSummary, run_extract};
pub use landing::{DONE_SUFFIX, LandingPipeline, RecordOperation};
pub use parse::{ParsedFile, parse_file};
pub use run::{executor, run_all, run_area};
pub use sidecar::{ERROR_COLUMN, ErrorSidecar};
