// src/lib.rs

//! Catalog Steward Library
//!
//! Applies tag templates, tags, policy-tag taxonomies and sensitive-data
//! scans dropped into landing folders, and exports the catalog's
//! template and tag metadata back into the warehouse.

pub mod config;
pub mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
