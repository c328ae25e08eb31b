//! Storage abstractions for landing areas.
//!
//! Both backends mirror the same key layout, where a key is a
//! `/`-separated path relative to the store root (local) or bucket prefix
//! (object storage):
//!
//! ```text
//! {root}/
//! ├── tags/
//! │   ├── landing/       # producers drop files here
//! │   ├── processed/     # <name>.done after a pass
//! │   └── error/         # error_<name> sidecars
//! ├── templates/...
//! ├── taxonomies/...
//! ├── dlp/...
//! └── catalog_extract/   # export reports
//! ```

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{StorageBackend, StorageConfig};

// Re-export for convenience
pub use local::LocalStore;
#[cfg(feature = "s3")]
pub use s3::S3Store;

/// Trait for landing file storage backends.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// List file keys directly under a folder. A missing folder is empty.
    async fn list(&self, folder: &str) -> Result<Vec<String>>;

    /// Read a file, returning None if it doesn't exist.
    async fn read_optional(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a file, replacing any previous content.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Move a file: copy to the destination, then delete the source.
    async fn move_to(&self, from: &str, to: &str) -> Result<()>;

    /// Externally addressable location of a key, e.g. `s3://bucket/key`.
    fn uri(&self, key: &str) -> String;

    /// Read a file that must exist.
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.read_optional(key)
            .await?
            .ok_or_else(|| AppError::not_found(format!("file {key}")))
    }
}

/// Join a folder and a file name into a key.
pub fn join_key(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

/// Build the configured storage backend.
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn FileStore>> {
    match config.backend {
        StorageBackend::Local => Ok(Arc::new(LocalStore::new(&config.root))),
        #[cfg(feature = "s3")]
        StorageBackend::S3 => Ok(Arc::new(
            S3Store::from_env(&config.bucket, &config.prefix).await,
        )),
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => Err(AppError::config(
            "storage.backend = \"s3\" requires the `s3` feature",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("tags/landing", "a.csv"), "tags/landing/a.csv");
        assert_eq!(join_key("tags/landing/", "a.csv"), "tags/landing/a.csv");
        assert_eq!(join_key("", "a.csv"), "a.csv");
    }
}
