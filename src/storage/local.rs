//! Local filesystem storage implementation.
//!
//! Keys map to paths under a root directory. Used for development, tests
//! and single-host deployments; production buckets use `S3Store`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{FileStore, join_key};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root_dir: PathBuf,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key.trim_start_matches('/'))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for LocalStore {
    async fn list(&self, folder: &str) -> Result<Vec<String>> {
        let dir = self.path(folder);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(join_key(folder, name));
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn read_optional(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn move_to(&self, from: &str, to: &str) -> Result<()> {
        let src = self.path(from);
        let dst = self.path(to);
        self.ensure_dir(&dst).await?;

        if tokio::fs::rename(&src, &dst).await.is_err() {
            // Cross-device moves cannot rename.
            tokio::fs::copy(&src, &dst).await?;
            tokio::fs::remove_file(&src).await?;
        }
        log::debug!("Moved {} -> {}", src.display(), dst.display());
        Ok(())
    }

    fn uri(&self, key: &str) -> String {
        self.path(key).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());

        store.write("a/test.txt", b"hello").await.unwrap();
        let data = store.read_optional("a/test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());

        assert!(store.read_optional("nope.txt").await.unwrap().is_none());
        assert!(store.read("nope.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_skips_directories_and_missing_folders() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());

        store.write("tags/landing/b.csv", b"x").await.unwrap();
        store.write("tags/landing/a.csv", b"x").await.unwrap();
        store.write("tags/landing/nested/c.csv", b"x").await.unwrap();

        let keys = store.list("tags/landing").await.unwrap();
        assert_eq!(keys, vec!["tags/landing/a.csv", "tags/landing/b.csv"]);
        assert!(store.list("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_removes_source() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());

        store.write("tags/landing/a.csv", b"data").await.unwrap();
        store
            .move_to("tags/landing/a.csv", "tags/processed/a.csv.done")
            .await
            .unwrap();

        assert!(store.read_optional("tags/landing/a.csv").await.unwrap().is_none());
        assert_eq!(
            store.read("tags/processed/a.csv.done").await.unwrap(),
            b"data".to_vec()
        );
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());

        store.write("x/report.csv", b"a,b").await.unwrap();
        let keys = store.list("x").await.unwrap();
        assert_eq!(keys, vec!["x/report.csv"]);
    }
}
