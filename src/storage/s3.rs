//! AWS S3 storage implementation.
//!
//! Keys are stored under an optional prefix inside one bucket. Folder
//! marker objects (keys ending in `/`) are ignored when listing.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use log::{debug, info};

use crate::error::{AppError, Result};
use crate::storage::{FileStore, join_key};

/// S3-based landing file storage.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Store {
    /// Create a new S3 store instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Create an S3 store using credentials from the environment.
    pub async fn from_env(bucket: &str, prefix: &str) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config), bucket, prefix)
    }

    /// Object key for a store key.
    fn object_key(&self, key: &str) -> String {
        join_key(&self.prefix, key.trim_start_matches('/'))
    }

    /// Store key for an object key.
    fn store_key(&self, object_key: &str) -> String {
        if self.prefix.is_empty() {
            return object_key.to_string();
        }
        object_key
            .strip_prefix(&format!("{}/", self.prefix))
            .unwrap_or(object_key)
            .to_string()
    }
}

#[async_trait]
impl FileStore for S3Store {
    async fn list(&self, folder: &str) -> Result<Vec<String>> {
        let list_prefix = format!("{}/", self.object_key(folder).trim_end_matches('/'));
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&list_prefix)
                .delimiter("/")
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| AppError::storage(e.into_service_error()))?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    if !key.ends_with('/') {
                        keys.push(self.store_key(key));
                    }
                }
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!("Listed {} objects under s3://{}/{}", keys.len(), self.bucket, list_prefix);
        Ok(keys)
    }

    async fn read_optional(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let object_key = self.object_key(key);
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output.body.collect().await.map_err(AppError::storage)?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                // Check if it's a "not found" error
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(AppError::storage(service_err))
                }
            }
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let object_key = self.object_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| AppError::storage(e.into_service_error()))?;

        info!("Wrote {} bytes to s3://{}/{}", bytes.len(), self.bucket, object_key);
        Ok(())
    }

    async fn move_to(&self, from: &str, to: &str) -> Result<()> {
        let source_key = self.object_key(from);
        let dest_key = self.object_key(to);
        let copy_source: String =
            url::form_urlencoded::byte_serialize(format!("{}/{}", self.bucket, source_key).as_bytes())
                .collect();

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(&dest_key)
            .copy_source(copy_source)
            .send()
            .await
            .map_err(|e| AppError::storage(e.into_service_error()))?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&source_key)
            .send()
            .await
            .map_err(|e| AppError::storage(e.into_service_error()))?;

        debug!("Moved s3://{0}/{1} -> s3://{0}/{2}", self.bucket, source_key, dest_key);
        Ok(())
    }

    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.object_key(key))
    }
}
