use std::path::PathBuf;

use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use crate::config::S3Config;
use crate::error::StorageError;

/// Where uploaded meal photos live.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str)
        -> Result<(), StorageError>;
    /// Deleting a missing object succeeds.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
    /// Stable URL the analysis service can fetch the image from.
    fn object_url(&self, key: &str) -> String;
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Object key for a fresh upload.
pub fn new_object_key(content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    format!("{}.{}", uuid::Uuid::new_v4(), ext)
}

/// Images on local disk, served by the app under `/uploads`.
pub struct LocalImageStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalImageStore {
    pub async fn new(root: PathBuf, public_base_url: &str) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(StorageError::Object(format!("invalid object key {key:?}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        fs::write(&path, &body).await?;
        debug!(key, bytes = body.len(), "image stored");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "image already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/uploads/{}", self.public_base_url, key)
    }
}

/// Images in an S3-compatible bucket (MinIO in development).
#[derive(Clone)]
pub struct S3ImageStore {
    client: Client,
    bucket: String,
    endpoint: String,
}

impl S3ImageStore {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Object(format!("s3 put_object {key}: {e}")))?;
        Ok(())
    }

    // S3 reports success for keys that do not exist.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Object(format!("s3 delete_object {key}: {e}")))?;
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

/// In-memory image store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryImageStore {
    objects: std::sync::Mutex<std::collections::HashMap<String, Bytes>>,
}

#[cfg(test)]
impl MemoryImageStore {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

#[cfg(test)]
#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn put_object(&self, key: &str, body: Bytes, _ct: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("https://fake.local/uploads/{}", key)
    }
}
