//! Thin, cloneable handle over any [`object_store::ObjectStore`] backend.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::prefix::PrefixStore;
use object_store::{ObjectStore, PutPayload};

use crate::core::config::{StorageBackendKind, StorageConfig};
use crate::core::errors::RagError;

const DEFAULT_S3_REGION: &str = "us-east-1";
const MISSING_BUCKET_MARKERS: [&str; 3] = ["NoSuchBucket", "bucket does not exist", "Bucket not found"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    Available,
    Missing,
}

#[derive(Clone, Debug)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    /// Backing directory of a `local` bucket; `None` for every other backend.
    bucket_dir: Option<PathBuf>,
}

impl ObjectStoreClient {
    pub fn new(store: impl ObjectStore) -> Self {
        Self {
            store: Arc::new(store),
            bucket_dir: None,
        }
    }

    /// Builds a client for the configured backend, scoped to the bucket.
    ///
    /// Returns `Ok(None)` when storage sync is disabled.
    pub fn connect(config: &StorageConfig) -> Result<Option<Self>, RagError> {
        let client = match config.backend {
            StorageBackendKind::Disabled => return Ok(None),
            StorageBackendKind::Memory => {
                Self::new(PrefixStore::new(InMemory::new(), config.bucket.as_str()))
            }
            StorageBackendKind::Local => {
                let root = config.root.as_ref().ok_or_else(|| {
                    RagError::StorageSync("storage.root is required for the local backend".to_string())
                })?;
                let bucket_dir = root.join(&config.bucket);
                std::fs::create_dir_all(&bucket_dir).map_err(RagError::storage_sync)?;
                let store = LocalFileSystem::new_with_prefix(&bucket_dir).map_err(RagError::storage_sync)?;
                Self {
                    store: Arc::new(store),
                    bucket_dir: Some(bucket_dir),
                }
            }
            StorageBackendKind::Gcs => {
                let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(&config.bucket);
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_url(endpoint);
                }
                Self::new(builder.build().map_err(RagError::storage_sync)?)
            }
            StorageBackendKind::S3 => {
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(&config.bucket)
                    .with_region(config.region.as_deref().unwrap_or(DEFAULT_S3_REGION));
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                    if endpoint.starts_with("http://") {
                        builder = builder.with_allow_http(true);
                    }
                }
                Self::new(builder.build().map_err(RagError::storage_sync)?)
            }
        };

        tracing::info!(backend = ?config.backend, bucket = %config.bucket, "Object store configured");
        Ok(Some(client))
    }

    /// Lists the bucket root. A HEAD cannot tell a missing object from a
    /// missing bucket, a listing can.
    pub async fn bucket_status(&self) -> Result<BucketStatus, RagError> {
        if let Some(dir) = &self.bucket_dir {
            return Ok(if dir.is_dir() {
                BucketStatus::Available
            } else {
                BucketStatus::Missing
            });
        }

        match self.store.list_with_delimiter(None).await {
            Ok(_) => Ok(BucketStatus::Available),
            Err(e) if is_missing_bucket(&e) => Ok(BucketStatus::Missing),
            Err(e) => Err(RagError::storage_sync(e)),
        }
    }

    /// Creates the bucket where this process can. Returns `false` for cloud
    /// buckets, which have to be provisioned with the provider's tooling.
    pub async fn create_bucket(&self) -> Result<bool, RagError> {
        match &self.bucket_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(RagError::storage_sync)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fetches the object at `key`, `None` if absent.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, RagError> {
        let result = match self.store.get(&Path::from(key)).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(RagError::storage_sync(e)),
        };
        let data = result.bytes().await.map_err(RagError::storage_sync)?;
        Ok(Some(data))
    }

    /// Writes `data` to `key`, replacing any previous object.
    pub async fn put(&self, key: &str, data: Bytes) -> Result<(), RagError> {
        self.store
            .put(&Path::from(key), PutPayload::from(data))
            .await
            .map_err(RagError::storage_sync)?;
        Ok(())
    }

    /// Deletes `key`; deleting an absent object succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), RagError> {
        match self.store.delete(&Path::from(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(RagError::storage_sync(e)),
        }
    }
}

/// Object stores report a missing bucket either as not-found on the bucket
/// root or as a provider error naming it.
fn is_missing_bucket(err: &object_store::Error) -> bool {
    if matches!(err, object_store::Error::NotFound { .. }) {
        return true;
    }

    let mut source: Option<&dyn std::error::Error> = Some(err);
    while let Some(current) = source {
        let text = current.to_string();
        if MISSING_BUCKET_MARKERS.iter().any(|marker| text.contains(marker)) {
            return true;
        }
        source = current.source();
    }
    false
}
