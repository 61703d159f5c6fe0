use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Serialize;

use super::archive;
use super::client::{BucketStatus, ObjectStoreClient};
use crate::core::config::{StorageBackendKind, StorageConfig};
use crate::core::errors::RagError;

const ARCHIVE_SUFFIX: &str = ".tar.gz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed,
    NothingToBackUp,
    NothingToRestore,
}

impl SyncOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            SyncOutcome::Completed => "Storage sync completed",
            SyncOutcome::NothingToBackUp => "Nothing to back up: local index directory is empty",
            SyncOutcome::NothingToRestore => "Nothing to restore: no backup archive found",
        }
    }
}

/// Mirrors the local index directory to a single archive object.
///
/// The archive key is `<basename>.tar.gz`, fixed by the directory name.
pub struct StorageSyncManager {
    client: ObjectStoreClient,
    backend: StorageBackendKind,
    local_dir: PathBuf,
    root_name: String,
}

impl StorageSyncManager {
    pub fn new(client: ObjectStoreClient, backend: StorageBackendKind, local_dir: PathBuf) -> Result<Self, RagError> {
        let root_name = local_dir
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                RagError::StorageSync(format!(
                    "index directory {} has no usable name",
                    local_dir.display()
                ))
            })?;

        Ok(Self {
            client,
            backend,
            local_dir,
            root_name,
        })
    }

    /// Connects the configured backend; `Ok(None)` when sync is disabled.
    pub fn from_config(config: &StorageConfig, local_dir: PathBuf) -> Result<Option<Self>, RagError> {
        match ObjectStoreClient::connect(config)? {
            Some(client) => Ok(Some(Self::new(client, config.backend, local_dir)?)),
            None => Ok(None),
        }
    }

    pub fn archive_key(&self) -> String {
        format!("{}{}", self.root_name, ARCHIVE_SUFFIX)
    }

    /// Uses the bucket if it exists, otherwise creates it.
    ///
    /// Only `local` buckets can be created here; a missing `gcs` or `s3`
    /// bucket fails with a storage sync error naming the backend.
    pub async fn ensure_bucket(&self) -> Result<(), RagError> {
        match self.client.bucket_status().await? {
            BucketStatus::Available => {
                tracing::info!(backend = ?self.backend, "Using existing bucket");
            }
            BucketStatus::Missing => {
                if !self.client.create_bucket().await? {
                    return Err(RagError::StorageSync(format!(
                        "bucket does not exist and {:?} buckets must be created with the provider's tooling",
                        self.backend
                    )));
                }
                tracing::info!(backend = ?self.backend, "Created bucket");
            }
        }
        Ok(())
    }

    /// Uploads the whole local directory as one archive, replacing the
    /// previous one.
    pub async fn backup(&self) -> Result<SyncOutcome, RagError> {
        if !has_content(&self.local_dir).await {
            tracing::warn!(
                path = %self.local_dir.display(),
                "No data to upload: directory is empty or doesn't exist"
            );
            return Ok(SyncOutcome::NothingToBackUp);
        }

        let dir = self.local_dir.clone();
        let root_name = self.root_name.clone();
        let data = tokio::task::spawn_blocking(move || archive::pack_dir(&dir, &root_name))
            .await
            .map_err(RagError::storage_sync)??;

        let key = self.archive_key();
        let size = data.len();
        self.client.put(&key, Bytes::from(data)).await?;

        tracing::info!(key = %key, bytes = size, "Uploaded index backup");
        Ok(SyncOutcome::Completed)
    }

    /// Deletes the remote archive, so a cleared index is not restored on
    /// the next start.
    pub async fn discard_archive(&self) -> Result<(), RagError> {
        let key = self.archive_key();
        self.client.delete(&key).await?;
        tracing::info!(key = %key, "Deleted index backup");
        Ok(())
    }

    /// Replaces the local directory with the archived one.
    ///
    /// The archive is extracted next to the local directory first; the
    /// existing directory is only removed once extraction succeeded.
    pub async fn restore(&self) -> Result<SyncOutcome, RagError> {
        let key = self.archive_key();
        let Some(data) = self.client.get(&key).await? else {
            tracing::info!(key = %key, "No existing data found in object store");
            return Ok(SyncOutcome::NothingToRestore);
        };

        let staging = self.sibling_path("restore");
        let root_name = self.root_name.clone();
        let unpack_dir = staging.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            archive::unpack_into(&data, &root_name, &unpack_dir)
        })
        .await
        .map_err(RagError::storage_sync)?;

        let files = match extracted {
            Ok(files) => files,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(e);
            }
        };

        self.swap_in(&staging).await?;

        tracing::info!(key = %key, files, "Restored index from object store");
        Ok(SyncOutcome::Completed)
    }

    async fn swap_in(&self, staging: &Path) -> Result<(), RagError> {
        let retired = self.sibling_path("retired");
        let had_previous = tokio::fs::try_exists(&self.local_dir)
            .await
            .map_err(RagError::storage_sync)?;

        if had_previous {
            tokio::fs::rename(&self.local_dir, &retired)
                .await
                .map_err(RagError::storage_sync)?;
        }

        if let Err(e) = tokio::fs::rename(staging, &self.local_dir).await {
            if had_previous {
                let _ = tokio::fs::rename(&retired, &self.local_dir).await;
            }
            let _ = tokio::fs::remove_dir_all(staging).await;
            return Err(RagError::storage_sync(e));
        }

        if had_previous {
            if let Err(e) = tokio::fs::remove_dir_all(&retired).await {
                tracing::warn!(path = %retired.display(), "Failed to remove retired index directory: {}", e);
            }
        }
        Ok(())
    }

    fn sibling_path(&self, purpose: &str) -> PathBuf {
        let name = format!(".{}.{}-{}", self.root_name, purpose, uuid::Uuid::new_v4());
        match self.local_dir.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }
}

async fn has_content(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use object_store::memory::InMemory;

    use super::*;

    fn manager(client: &ObjectStoreClient, dir: PathBuf) -> StorageSyncManager {
        StorageSyncManager::new(client.clone(), StorageBackendKind::Memory, dir).unwrap()
    }

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let relative = path.strip_prefix(root).unwrap().to_path_buf();
                    files.insert(relative, fs::read(&path).unwrap());
                }
            }
        }
        files
    }

    #[test]
    fn archive_key_uses_directory_basename() {
        let client = ObjectStoreClient::new(InMemory::new());
        let sync = manager(&client, PathBuf::from("/var/lib/docqa/index_db"));
        assert_eq!(sync.archive_key(), "index_db.tar.gz");
    }

    #[tokio::test]
    async fn ensure_bucket_creates_missing_local_bucket() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackendKind::Local,
            bucket: "backups".to_string(),
            root: Some(tmp.path().join("buckets")),
            ..Default::default()
        };
        let sync = StorageSyncManager::from_config(&config, tmp.path().join("index_db"))
            .unwrap()
            .unwrap();
        fs::remove_dir_all(tmp.path().join("buckets")).unwrap();

        sync.ensure_bucket().await.unwrap();
        sync.ensure_bucket().await.unwrap();
        assert!(tmp.path().join("buckets").join("backups").is_dir());
    }

    #[tokio::test]
    async fn backup_of_missing_or_empty_dir_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let client = ObjectStoreClient::new(InMemory::new());

        let sync = manager(&client, tmp.path().join("index_db"));
        assert_eq!(sync.backup().await.unwrap(), SyncOutcome::NothingToBackUp);

        fs::create_dir_all(tmp.path().join("index_db")).unwrap();
        assert_eq!(sync.backup().await.unwrap(), SyncOutcome::NothingToBackUp);
        assert!(client.get("index_db.tar.gz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_without_archive_leaves_local_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index_db");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("keep.bin"), b"local").unwrap();

        let sync = manager(&ObjectStoreClient::new(InMemory::new()), dir.clone());
        assert_eq!(sync.restore().await.unwrap(), SyncOutcome::NothingToRestore);
        assert_eq!(fs::read(dir.join("keep.bin")).unwrap(), b"local");
    }

    #[tokio::test]
    async fn backup_then_restore_is_byte_identical() {
        let client = ObjectStoreClient::new(InMemory::new());

        let source = tempfile::tempdir().unwrap();
        let source_dir = source.path().join("index_db");
        fs::create_dir_all(source_dir.join("segments")).unwrap();
        fs::write(source_dir.join("index.sqlite3"), (0..=255u8).collect::<Vec<_>>()).unwrap();
        fs::write(source_dir.join("segments/0001.bin"), b"segment").unwrap();

        manager(&client, source_dir.clone()).ensure_bucket().await.unwrap();
        assert_eq!(
            manager(&client, source_dir.clone()).backup().await.unwrap(),
            SyncOutcome::Completed
        );

        let fresh = tempfile::tempdir().unwrap();
        let fresh_dir = fresh.path().join("index_db");
        fs::create_dir_all(&fresh_dir).unwrap();
        fs::write(fresh_dir.join("stale.bin"), b"stale").unwrap();

        assert_eq!(
            manager(&client, fresh_dir.clone()).restore().await.unwrap(),
            SyncOutcome::Completed
        );
        assert_eq!(snapshot(&fresh_dir), snapshot(&source_dir));

        let leftovers: Vec<_> = fs::read_dir(fresh.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "index_db")
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn discarded_archive_is_not_restored() {
        let client = ObjectStoreClient::new(InMemory::new());
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index_db");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.sqlite3"), b"corpus").unwrap();

        let sync = manager(&client, dir.clone());
        assert_eq!(sync.backup().await.unwrap(), SyncOutcome::Completed);
        sync.discard_archive().await.unwrap();
        sync.discard_archive().await.unwrap();

        fs::remove_file(dir.join("index.sqlite3")).unwrap();
        assert_eq!(sync.restore().await.unwrap(), SyncOutcome::NothingToRestore);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn corrupt_archive_keeps_local_state() {
        let client = ObjectStoreClient::new(InMemory::new());
        client
            .put("index_db.tar.gz", Bytes::from_static(b"not an archive"))
            .await
            .unwrap();

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index_db");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.sqlite3"), b"live").unwrap();

        let err = manager(&client, dir.clone()).restore().await.unwrap_err();
        assert_eq!(err.kind(), "storage_sync_error");
        assert_eq!(fs::read(dir.join("index.sqlite3")).unwrap(), b"live");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }
}
