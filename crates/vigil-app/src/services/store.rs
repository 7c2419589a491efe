//! Content bucket abstraction and its filesystem implementation.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Errors emitted by artifact storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },

    #[error("invalid object key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("storage io error: {0}")]
    Io(String),
}

impl StoreError {
    fn io(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Bucketed object storage as the moderation pipeline sees it. Keys are flat
/// strings; any hierarchy lives inside the key itself.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError>;

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), StoreError>;

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<(), StoreError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// True when at least one object in `bucket` starts with `prefix`.
    async fn exists_prefix(&self, bucket: &str, prefix: &str) -> Result<bool, StoreError>;

    /// Shareable link to an object, when the backend can mint one. Only the
    /// notification path consumes this.
    fn object_url(&self, _bucket: &str, _key: &str) -> Option<String> {
        None
    }
}

/// Filesystem-backed store: each bucket is a directory under `root`, each key
/// a relative path inside it.
///
/// Writes go through a temp file in the bucket root and are moved into place
/// afterwards, so readers never observe a partial object.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        validate_bucket(bucket)?;
        Ok(self.root.join(bucket).join(key))
    }
}

fn validate_bucket(bucket: &str) -> Result<(), StoreError> {
    if bucket.is_empty() || bucket.contains('/') {
        return Err(StoreError::InvalidKey {
            key: bucket.to_owned(),
            reason: "bucket name must be a single non-empty segment",
        });
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey {
            key: key.to_owned(),
            reason: "key must not be empty",
        });
    }
    let path = Path::new(key);
    let escapes_root = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes_root {
        return Err(StoreError::InvalidKey {
            key: key.to_owned(),
            reason: "key must stay inside its bucket",
        });
    }
    Ok(())
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            }),
            Err(e) => Err(StoreError::io(e)),
        }
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        let bucket_dir = self.root.join(bucket);
        fs::create_dir_all(path.parent().unwrap_or(&bucket_dir))
            .await
            .map_err(StoreError::io)?;

        let temp = tempfile::NamedTempFile::new_in(&bucket_dir)
            .map_err(|e| StoreError::Io(format!("create temp file: {e}")))?;
        let mut file = fs::File::from_std(
            temp.reopen()
                .map_err(|e| StoreError::Io(format!("reopen temp file: {e}")))?,
        );
        file.write_all(&body).await.map_err(StoreError::io)?;
        file.flush().await.map_err(StoreError::io)?;
        drop(file);

        temp.persist(&path)
            .map_err(|e| StoreError::Io(format!("finalize object: {e}")))?;
        Ok(())
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<(), StoreError> {
        let body = self.get(src_bucket, src_key).await?;
        self.put(dst_bucket, dst_key, body).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Deleting an absent object is not an error; duplicate deliveries
            // hit this branch.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(e)),
        }
    }

    async fn exists_prefix(&self, bucket: &str, prefix: &str) -> Result<bool, StoreError> {
        let exact = self.object_path(bucket, prefix)?;
        match fs::metadata(&exact).await {
            Ok(meta) if meta.is_file() => return Ok(true),
            Ok(_) | Err(_) => {}
        }

        // Walk the deepest existing ancestor and compare relative paths.
        let bucket_dir = self.root.join(bucket);
        if fs::metadata(&bucket_dir).await.is_err() {
            return Ok(false);
        }
        let mut pending = vec![bucket_dir.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await.map_err(StoreError::io)? {
                let path = entry.path();
                let rel = match path.strip_prefix(&bucket_dir) {
                    Ok(rel) => rel.to_string_lossy().into_owned(),
                    Err(_) => continue,
                };
                let file_type = entry.file_type().await.map_err(StoreError::io)?;
                if file_type.is_dir() {
                    // Descend only where the prefix can still match.
                    let dir_rel = format!("{rel}/");
                    if prefix.starts_with(&dir_rel) || dir_rel.starts_with(prefix) {
                        pending.push(path);
                    }
                } else if rel.starts_with(prefix) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn object_url(&self, bucket: &str, key: &str) -> Option<String> {
        let path = self.root.join(bucket).join(key);
        Some(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsArtifactStore) {
        let temp = TempDir::new().expect("temp dir");
        let store = FsArtifactStore::new(temp.path());
        (temp, store)
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let (_guard, store) = store();
        store
            .put("library", "reports/q1.pdf", Bytes::from_static(b"pdf-bytes"))
            .await
            .expect("put");
        let body = store.get("library", "reports/q1.pdf").await.expect("get");
        assert_eq!(&body[..], b"pdf-bytes");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_guard, store) = store();
        let err = store.get("library", "nope.txt").await.expect_err("missing");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn copy_then_delete_moves_object() {
        let (_guard, store) = store();
        store
            .put("library", "a.txt", Bytes::from_static(b"x"))
            .await
            .expect("put");
        store
            .copy("library", "a.txt", "quarantine", "a.txt")
            .await
            .expect("copy");
        store.delete("library", "a.txt").await.expect("delete");

        assert!(store.get("library", "a.txt").await.is_err());
        assert_eq!(
            &store.get("quarantine", "a.txt").await.expect("copied")[..],
            b"x"
        );
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_guard, store) = store();
        store.delete("library", "ghost.txt").await.expect("first");
        store.delete("library", "ghost.txt").await.expect("second");
    }

    #[tokio::test]
    async fn exists_prefix_matches_exact_and_partial() {
        let (_guard, store) = store();
        store
            .put("library", "reports/q1.pptx", Bytes::from_static(b"d"))
            .await
            .expect("put");

        assert!(store.exists_prefix("library", "reports/q1.pptx").await.unwrap());
        assert!(store.exists_prefix("library", "reports/q1").await.unwrap());
        assert!(store.exists_prefix("library", "reports/").await.unwrap());
        assert!(!store.exists_prefix("library", "reports/q2").await.unwrap());
        assert!(!store.exists_prefix("archive", "reports/").await.unwrap());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (_guard, store) = store();
        let err = store
            .put("library", "../outside.txt", Bytes::from_static(b"x"))
            .await
            .expect_err("traversal");
        assert!(matches!(err, StoreError::InvalidKey { .. }));
    }
}
