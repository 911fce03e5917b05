use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::path::{Path, PathBuf};

use crate::types::{AppError, Result};

use super::{ObjectStream, RawStorage};

/// Filesystem-backed `RawStorage`, rooted at a configured directory.
/// Selected when `MINIO_ENDPOINT` is unset (spec.md §4.5).
pub struct LocalRawStorage {
    root: PathBuf,
}

impl LocalRawStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl RawStorage for LocalRawStorage {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let dest = self.resolve(path);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            return Err(AppError::Internal(format!(
                "raw storage path collision at {path}"
            )));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(format!("creating storage dir: {e}")))?;
        }
        // Write to a temp file in the same directory, then rename, so a
        // reader never observes a partially written object.
        let tmp = dest.with_extension("tmp-upload");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| AppError::Transient(format!("writing object: {e}")))?;
        tokio::fs::rename(&tmp, &dest)
            .await
            .map_err(|e| AppError::Transient(format!("finalizing object: {e}")))?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<ObjectStream> {
        let dest = self.resolve(path);
        let metadata = tokio::fs::metadata(&dest)
            .await
            .map_err(|_| AppError::NotFound(format!("no object at {path}")))?;
        let size = metadata.len();
        let bytes = tokio::fs::read(&dest)
            .await
            .map_err(|e| AppError::Transient(format!("reading object: {e}")))?;
        let stream = stream::once(async move { Ok(Bytes::from(bytes)) });
        Ok(ObjectStream {
            size,
            stream: Box::pin(stream),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let dest = self.resolve(path);
        match tokio::fs::remove_file(&dest).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Transient(format!("deleting object: {e}"))),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let dir = self.resolve(prefix);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Transient(format!("deleting prefix: {e}"))),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path))
            .await
            .unwrap_or(false))
    }
}

fn _assert_path_is_relative(p: &Path) {
    debug_assert!(!p.is_absolute());
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalRawStorage::new(dir.path());
        storage.put("ws1/doc1-a.pdf", b"hello".to_vec()).await.unwrap();

        let mut obj = storage.get("ws1/doc1-a.pdf").await.unwrap();
        assert_eq!(obj.size, 5);
        let mut collected = Vec::new();
        while let Some(chunk) = obj.stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"hello");
    }

    #[tokio::test]
    async fn put_rejects_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalRawStorage::new(dir.path());
        storage.put("ws1/doc1-a.pdf", b"hello".to_vec()).await.unwrap();
        let err = storage.put("ws1/doc1-a.pdf", b"world".to_vec()).await;
        assert!(matches!(err, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn delete_prefix_removes_all_under_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalRawStorage::new(dir.path());
        storage.put("ws1/doc1-a.pdf", b"a".to_vec()).await.unwrap();
        storage.put("ws1/doc2-b.pdf", b"b".to_vec()).await.unwrap();
        storage.delete_prefix("ws1").await.unwrap();
        assert!(!storage.exists("ws1/doc1-a.pdf").await.unwrap());
        assert!(!storage.exists("ws1/doc2-b.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalRawStorage::new(dir.path());
        let err = storage.get("nope").await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }
}
