//! `RawStorage` — the blob-store adapter contract (spec.md §4.1).
//!
//! Paths are opaque strings of the form
//! `{workspace_id}/{document_id}-{sanitized_name}`. Objects are read-only
//! after `put`: a writer that encounters an existing path treats the
//! collision as an internal invariant violation rather than overwriting it.

mod local;
mod s3;

pub use local::LocalRawStorage;
pub use s3::S3RawStorage;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::types::Result;

/// A lazily-read byte stream plus its declared size, returned by `get`.
pub struct ObjectStream {
    pub size: u64,
    pub stream: BoxStream<'static, std::io::Result<Bytes>>,
}

#[async_trait]
pub trait RawStorage: Send + Sync {
    /// Writes `bytes` to `path`. Atomic from the reader's perspective: no
    /// partial object is ever visible at `path`. A pre-existing object at
    /// `path` is an internal invariant violation (paths are content-addressed
    /// by caller convention), not a silent overwrite.
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()>;

    /// Opens `path` as a lazy byte stream plus its size. `NotFound` if the
    /// path does not exist.
    async fn get(&self, path: &str) -> Result<ObjectStream>;

    /// Removes `path`. A no-op (not an error) if `path` does not exist.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Removes every object whose path starts with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    /// Whether `path` currently exists.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Sanitizes a user-supplied filename for inclusion in a storage path:
/// strips path separators and any leading dots so the result cannot escape
/// its workspace/document prefix.
pub fn sanitize_filename(name: &str) -> String {
    let stripped: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let trimmed = stripped.trim_start_matches('.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Builds the canonical raw-storage path for a document.
pub fn object_path(workspace_id: uuid::Uuid, document_id: uuid::Uuid, name: &str) -> String {
    format!("{}/{}-{}", workspace_id, document_id, sanitize_filename(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename(""), "unnamed");
    }
}
