//! Minimal concrete implementations of the external collaborators named by
//! interface only in §1 (`ObjectStore`, `HeaderReencryptor`), so the worker
//! binaries in `apps/` are runnable without pulling in an S3 SDK or a real
//! Crypt4GH crate. Neither is meant to be production storage or
//! cryptography — see DESIGN.md.

use std::path::PathBuf;

use async_trait::async_trait;
use sda_core::{traits::{HeaderReencryptor, ObjectStore}, Error, Result};
use tokio::fs;

/// POSIX-filesystem [`ObjectStore`] rooted at a configured directory.
/// Inbox and archive paths are both just relative paths under this root.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(self.resolve(path))
            .await
            .map_err(|e| Error::Internal(format!("reading {path}: {e}")))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Internal(format!("creating {}: {e}", parent.display())))?;
        }
        fs::write(&full, data)
            .await
            .map_err(|e| Error::Internal(format!("writing {path}: {e}")))
    }

    async fn stat_size(&self, path: &str) -> Result<i64> {
        let meta = fs::metadata(self.resolve(path))
            .await
            .map_err(|e| Error::Internal(format!("stat {path}: {e}")))?;
        Ok(meta.len() as i64)
    }
}

/// Placeholder [`HeaderReencryptor`] that returns the header unchanged.
/// Stands in for the real Crypt4GH recipient-reencryption collaborator,
/// out of scope per §1; swapping it for a real implementation requires no
/// change to the worker handlers, only to how this type is constructed.
pub struct NoopReencryptor;

#[async_trait]
impl HeaderReencryptor for NoopReencryptor {
    async fn reencrypt_header(&self, header: &[u8]) -> Result<Vec<u8>> {
        Ok(header.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_then_reads_back_the_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.write("archive/a/b.c4gh", b"payload").await.unwrap();
        assert_eq!(store.read("archive/a/b.c4gh").await.unwrap(), b"payload");
        assert_eq!(store.stat_size("archive/a/b.c4gh").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn reading_a_missing_object_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(store.read("does/not/exist").await.is_err());
    }

    #[tokio::test]
    async fn noop_reencryptor_passes_the_header_through() {
        let header = b"some-header-bytes";
        assert_eq!(NoopReencryptor.reencrypt_header(header).await.unwrap(), header);
    }
}
