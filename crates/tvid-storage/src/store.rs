//! The storage seam used by the pipeline.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tvid_models::AssetRef;

use crate::error::StorageResult;

/// Fetches job inputs and stores finished artifacts.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Make `source` available locally. Local assets are returned as-is;
    /// remote ones are downloaded into `dest_dir`.
    async fn fetch(&self, source: &AssetRef, dest_dir: &Path) -> StorageResult<PathBuf>;

    /// Store the file at `local` under `target`, consuming the file.
    /// Returns where the artifact now lives.
    async fn put(&self, local: &Path, target: &AssetRef, content_type: &str)
        -> StorageResult<AssetRef>;

    /// Remove a stored artifact. Removing one that is already gone succeeds.
    async fn delete(&self, target: &AssetRef) -> StorageResult<()>;
}

/// Download destination for a remote asset inside `dest_dir`.
pub(crate) fn download_path(dest_dir: &Path, key: &str) -> PathBuf {
    let name = key
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("object");
    dest_dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_path_uses_last_key_segment() {
        let dir = Path::new("/work");
        assert_eq!(download_path(dir, "jobs/1/voice.wav"), PathBuf::from("/work/voice.wav"));
        assert_eq!(download_path(dir, "trailing/"), PathBuf::from("/work/trailing"));
    }

    #[tokio::test]
    async fn test_mock_store() {
        let mut store = MockArtifactStore::new();
        store
            .expect_put()
            .returning(|_, target, _| Ok(target.clone()));

        let target = AssetRef::object("bucket", "videos/a.mp4");
        let stored = store
            .put(Path::new("/tmp/a.mp4"), &target, "video/mp4")
            .await
            .unwrap();
        assert_eq!(stored, target);
    }
}
