//! Filesystem-backed store: objects live under `root/<bucket>/<key>`.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::info;
use tvid_models::AssetRef;

use crate::error::{StorageError, StorageResult};
use crate::fs_utils::{copy_file, move_file, remove_file};
use crate::store::{download_path, ArtifactStore};

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of an object; keys may not escape the root.
    pub fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(bucket).join(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(StorageError::Unsupported(format!(
                "object path escapes store root: {bucket}/{key}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn fetch(&self, source: &AssetRef, dest_dir: &Path) -> StorageResult<PathBuf> {
        match source {
            AssetRef::Local(path) => {
                if path.exists() {
                    Ok(path.clone())
                } else {
                    Err(StorageError::not_found(path.display().to_string()))
                }
            }
            AssetRef::Object { bucket, key, .. } => {
                let stored = self.object_path(bucket, key)?;
                if !stored.exists() {
                    return Err(StorageError::not_found(source.to_string()));
                }
                let dest = download_path(dest_dir, key);
                copy_file(&stored, &dest).await?;
                Ok(dest)
            }
        }
    }

    async fn put(
        &self,
        local: &Path,
        target: &AssetRef,
        _content_type: &str,
    ) -> StorageResult<AssetRef> {
        let dest = match target {
            AssetRef::Local(path) => path.clone(),
            AssetRef::Object { bucket, key, .. } => self.object_path(bucket, key)?,
        };
        move_file(local, &dest).await?;
        info!(target = %target, path = %dest.display(), "Stored artifact");
        Ok(target.clone())
    }

    async fn delete(&self, target: &AssetRef) -> StorageResult<()> {
        let path = match target {
            AssetRef::Local(path) => path.clone(),
            AssetRef::Object { bucket, key, .. } => self.object_path(bucket, key)?,
        };
        remove_file(&path).await?;
        info!(target = %target, "Deleted artifact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_then_fetch_object() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());

        let artifact = work.path().join("render.mp4");
        tokio::fs::write(&artifact, b"video").await.unwrap();
        let target = AssetRef::object("media", "videos/job.mp4");

        tokio_test::assert_ok!(store.put(&artifact, &target, "video/mp4").await);
        assert!(root.path().join("media/videos/job.mp4").exists());
        assert!(!artifact.exists());

        let fetched = store.fetch(&target, work.path()).await.unwrap();
        assert_eq!(fetched, work.path().join("job.mp4"));
        assert_eq!(tokio::fs::read(&fetched).await.unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_delete_object() {
        let root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());

        let artifact = work.path().join("captions.srt");
        tokio::fs::write(&artifact, b"1").await.unwrap();
        let target = AssetRef::object("media", "videos/job.srt");
        store.put(&artifact, &target, "application/x-subrip").await.unwrap();

        tokio_test::assert_ok!(store.delete(&target).await);
        assert!(!root.path().join("media/videos/job.srt").exists());
        tokio_test::assert_ok!(store.delete(&target).await);
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let root = TempDir::new().unwrap();
        let store = LocalStore::new(root.path());

        let missing = AssetRef::object("media", "nope.wav");
        assert!(matches!(
            store.fetch(&missing, root.path()).await,
            Err(StorageError::NotFound(_))
        ));
        let missing = AssetRef::local(root.path().join("nope.wav"));
        assert!(matches!(
            store.fetch(&missing, root.path()).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_keys_cannot_escape_root() {
        let store = LocalStore::new("/srv/store");
        assert!(store.object_path("media", "../../etc/passwd").is_err());
        assert_eq!(
            store.object_path("media", "a/b.mp4").unwrap(),
            PathBuf::from("/srv/store/media/a/b.mp4")
        );
    }
}
