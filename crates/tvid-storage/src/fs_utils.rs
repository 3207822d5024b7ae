//! Moving artifacts into place on local filesystems.

use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::StorageResult;

/// EXDEV on Linux and macOS.
const CROSS_DEVICE: i32 = 18;

async fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Move `src` to `dst`, overwriting it. Falls back to copy and delete
/// across filesystems; the copy lands under a temporary name first so
/// `dst` never holds a partial file.
pub async fn move_file(src: &Path, dst: &Path) -> StorageResult<()> {
    ensure_parent(dst).await?;

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE) => {
            debug!(src = %src.display(), dst = %dst.display(), "Cross-device move, copying");
            copy_file(src, dst).await?;
            if let Err(e) = fs::remove_file(src).await {
                warn!(src = %src.display(), "Failed to remove source after copy: {}", e);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Copy `src` to `dst` through a temporary sibling file.
pub async fn copy_file(src: &Path, dst: &Path) -> StorageResult<()> {
    ensure_parent(dst).await?;

    let partial = dst.with_extension("partial");
    if let Err(e) = fs::copy(src, &partial).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&partial, dst).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }
    Ok(())
}

/// Remove `path`; a file that is already gone is not an error.
pub async fn remove_file(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_into_new_directory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("render.mp4");
        let dst = dir.path().join("videos").join("job.mp4");
        fs::write(&src, b"frames").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"frames");
    }

    #[tokio::test]
    async fn test_move_overwrites() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("new.mp4");
        let dst = dir.path().join("old.mp4");
        fs::write(&src, b"new").await.unwrap();
        fs::write(&dst, b"old").await.unwrap();

        move_file(&src, &dst).await.unwrap();
        assert_eq!(fs::read(&dst).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_copy_keeps_source_and_leaves_no_partial() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.wav");
        let dst = dir.path().join("b.wav");
        fs::write(&src, b"pcm").await.unwrap();

        copy_file(&src, &dst).await.unwrap();

        assert!(src.exists());
        assert!(dst.exists());
        assert!(!dir.path().join("b.partial").exists());
    }

    #[tokio::test]
    async fn test_remove_missing_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.srt");
        fs::write(&path, b"1").await.unwrap();

        remove_file(&path).await.unwrap();
        assert!(!path.exists());
        remove_file(&path).await.unwrap();
    }
}
