//! File storage for cached image bytes

use crate::error::{CacheError, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const CACHE_EXTENSION: &str = "cache";
const TEMP_EXTENSION: &str = "tmp";

/// One file per cache key under a single directory
#[derive(Debug, Clone)]
pub(crate) struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ensure the cache directory exists
    pub(crate) async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Stable, collision-free file name for a key
    pub(crate) fn path_for(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{}.{}", digest, CACHE_EXTENSION))
    }

    /// Write the bytes for `key`, replacing any previous content.
    ///
    /// Content goes to a temporary sibling first and is renamed into place,
    /// so a reader never observes a partially written file.
    pub(crate) async fn write(&self, key: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(key);
        let tmp = path.with_extension(TEMP_EXTENSION);

        if let Err(e) = fs::write(&tmp, data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        Ok(path)
    }

    pub(crate) async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CacheError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a file. A file that is already gone counts as removed.
    pub(crate) async fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete cache and temp files that no index entry owns.
    ///
    /// Files with other extensions are left alone. Returns the number removed.
    pub(crate) async fn purge_orphans(&self, owned: &HashSet<PathBuf>) -> Result<usize> {
        let mut removed = 0;
        let mut dir = fs::read_dir(&self.dir).await?;

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let ours = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == CACHE_EXTENSION || ext == TEMP_EXTENSION);
            if !ours || owned.contains(&path) {
                continue;
            }

            match self.delete(&path).await {
                Ok(()) => {
                    debug!(path = ?path, "Removed orphaned cache file");
                    removed += 1;
                }
                Err(e) => warn!(path = ?path, error = %e, "Failed to remove orphaned cache file"),
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_path_for_is_stable_and_distinct() {
        let disk = DiskStore::new(PathBuf::from("/cache"));
        let a1 = disk.path_for("42");
        let a2 = disk.path_for("42");
        let b = disk.path_for("43");

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(a1.parent(), Some(Path::new("/cache")));

        // 64 hex chars for SHA256 plus the extension
        let name = a1.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(".cache"));
        assert_eq!(name.len(), 64 + ".cache".len());
    }

    #[test]
    fn test_path_for_does_not_escape_directory() {
        let disk = DiskStore::new(PathBuf::from("/cache"));
        let path = disk.path_for("../../etc/passwd");
        assert_eq!(path.parent(), Some(Path::new("/cache")));
    }

    #[tokio::test]
    async fn test_init_creates_nested_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("ImageCache");
        let disk = DiskStore::new(nested.clone());

        disk.init().await.unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_write_read_and_overwrite() {
        let dir = tempdir().unwrap();
        let disk = DiskStore::new(dir.path().to_path_buf());
        disk.init().await.unwrap();

        let path = disk.write("42", b"first").await.unwrap();
        assert_eq!(disk.read(&path).await.unwrap(), b"first");

        let again = disk.write("42", b"second").await.unwrap();
        assert_eq!(path, again);
        assert_eq!(disk.read(&path).await.unwrap(), b"second");

        // No temp files left behind
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let disk = DiskStore::new(dir.path().join("never-created"));

        assert!(disk.write("42", b"data").await.is_err());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let disk = DiskStore::new(dir.path().to_path_buf());
        assert!(matches!(
            disk.read(&disk.path_for("nope")).await,
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let disk = DiskStore::new(dir.path().to_path_buf());
        let path = disk.write("42", b"data").await.unwrap();

        disk.delete(&path).await.unwrap();
        assert!(!path.exists());
        disk.delete(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_orphans_keeps_owned_and_foreign_files() {
        let dir = tempdir().unwrap();
        let disk = DiskStore::new(dir.path().to_path_buf());

        let owned_path = disk.write("owned", b"keep").await.unwrap();
        let orphan_path = disk.write("orphan", b"drop").await.unwrap();
        let stray_tmp = disk.path_for("crashed").with_extension("tmp");
        std::fs::write(&stray_tmp, b"partial").unwrap();
        let foreign = dir.path().join("README.txt");
        std::fs::write(&foreign, b"not ours").unwrap();

        let owned = HashSet::from([owned_path.clone()]);
        let removed = disk.purge_orphans(&owned).await.unwrap();

        assert_eq!(removed, 2);
        assert!(owned_path.exists());
        assert!(!orphan_path.exists());
        assert!(!stray_tmp.exists());
        assert!(foreign.exists());
    }
}
