//! Block filesystem.
//!
//! Collections never touch `std::fs` directly; every read and write goes
//! through a [`BlockFs`]. [`LocalFs`] is the production implementation and
//! writes files atomically (temp file, fsync, rename) so a crash never
//! leaves a torn block or snapshot behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StoreError;

const TMP_SUFFIX: &str = "tmp";

/// Async file operations used by collections.
#[async_trait]
pub trait BlockFs: Send + Sync {
    /// File contents, or `None` if the file does not exist.
    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>, StoreError>;

    /// Atomically replace `path` with `bytes`, creating parent directories.
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError>;

    /// Delete `path`. A missing file is not an error.
    async fn delete_file(&self, path: &Path) -> Result<(), StoreError>;

    /// Names of the subdirectories of `path`. A missing directory is empty.
    async fn read_directory(&self, path: &Path) -> Result<Vec<String>, StoreError>;

    /// Remove everything inside `path`, keeping the directory itself.
    async fn clear_directory(&self, path: &Path) -> Result<(), StoreError>;

    /// Remove `path` recursively. A missing directory is not an error.
    async fn remove_directory(&self, path: &Path) -> Result<(), StoreError>;
}

/// [`BlockFs`] backed by the local filesystem through `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(TMP_SUFFIX);
    path.with_file_name(name)
}

#[async_trait]
impl BlockFs for LocalFs {
    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = tmp_path(path);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        debug!(path = ?path, bytes = bytes.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<(), StoreError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_directory(&self, path: &Path) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn clear_directory(&self, path: &Path) -> Result<(), StoreError> {
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(entry.path()).await?;
            } else {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        debug!(path = ?path, "Cleared directory");
        Ok(())
    }

    async fn remove_directory(&self, path: &Path) -> Result<(), StoreError> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                debug!(path = ?path, "Removed directory");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_delete() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new();
        let path = temp.path().join("nested/dir/3.block");

        assert_eq!(fs.read_file(&path).await.unwrap(), None);

        fs.write_file(&path, b"hello").await.unwrap();
        assert_eq!(fs.read_file(&path).await.unwrap(), Some(b"hello".to_vec()));
        assert!(!tmp_path(&path).exists());

        fs.write_file(&path, b"bye").await.unwrap();
        assert_eq!(fs.read_file(&path).await.unwrap(), Some(b"bye".to_vec()));

        fs.delete_file(&path).await.unwrap();
        assert_eq!(fs.read_file(&path).await.unwrap(), None);
        fs.delete_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_directory_lists_subdirectories() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new();

        fs.write_file(&temp.path().join("beta/index.bin"), b"x").await.unwrap();
        fs.write_file(&temp.path().join("alpha/index.bin"), b"x").await.unwrap();
        fs.write_file(&temp.path().join("stray.txt"), b"x").await.unwrap();

        let names = fs.read_directory(temp.path()).await.unwrap();
        assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);

        let missing = fs.read_directory(&temp.path().join("nope")).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_clear_and_remove_directory() {
        let temp = TempDir::new().unwrap();
        let fs = LocalFs::new();
        let dir = temp.path().join("coll");

        fs.write_file(&dir.join("0.block"), b"a").await.unwrap();
        fs.write_file(&dir.join("sub/1.block"), b"b").await.unwrap();

        fs.clear_directory(&dir).await.unwrap();
        assert!(dir.exists());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        fs.remove_directory(&dir).await.unwrap();
        assert!(!dir.exists());
        fs.remove_directory(&dir).await.unwrap();
    }

    #[test]
    fn test_tmp_path() {
        let path = Path::new("/data/notes/index.bin");
        assert_eq!(tmp_path(path), PathBuf::from("/data/notes/index.bin.tmp"));
    }
}
