//! Durable storage boundary
//!
//! The provider never touches the file system directly; it goes through a
//! [`StorageBackend`] whose paths are relative to the backend's root.

use crate::error::{Result, StoreError};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Suffix of in-flight writes; never decodes as a record name
const PARTIAL_SUFFIX: &str = ".partial";

/// Hierarchical folder/file storage used by the provider
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Names of the files directly inside `dir`
    async fn list_files(&self, dir: &Path) -> Result<Vec<String>>;

    /// Names of the folders directly inside `dir`
    async fn list_folders(&self, dir: &Path) -> Result<Vec<String>>;

    /// Create `dir` and any missing parents; existing folders are fine
    async fn create_folder_all(&self, dir: &Path) -> Result<()>;

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Replace the contents of `path` with `data`
    async fn write_file(&self, path: &Path, data: &[u8]) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;
}

/// [`StorageBackend`] over a local directory
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Ensure the root directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!(root = ?self.root, "Storage initialized");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a relative store path onto the root, refusing anything that
    /// could escape it.
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StoreError::InvalidPath(path.display().to_string()));
        }
        Ok(self.root.join(path))
    }

    async fn list_entries(&self, dir: &Path, want_dirs: bool) -> Result<Vec<String>> {
        let mut reader = fs::read_dir(self.resolve(dir)?).await?;
        let mut names = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            if entry.file_type().await?.is_dir() != want_dirs {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl StorageBackend for FsStorage {
    async fn list_files(&self, dir: &Path) -> Result<Vec<String>> {
        self.list_entries(dir, false).await
    }

    async fn list_folders(&self, dir: &Path) -> Result<Vec<String>> {
        self.list_entries(dir, true).await
    }

    async fn create_folder_all(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(self.resolve(dir)?).await?;
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(path)?).await?)
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        let mut partial = target.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        fs::write(&partial, data).await?;
        if let Err(e) = fs::rename(&partial, &target).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }
        debug!(path = ?target, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(self.resolve(path)?).await?;
        Ok(())
    }
}
