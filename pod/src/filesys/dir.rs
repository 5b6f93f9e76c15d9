//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::PodError;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), PodError> {
        fs::create_dir_all(&self.path)
            .await
            .map_err(PodError::fs("create directory", &self.path))
    }

    /// Delete the directory and all contents, missing directories are fine
    pub async fn delete(&self) -> Result<(), PodError> {
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PodError::fs("remove", &self.path)(e)),
        }
    }

    /// List entry names (files and directories). A missing directory is empty.
    pub async fn list_names(&self) -> Result<Vec<String>, PodError> {
        let mut entries = match fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PodError::fs("list", &self.path)(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(PodError::fs("list", &self.path))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Remove a single entry of this directory, whatever its type
    pub async fn remove_entry(&self, name: &str) -> Result<(), PodError> {
        let path = self.path.join(name);
        let meta = match fs::symlink_metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(PodError::fs("inspect", &path)(e)),
        };
        if meta.is_dir() {
            Dir::new(path).delete().await
        } else {
            crate::filesys::file::File::new(path).delete().await
        }
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> crate::filesys::file::File {
        crate::filesys::file::File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}
