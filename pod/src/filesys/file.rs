//! File operations

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::PodError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, PodError> {
        fs::read_to_string(&self.path)
            .await
            .map_err(PodError::fs("read", &self.path))
    }

    /// Read file as JSON value (no schema applied)
    pub async fn read_json_value(&self) -> Result<serde_json::Value, PodError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Write JSON to file atomically
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), PodError> {
        self.write_atomic(&json_contents(value)?, None).await
    }

    /// Write JSON atomically, readable and writable by the owner only (0o600 on Unix)
    pub async fn write_private_json<T: Serialize>(&self, value: &T) -> Result<(), PodError> {
        self.write_atomic(&json_contents(value)?, Some(0o600)).await
    }

    /// Write an executable script (mode 0o755 on Unix)
    pub async fn write_executable(&self, contents: &str) -> Result<(), PodError> {
        self.write_with_mode(contents, 0o755).await
    }

    /// Write a file readable and executable by the owner only
    pub async fn write_private_executable(&self, contents: &str) -> Result<(), PodError> {
        self.write_with_mode(contents, 0o700).await
    }

    async fn write_with_mode(&self, contents: &str, mode: u32) -> Result<(), PodError> {
        self.ensure_parent().await?;
        fs::write(&self.path, contents)
            .await
            .map_err(PodError::fs("write", &self.path))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(PodError::fs("chmod", &self.path))?;
        }
        #[cfg(not(unix))]
        let _ = mode;
        Ok(())
    }

    /// Delete the file, missing files are fine
    pub async fn delete(&self) -> Result<(), PodError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PodError::fs("remove", &self.path)(e)),
        }
    }

    /// Atomic write using a temporary file in the same directory. The mode,
    /// when given, is applied before any content is written.
    pub async fn write_atomic(&self, contents: &[u8], mode: Option<u32>) -> Result<(), PodError> {
        self.ensure_parent().await?;
        let temp_path = self.temp_path();

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(PodError::fs("create", &temp_path))?;
        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(mode))
                .await
                .map_err(PodError::fs("chmod", &temp_path))?;
        }
        #[cfg(not(unix))]
        let _ = mode;
        file.write_all(contents)
            .await
            .map_err(PodError::fs("write", &temp_path))?;
        file.sync_all()
            .await
            .map_err(PodError::fs("sync", &temp_path))?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(PodError::fs("replace", &self.path)(e));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
    }

    async fn ensure_parent(&self) -> Result<(), PodError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(PodError::fs("create directory", parent))?;
        }
        Ok(())
    }
}

fn json_contents<T: Serialize>(value: &T) -> Result<Vec<u8>, PodError> {
    let mut contents = serde_json::to_string_pretty(value)?;
    contents.push('\n');
    Ok(contents.into_bytes())
}
