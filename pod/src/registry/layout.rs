//! Storage layout under the pod root

use std::path::PathBuf;

use crate::errors::PodError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Where pod keeps work trees, bare repositories and logs
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Absolute pod root
    pub root: PathBuf,
}

impl StorageLayout {
    /// Create a layout, making `root` absolute
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::fs::canonicalize(&root)
            .or_else(|_| std::path::absolute(&root))
            .unwrap_or(root);
        Self { root }
    }

    /// Work trees, one per app
    pub fn apps_dir(&self) -> Dir {
        Dir::new(self.root.join("apps"))
    }

    /// Bare repositories of local apps
    pub fn repos_dir(&self) -> Dir {
        Dir::new(self.root.join("repos"))
    }

    /// Supervisor and server logs
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.root.join("logs"))
    }

    /// Transient rendered deploy scripts
    pub fn hooks_dir(&self) -> Dir {
        Dir::new(self.root.join(".hooks"))
    }

    pub fn work_tree(&self, app: &str) -> Dir {
        self.apps_dir().subdir(app)
    }

    pub fn bare_repo(&self, app: &str) -> Dir {
        self.repos_dir().subdir(&bare_repo_name(app))
    }

    pub fn post_receive_hook(&self, app: &str) -> File {
        self.bare_repo(app).subdir("hooks").file("post-receive")
    }

    /// Server log written by `pod serve`
    pub fn server_log(&self) -> PathBuf {
        self.logs_dir().path().join("pod.log")
    }

    /// Create the root directories
    pub async fn setup(&self) -> Result<(), PodError> {
        self.apps_dir().create().await?;
        self.repos_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

/// Directory name of an app's bare repository
pub fn bare_repo_name(app: &str) -> String {
    format!("{}.git", app)
}
