//! Registry store: the persisted set of apps plus global settings

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::PodError;
use crate::filesys::file::File;
use crate::models::app::{expand_remote, validate_name, AppDefinition, AppOptions};
use crate::registry::config::{PodConfig, WEB_SERVICE_ID};
use crate::registry::layout::StorageLayout;

#[derive(Debug, Clone)]
struct Snapshot {
    config: Arc<PodConfig>,
    loaded_at: DateTime<Utc>,
}

/// Registry backed by one JSON file.
///
/// Readers work on an immutable snapshot. Mutations hold the store lock while
/// they re-read the file, apply the change and replace it atomically.
#[derive(Debug)]
pub struct RegistryStore {
    path: PathBuf,
    state: Mutex<Snapshot>,
}

impl RegistryStore {
    /// Open an existing registry file
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PodError> {
        let path = path.into();
        let (config, upgraded) = PodConfig::load(&path).await?;
        if upgraded {
            info!("Upgraded legacy registry file {}", path.display());
            File::new(&path).write_private_json(&config).await?;
        }
        StorageLayout::new(&config.root).setup().await?;

        Ok(Self {
            path,
            state: Mutex::new(Snapshot {
                config: Arc::new(config),
                loaded_at: Utc::now(),
            }),
        })
    }

    /// Write a fresh registry file rooted at `root` and open it.
    ///
    /// An existing file is left untouched and simply opened.
    pub async fn init(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Result<Self, PodError> {
        let path = path.into();
        let file = File::new(&path);
        if !file.exists().await {
            let layout = StorageLayout::new(root.into());
            layout.setup().await?;
            file.write_private_json(&PodConfig::new(layout.root.clone())).await?;
            info!("Created registry file {}", path.display());
        }
        Self::open(path).await
    }

    /// Registry file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration snapshot
    pub async fn snapshot(&self) -> Arc<PodConfig> {
        self.state.lock().await.config.clone()
    }

    /// When the current snapshot was read from disk
    pub async fn loaded_at(&self) -> DateTime<Utc> {
        self.state.lock().await.loaded_at
    }

    /// Re-read the registry file
    pub async fn reload(&self) -> Result<Arc<PodConfig>, PodError> {
        let mut state = self.state.lock().await;
        let (config, _) = PodConfig::load(&self.path).await?;
        let config = Arc::new(config);
        *state = Snapshot {
            config: config.clone(),
            loaded_at: Utc::now(),
        };
        debug!("Reloaded registry at {}", state.loaded_at);
        Ok(config)
    }

    /// Look up an app definition
    pub async fn get(&self, name: &str) -> Option<AppDefinition> {
        self.snapshot().await.apps.get(name).cloned()
    }

    /// Registered app names, sorted
    pub async fn list(&self) -> Vec<String> {
        self.snapshot().await.apps.keys().cloned().collect()
    }

    /// Register a new app
    pub async fn create(&self, name: &str, options: AppOptions) -> Result<AppDefinition, PodError> {
        if name == WEB_SERVICE_ID {
            return Err(PodError::ReservedName(name.to_string()));
        }
        validate_name(name)?;

        self.mutate(|config| {
            if config.apps.contains_key(name) {
                return Err(PodError::AlreadyExists(name.to_string()));
            }
            let app = build_definition(config, name, options);
            config.apps.insert(name.to_string(), app.clone());
            Ok(app)
        })
        .await
    }

    /// Drop an app from the registry
    pub async fn remove(&self, name: &str) -> Result<AppDefinition, PodError> {
        self.mutate(|config| {
            config
                .apps
                .remove(name)
                .ok_or_else(|| PodError::NotFound(name.to_string()))
        })
        .await
    }

    async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut PodConfig) -> Result<T, PodError>,
    ) -> Result<T, PodError> {
        let mut state = self.state.lock().await;
        let (mut config, _) = PodConfig::load(&self.path).await?;
        let result = change(&mut config)?;
        File::new(&self.path).write_private_json(&config).await?;
        *state = Snapshot {
            config: Arc::new(config),
            loaded_at: Utc::now(),
        };
        Ok(result)
    }
}

fn build_definition(config: &PodConfig, name: &str, options: AppOptions) -> AppDefinition {
    let layout = StorageLayout::new(&config.root);
    let script = options
        .get("script")
        .and_then(|v| v.as_str())
        .unwrap_or(config.default_script.as_str());
    let script_path = layout.work_tree(name).path().join(script);

    AppDefinition {
        name: name.to_string(),
        script_path,
        remote: options
            .get("remote")
            .and_then(|v| v.as_str())
            .map(expand_remote),
        branch: options
            .get("branch")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        config: options,
    }
}
