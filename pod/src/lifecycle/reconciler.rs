//! Reconcile registered apps against the process supervisor

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::errors::PodError;
use crate::lifecycle::status::AppView;
use crate::models::app::{sniff_port, AppDefinition};
use crate::models::process::{LaunchDescriptor, ProcessInstance, ProcessStatus};
use crate::registry::config::{PodConfig, WEB_SERVICE_ID};
use crate::registry::layout::{bare_repo_name, StorageLayout};
use crate::supervisor::Supervisor;

/// App options that never reach the supervisor as-is
const RESERVED_OPTIONS: &[&str] = &[
    "port",
    "node_env",
    "remote",
    "branch",
    "script",
    "username",
    "password",
    "jsonp",
    "name",
    "cwd",
    "env",
    "instances",
    "out_file",
    "error_file",
    "pid_file",
    "min_uptime",
    "max_restarts",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartResult {
    Started { port: Option<u16>, instances: u32 },
    /// Known to the supervisor but stopped or errored, restarted in place
    Resumed { count: usize },
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopResult {
    Stopped { count: usize },
    NotRunning,
}

/// Drives the supervisor so that it matches the registry
#[derive(Clone)]
pub struct Reconciler {
    supervisor: Arc<dyn Supervisor>,
    layout: StorageLayout,
}

impl Reconciler {
    pub fn new(supervisor: Arc<dyn Supervisor>, layout: StorageLayout) -> Self {
        Self { supervisor, layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Start `app` unless it already runs
    pub async fn start(&self, app: &AppDefinition, config: &PodConfig) -> Result<StartResult, PodError> {
        let app = &self.resolve_entry(app).await;
        if !is_file(&app.script_path).await {
            return Err(PodError::NoScript {
                app: app.name.clone(),
                script: app.script_path.clone(),
            });
        }

        let known = self.supervisor.find_by_script(&app.script_path).await?;
        if !known.is_empty() {
            let dormant = known.iter().all(|p| {
                matches!(
                    p.status,
                    ProcessStatus::Stopped | ProcessStatus::Stopping | ProcessStatus::Errored
                )
            });
            if !dormant {
                debug!("{} already running", app.name);
                return Ok(StartResult::AlreadyRunning);
            }
            for proc in &known {
                self.supervisor.restart_instance(proc.id).await?;
            }
            info!("Resumed {} ({} instance(s))", app.name, known.len());
            return Ok(StartResult::Resumed { count: known.len() });
        }

        let descriptor = self.launch_descriptor(app, config);
        self.supervisor.launch(&descriptor).await?;
        info!("Started {}", app.name);
        Ok(StartResult::Started {
            port: app.port(),
            instances: descriptor.instances,
        })
    }

    /// Stop and deregister every live instance of `app`
    pub async fn stop(&self, app: &AppDefinition) -> Result<StopResult, PodError> {
        let live = self.live_instances(app).await?;
        if live.is_empty() {
            return Ok(StopResult::NotRunning);
        }
        for proc in &live {
            self.supervisor.stop_instance(proc.id).await?;
        }
        info!("Stopped {} ({} instance(s))", app.name, live.len());
        Ok(StopResult::Stopped { count: live.len() })
    }

    /// Restart every live instance of `app`, returning how many were restarted
    pub async fn restart(&self, app: &AppDefinition) -> Result<usize, PodError> {
        let live = self.live_instances(app).await?;
        if live.is_empty() {
            return Err(PodError::NotRunning(app.name.clone()));
        }
        for proc in &live {
            self.supervisor.restart_instance(proc.id).await?;
        }
        info!("Restarted {} ({} instance(s))", app.name, live.len());
        Ok(live.len())
    }

    /// Restart live instances whose name is registered, leaving foreign processes alone
    pub async fn restart_all(
        &self,
        registered: &BTreeSet<String>,
    ) -> Result<Vec<ProcessInstance>, PodError> {
        let targets: Vec<ProcessInstance> = self
            .supervisor
            .list()
            .await?
            .into_iter()
            .filter(|p| p.is_live() && registered.contains(&p.name))
            .collect();

        for proc in &targets {
            self.supervisor.restart_instance(proc.id).await?;
        }
        Ok(targets)
    }

    /// One view per app from a single supervisor query
    pub async fn list(&self, apps: &[AppDefinition]) -> Result<Vec<AppView>, PodError> {
        if apps.is_empty() {
            return Ok(Vec::new());
        }
        let processes = self.supervisor.list().await?;
        let now = Utc::now();

        let mut views = Vec::with_capacity(apps.len());
        for app in apps {
            let app = &self.resolve_entry(app).await;
            let broken = self.is_broken(app).await;
            let port = match app.port() {
                Some(port) => Some(port),
                None => sniff_script_port(&app.script_path).await,
            };
            views.push(AppView::derive(app, &processes, broken, port, now));
        }
        Ok(views)
    }

    /// `app` with its entry script resolved against the work tree.
    ///
    /// An explicit `script` option wins. Otherwise `main` from the work tree's
    /// `package.json` is used when present, falling back to the default script.
    pub async fn resolve_entry(&self, app: &AppDefinition) -> AppDefinition {
        let mut resolved = app.clone();
        if app.name == WEB_SERVICE_ID || app.config.contains_key("script") {
            return resolved;
        }
        let work_tree = self.layout.work_tree(&app.name);
        if let Some(main) = package_main(work_tree.path()).await {
            debug!("{} runs package.json main {}", app.name, main.display());
            resolved.script_path = main;
        }
        resolved
    }

    /// Work tree missing, or the bare repository of a local app missing
    pub async fn is_broken(&self, app: &AppDefinition) -> bool {
        if app.name == WEB_SERVICE_ID {
            return false;
        }
        if !self.layout.work_tree(&app.name).exists().await {
            return true;
        }
        !app.is_remote() && !self.layout.bare_repo(&app.name).exists().await
    }

    /// Delete entries of `apps/` and `repos/` that belong to no registered app
    pub async fn prune(&self, registered: &BTreeSet<String>) -> Result<Vec<PathBuf>, PodError> {
        let mut pruned = Vec::new();

        let apps = self.layout.apps_dir();
        for name in apps.list_names().await? {
            if !registered.contains(&name) {
                apps.remove_entry(&name).await?;
                pruned.push(apps.path().join(&name));
            }
        }

        let repos = self.layout.repos_dir();
        for name in repos.list_names().await? {
            let owned = registered.iter().any(|app| owns_repo_entry(app, &name));
            if !owned {
                repos.remove_entry(&name).await?;
                pruned.push(repos.path().join(&name));
            }
        }

        for path in &pruned {
            info!("Pruned {}", path.display());
        }
        Ok(pruned)
    }

    /// Delete the work tree and bare repository of `app`, collecting failures
    pub async fn remove_artifacts(&self, app: &AppDefinition) -> Vec<String> {
        let mut failures = Vec::new();
        for dir in [self.layout.work_tree(&app.name), self.layout.bare_repo(&app.name)] {
            if let Err(e) = dir.delete().await {
                warn!("{}", e);
                failures.push(e.to_string());
            }
        }
        failures
    }

    /// Build the supervisor launch request for `app`
    pub fn launch_descriptor(&self, app: &AppDefinition, config: &PodConfig) -> LaunchDescriptor {
        let work_tree = if app.name == WEB_SERVICE_ID {
            self.layout.root.clone()
        } else {
            self.layout.work_tree(&app.name).path().to_path_buf()
        };
        let logs = self.layout.logs_dir();

        let mut env = Map::new();
        for (key, value) in &config.env {
            env.insert(key.clone(), env_value(value));
        }
        if let Some(Value::Object(app_env)) = app.config.get("env") {
            for (key, value) in app_env {
                env.insert(key.clone(), env_value(value));
            }
        }
        let node_env = app
            .option_str("node_env")
            .unwrap_or(config.node_env.as_str());
        env.insert("NODE_ENV".to_string(), Value::String(node_env.to_string()));
        if let Some(port) = app.port() {
            env.insert("PORT".to_string(), Value::String(port.to_string()));
        }

        let log_path = |key: &str, default: String| -> PathBuf {
            match app.option_str(key) {
                Some(path) => work_tree.join(path),
                None => logs.path().join(default),
            }
        };

        let extra = app
            .config
            .iter()
            .filter(|(key, _)| !RESERVED_OPTIONS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        LaunchDescriptor {
            name: app.name.clone(),
            script: app.script_path.clone(),
            cwd: work_tree.clone(),
            env,
            instances: app.instances(),
            out_file: log_path("out_file", format!("{}-out.log", app.name)),
            error_file: log_path("error_file", format!("{}-err.log", app.name)),
            pid_file: log_path("pid_file", format!("{}.pid", app.name)),
            min_uptime: app
                .config
                .get("min_uptime")
                .cloned()
                .or_else(|| config.min_uptime.clone()),
            max_restarts: app
                .config
                .get("max_restarts")
                .cloned()
                .or_else(|| config.max_restarts.clone()),
            extra,
        }
    }

    async fn live_instances(&self, app: &AppDefinition) -> Result<Vec<ProcessInstance>, PodError> {
        Ok(self
            .supervisor
            .list()
            .await?
            .into_iter()
            .filter(|p| p.is_live() && p.matches(app))
            .collect())
    }
}

/// Repository directory names that belong to `app`
pub fn owns_repo_entry(app: &str, entry: &str) -> bool {
    entry == bare_repo_name(app)
}

fn env_value(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        other => Value::String(other.to_string()),
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Entry point declared by `package.json` in `work_tree`.
///
/// A directory resolves to its `index.js`, an extension-less name to `<name>.js`.
async fn package_main(work_tree: &Path) -> Option<PathBuf> {
    let manifest = tokio::fs::read_to_string(work_tree.join("package.json"))
        .await
        .ok()?;
    let manifest: Value = match serde_json::from_str(&manifest) {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!("Ignoring unreadable package.json in {}: {}", work_tree.display(), e);
            return None;
        }
    };
    let main = manifest.get("main")?.as_str()?.trim();
    if main.is_empty() {
        return None;
    }

    let path = work_tree.join(main);
    if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
        return Some(path.join("index.js"));
    }
    if path.extension().is_none() {
        let with_js = path.with_extension("js");
        if is_file(&with_js).await {
            return Some(with_js);
        }
    }
    Some(path)
}

async fn sniff_script_port(script: &Path) -> Option<u16> {
    let source = tokio::fs::read_to_string(script).await.ok()?;
    sniff_port(&source)
}
