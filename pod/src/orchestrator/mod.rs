//! Orchestrator: ties the registry, the reconciler and the deploy pipeline
//! together and serializes operations per app.

pub mod locks;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use crate::app::options::DeployOptions;
use crate::deploy::executor::{self, HookExecutor, HookRun};
use crate::deploy::{git, template};
use crate::errors::PodError;
use crate::lifecycle::{AppView, Reconciler, StartResult, StopResult};
use crate::models::app::{AppDefinition, AppOptions};
use crate::models::deploy::DeployOutcome;
use crate::models::process::ProcessInstance;
use crate::registry::config::{PodConfig, WEB_SERVICE_ID};
use crate::registry::{RegistryStore, StorageLayout};
use crate::supervisor::Supervisor;
use crate::webhook::{guard, parse_local, PingEvent, PushEvent};

pub use locks::AppLocks;

/// How a successfully deployed app was brought up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Restarted { count: usize },
    /// The app was not running, so it was started instead
    Started(StartResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployReport {
    Deployed {
        outcome: DeployOutcome,
        activation: Activation,
    },
    /// The hook outlived the caller's time limit and finishes in the background
    Pending,
}

pub struct Orchestrator {
    registry: Arc<RegistryStore>,
    reconciler: Reconciler,
    executor: HookExecutor,
    locks: AppLocks,
    options: DeployOptions,
}

impl Orchestrator {
    pub async fn new(
        registry: Arc<RegistryStore>,
        supervisor: Arc<dyn Supervisor>,
        options: DeployOptions,
    ) -> Arc<Self> {
        let layout = StorageLayout::new(&registry.snapshot().await.root);
        Arc::new(Self {
            registry,
            reconciler: Reconciler::new(supervisor, layout.clone()),
            executor: HookExecutor::new(layout, options.shell.clone()),
            locks: AppLocks::new(),
            options,
        })
    }

    pub fn registry(&self) -> &Arc<RegistryStore> {
        &self.registry
    }

    pub fn layout(&self) -> &StorageLayout {
        self.reconciler.layout()
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    /// Definition for `name`, including the built-in web service
    pub async fn resolve(&self, name: &str) -> Result<AppDefinition, PodError> {
        if name == WEB_SERVICE_ID {
            return Ok(self.web_service(&*self.registry.snapshot().await));
        }
        self.registry
            .get(name)
            .await
            .ok_or_else(|| PodError::NotFound(name.to_string()))
    }

    /// Synthetic definition that runs this binary's webhook server under the supervisor
    pub fn web_service(&self, config: &PodConfig) -> AppDefinition {
        let mut options = AppOptions::new();
        options.insert("port".to_string(), json!(config.web.port));
        options.insert(
            "args".to_string(),
            json!(["--config", self.registry.path().to_string_lossy(), "serve"]),
        );
        options.insert("interpreter".to_string(), json!("none"));

        AppDefinition {
            name: WEB_SERVICE_ID.to_string(),
            script_path: self.options.pod_bin.clone(),
            remote: None,
            branch: None,
            config: options,
        }
    }

    /// Register an app and prepare its repositories. Returns the steps taken.
    pub async fn create(&self, name: &str, options: AppOptions) -> Result<Vec<String>, PodError> {
        let _guard = self.locks.acquire(name).await;
        let app = self.registry.create(name, options).await?;
        let layout = self.layout();
        let work_tree = layout.work_tree(name);

        let mut steps = vec![format!("created app {}", name)];
        match app.remote.as_deref() {
            Some(remote) => {
                steps.push(format!("remote app tracking branch {}", app.branch()));
                git::clone_working_copy(remote, work_tree.path()).await?;
                steps.push(format!(
                    "cloned {} into {}",
                    remote,
                    work_tree.path().display()
                ));
            }
            None => {
                let bare = layout.bare_repo(name);
                git::init_bare_repo(bare.path()).await?;
                steps.push(format!("created bare repo at {}", bare.path().display()));
                self.install_hook(name).await?;
                steps.push("created post-receive hook".to_string());
                git::clone_working_copy(&bare.path().to_string_lossy(), work_tree.path()).await?;
                steps.push(format!(
                    "created empty working copy at {}",
                    work_tree.path().display()
                ));
            }
        }
        info!("Created app {}", name);
        Ok(steps)
    }

    /// Stop an app, delete its files and drop it from the registry
    pub async fn remove(&self, name: &str) -> Result<(), PodError> {
        if name == WEB_SERVICE_ID {
            return Err(PodError::ReservedName(name.to_string()));
        }
        let _guard = self.locks.acquire(name).await;
        let app = self.resolve(name).await?;

        self.reconciler.stop(&app).await?;
        let failures = self.reconciler.remove_artifacts(&app).await;
        self.registry.remove(name).await?;
        info!("Removed app {}", name);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PodError::Cleanup {
                app: name.to_string(),
                failures,
            })
        }
    }

    pub async fn start(&self, name: &str) -> Result<StartResult, PodError> {
        let _guard = self.locks.acquire(name).await;
        let app = self.resolve(name).await?;
        let config = self.registry.snapshot().await;
        self.reconciler.start(&app, &config).await
    }

    pub async fn stop(&self, name: &str) -> Result<StopResult, PodError> {
        let _guard = self.locks.acquire(name).await;
        let app = self.resolve(name).await?;
        self.reconciler.stop(&app).await
    }

    /// Restart a running app, returning the number of restarted instances
    pub async fn restart(&self, name: &str) -> Result<usize, PodError> {
        let _guard = self.locks.acquire(name).await;
        let app = self.resolve(name).await?;
        self.reconciler.restart(&app).await
    }

    /// Start every registered app
    pub async fn start_all(&self) -> Vec<(String, Result<StartResult, PodError>)> {
        let mut results = Vec::new();
        for name in self.registry.list().await {
            let result = self.start(&name).await;
            results.push((name, result));
        }
        results
    }

    /// Stop every registered app
    pub async fn stop_all(&self) -> Vec<(String, Result<StopResult, PodError>)> {
        let mut results = Vec::new();
        for name in self.registry.list().await {
            let result = self.stop(&name).await;
            results.push((name, result));
        }
        results
    }

    /// Restart the live instances of registered apps
    pub async fn restart_all(&self) -> Result<Vec<ProcessInstance>, PodError> {
        let registered = self.registered().await;
        self.reconciler.restart_all(&registered).await
    }

    pub async fn list(&self) -> Result<Vec<AppView>, PodError> {
        let config = self.registry.snapshot().await;
        let apps: Vec<AppDefinition> = config.apps.values().cloned().collect();
        self.reconciler.list(&apps).await
    }

    /// Remove directories under the root that no registered app owns
    pub async fn prune(&self) -> Result<Vec<PathBuf>, PodError> {
        let registered = self.registered().await;
        self.reconciler.prune(&registered).await
    }

    /// Rewrite the post-receive hook of every local app, returning their names
    pub async fn update_hooks(&self) -> Result<Vec<String>, PodError> {
        let config = self.registry.snapshot().await;
        let mut updated = Vec::new();
        for app in config.apps.values().filter(|app| !app.is_remote()) {
            self.install_hook(&app.name).await?;
            updated.push(app.name.clone());
        }
        Ok(updated)
    }

    async fn install_hook(&self, name: &str) -> Result<(), PodError> {
        let hook = template::render_post_receive(&self.options.pod_bin, self.registry.path(), name);
        self.layout().post_receive_hook(name).write_executable(&hook).await
    }

    async fn registered(&self) -> BTreeSet<String> {
        self.registry.list().await.into_iter().collect()
    }

    /// Run the deploy hook of `name`, rolling back on failure and bringing
    /// the app up on success.
    ///
    /// When `timeout` passes first, the deploy keeps going in a background task
    /// that holds the app lock, and [`DeployReport::Pending`] is returned.
    pub async fn deploy(
        self: &Arc<Self>,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<DeployReport, PodError> {
        let guard = self.locks.acquire(name).await;
        let app = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| PodError::NotFound(name.to_string()))?;

        match self.executor.execute(&app, timeout).await? {
            HookRun::Finished(outcome) => {
                let activation = self.finish_deploy(&app, &outcome).await?;
                Ok(DeployReport::Deployed {
                    outcome,
                    activation,
                })
            }
            HookRun::TimedOut(handle) => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    let _guard = guard;
                    let outcome = match executor::join(handle).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            error!("Deploy of {} did not complete: {}", app.name, e);
                            return;
                        }
                    };
                    match this.finish_deploy(&app, &outcome).await {
                        Ok(activation) => info!("Deployed {}: {:?}", app.name, activation),
                        Err(e) => error!("Deploy of {} failed: {}", app.name, e),
                    }
                });
                Ok(DeployReport::Pending)
            }
        }
    }

    async fn finish_deploy(
        &self,
        app: &AppDefinition,
        outcome: &DeployOutcome,
    ) -> Result<Activation, PodError> {
        if !outcome.succeeded {
            self.roll_back(app, outcome).await?;
            return Err(PodError::HookFailed {
                app: app.name.clone(),
                code: outcome.exit_code,
            });
        }

        match self.reconciler.restart(app).await {
            Ok(count) => Ok(Activation::Restarted { count }),
            Err(PodError::NotRunning(_)) => {
                let config = self.registry.snapshot().await;
                let started = self.reconciler.start(app, &config).await?;
                Ok(Activation::Started(started))
            }
            Err(e) => Err(e),
        }
    }

    async fn roll_back(&self, app: &AppDefinition, outcome: &DeployOutcome) -> Result<(), PodError> {
        let Some(commit) = outcome.previous_commit_hash.as_deref() else {
            warn!(
                "Deploy of {} failed on an empty repository, nothing to roll back to",
                app.name
            );
            return Ok(());
        };

        let work_tree = self.layout().work_tree(&app.name);
        match git::hard_reset(work_tree.path(), commit).await {
            Ok(()) => {
                warn!("Deploy of {} failed, reverted to {}", app.name, commit);
                Ok(())
            }
            Err(e) => {
                error!("Rollback of {} to {} failed: {}", app.name, commit, e);
                Err(PodError::RollbackFailed {
                    app: app.name.clone(),
                    commit: commit.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Deploy `name` if `push` passes the deploy gates
    pub async fn handle_push(
        self: &Arc<Self>,
        name: &str,
        push: &PushEvent,
        timeout: Option<Duration>,
    ) -> Result<Option<DeployReport>, PodError> {
        let app = self.resolve(name).await?;
        if !guard::should_deploy(push, &app) {
            return Ok(None);
        }
        self.deploy(name, timeout).await.map(Some)
    }

    /// Deploy a local app from its post-receive hook input.
    ///
    /// Without ref lines the deploy is unconditional. Otherwise one of the
    /// pushed refs must be the tracked branch.
    pub async fn handle_local_push(
        self: &Arc<Self>,
        name: &str,
        ref_lines: &[String],
        timeout: Option<Duration>,
    ) -> Result<Option<DeployReport>, PodError> {
        let app = self.resolve(name).await?;
        if !ref_lines.is_empty() {
            let repo = self.layout().bare_repo(name);
            let repo_url = repo.path().to_string_lossy();
            let mut branches = Vec::new();
            for line in ref_lines.iter().filter(|l| !l.trim().is_empty()) {
                branches.push(parse_local(line, &repo_url)?.branch);
            }
            if !branches.iter().any(|b| b == app.branch()) {
                info!(
                    "Ignoring push to {} for {}: tracked branch is {}",
                    branches.join(", "),
                    name,
                    app.branch()
                );
                return Ok(None);
            }
        }
        self.deploy(name, timeout).await.map(Some)
    }

    /// Whether a webhook ping comes from the app's remote
    pub async fn ping_matches(&self, name: &str, ping: &PingEvent) -> Result<bool, PodError> {
        let app = self.resolve(name).await?;
        Ok(guard::ping_matches(ping, &app))
    }
}
