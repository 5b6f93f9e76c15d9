//! Deploy hook executor

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::deploy::{git, template};
use crate::errors::PodError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::app::AppDefinition;
use crate::models::deploy::DeployOutcome;
use crate::registry::layout::StorageLayout;

/// How a hook run ended from the caller's point of view
#[derive(Debug)]
pub enum HookRun {
    /// The hook exited within the time limit
    Finished(DeployOutcome),

    /// The time limit passed. The hook keeps running and the handle yields
    /// its outcome once it exits.
    TimedOut(JoinHandle<DeployOutcome>),
}

/// Runs rendered deploy scripts against an app's work tree
#[derive(Debug, Clone)]
pub struct HookExecutor {
    layout: StorageLayout,
    shell: String,
}

impl HookExecutor {
    pub fn new(layout: StorageLayout, shell: impl Into<String>) -> Self {
        Self {
            layout,
            shell: shell.into(),
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Run the deploy script for `app`, waiting at most `timeout` for it
    pub async fn execute(
        &self,
        app: &AppDefinition,
        timeout: Option<Duration>,
    ) -> Result<HookRun, PodError> {
        let work_tree = self.layout.work_tree(&app.name).path().to_path_buf();
        let previous_commit_hash = git::current_commit_hash(&work_tree).await?;
        debug!(
            "Deploying {} from {}",
            app.name,
            previous_commit_hash.as_deref().unwrap_or("an empty work tree")
        );

        let contents = template::render_deploy_script(&self.layout.root, &app.name, app.branch());
        let script = TempScript::write(&self.layout.hooks_dir(), &app.name, &contents).await?;

        let mut child = Command::new(&self.shell)
            .arg(script.path())
            .current_dir(&work_tree)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PodError::Internal(format!("failed to spawn {}: {}", self.shell, e)))?;

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(app.name.clone(), "stdout", out)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(app.name.clone(), "stderr", err)));

        let app_name = app.name.clone();
        let mut handle = tokio::spawn(async move {
            let status = child.wait().await;
            for forwarder in [stdout, stderr].into_iter().flatten() {
                let _ = forwarder.await;
            }
            drop(script);

            let (succeeded, exit_code) = match status {
                Ok(status) => (status.success(), status.code()),
                Err(e) => {
                    warn!("Failed to wait for deploy hook of {}: {}", app_name, e);
                    (false, None)
                }
            };
            let new_commit_hash = git::current_commit_hash(&work_tree)
                .await
                .unwrap_or_else(|e| {
                    warn!("Cannot read commit of {}: {}", app_name, e);
                    None
                });

            info!(
                "Deploy hook of {} exited with {:?} (succeeded: {})",
                app_name, exit_code, succeeded
            );
            DeployOutcome {
                app_name,
                succeeded,
                previous_commit_hash,
                new_commit_hash,
                exit_code,
            }
        });

        let Some(limit) = timeout else {
            return Ok(HookRun::Finished(join(handle).await?));
        };
        match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => Ok(HookRun::Finished(joined.map_err(join_error)?)),
            Err(_) => {
                info!(
                    "Deploy hook of {} still running after {:?}, continuing in background",
                    app.name, limit
                );
                Ok(HookRun::TimedOut(handle))
            }
        }
    }
}

/// Wait for a hook task started by [`HookExecutor::execute`]
pub async fn join(handle: JoinHandle<DeployOutcome>) -> Result<DeployOutcome, PodError> {
    handle.await.map_err(join_error)
}

fn join_error(e: tokio::task::JoinError) -> PodError {
    PodError::Internal(format!("deploy hook task failed: {}", e))
}

async fn forward_lines(app: String, stream: &'static str, reader: impl AsyncRead + Unpin) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if stream == "stderr" {
            warn!(app = %app, "{}", line);
        } else {
            info!(app = %app, "{}", line);
        }
    }
}

/// Rendered script file, removed when dropped
struct TempScript {
    path: PathBuf,
}

impl TempScript {
    async fn write(dir: &Dir, app: &str, contents: &str) -> Result<Self, PodError> {
        let path = dir
            .path()
            .join(format!("{}-{}.sh", app, uuid::Uuid::new_v4().simple()));
        File::new(&path).write_private_executable(contents).await?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempScript {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}
