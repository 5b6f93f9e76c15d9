//! Git subprocess helpers

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::PodError;

/// Variables a hook environment sets that would redirect git away from the
/// repository we point it at
const GIT_ENV_OVERRIDES: &[&str] = &["GIT_DIR", "GIT_WORK_TREE", "GIT_INDEX_FILE"];

fn git() -> Command {
    let mut cmd = Command::new("git");
    for var in GIT_ENV_OVERRIDES {
        cmd.env_remove(var);
    }
    cmd
}

async fn run(mut cmd: Command, what: &str) -> Result<String, PodError> {
    let output = cmd
        .output()
        .await
        .map_err(|e| PodError::Git(format!("failed to run git {}: {}", what, e)))?;

    if !output.status.success() {
        return Err(PodError::Git(format!(
            "git {} failed: {}",
            what,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Initialize a bare repository
pub async fn init_bare_repo(repo: &Path) -> Result<(), PodError> {
    debug!("Initializing bare repository at {}", repo.display());
    let mut cmd = git();
    cmd.arg("--git-dir").arg(repo).args(["init", "--bare"]);
    run(cmd, "init").await?;
    Ok(())
}

/// Clone `source` (a URL or a bare repository path) into `target`
pub async fn clone_working_copy(source: &str, target: &Path) -> Result<(), PodError> {
    info!("Cloning {} into {}", source, target.display());
    let mut cmd = git();
    cmd.arg("clone").arg(source).arg(target);
    run(cmd, "clone").await?;
    Ok(())
}

/// Commit hash checked out in `work_tree`, `None` when the repository has no commits yet
pub async fn current_commit_hash(work_tree: &Path) -> Result<Option<String>, PodError> {
    let output = git()
        .current_dir(work_tree)
        .args(["rev-parse", "--verify", "--quiet", "HEAD"])
        .output()
        .await
        .map_err(|e| PodError::Git(format!("failed to run git rev-parse: {}", e)))?;

    if !output.status.success() {
        // Exit 1 with empty output means an unborn HEAD
        if output.status.code() == Some(1) && output.stdout.is_empty() {
            return Ok(None);
        }
        return Err(PodError::Git(format!(
            "git rev-parse failed in {}: {}",
            work_tree.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(Some(hash).filter(|h| !h.is_empty()))
}

/// Reset the work tree to `commit`, discarding local changes
pub async fn hard_reset(work_tree: &Path, commit: &str) -> Result<(), PodError> {
    info!("Resetting {} to {}", work_tree.display(), commit);
    let mut cmd = git();
    cmd.current_dir(work_tree).args(["reset", "--hard", commit]);
    run(cmd, "reset").await?;
    Ok(())
}
