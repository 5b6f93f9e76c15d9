//! Error types for pod

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for pod
#[derive(Error, Debug)]
pub enum PodError {
    #[error("app {0} does not exist")]
    NotFound(String),

    #[error("an app with the name {0} already exists")]
    AlreadyExists(String),

    #[error("{0} is reserved for the web interface")]
    ReservedName(String),

    #[error("invalid app name: {0:?}")]
    InvalidName(String),

    #[error("cannot locate main script for {app} ({})", .script.display())]
    NoScript { app: String, script: PathBuf },

    #[error("{0} is not running")]
    NotRunning(String),

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("unsupported webhook payload: {0}")]
    UnsupportedProvider(String),

    #[error("deploy hook for {app} failed (exit code {}), work tree reverted", .code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    HookFailed { app: String, code: Option<i32> },

    #[error("rollback of {app} to {commit} failed, work tree is inconsistent: {reason}")]
    RollbackFailed {
        app: String,
        commit: String,
        reason: String,
    },

    #[error("process supervisor unavailable: {0}")]
    SupervisorUnavailable(String),

    #[error("supervisor error: {0}")]
    Supervisor(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("failed to remove files of {app}: {}", .failures.join("; "))]
    Cleanup { app: String, failures: Vec<String> },

    #[error("failed to {op} {}: {source}", .path.display())]
    Fs {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PodError {
    /// Build a mapper that attaches the failed operation and path to an IO error
    pub fn fs(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> PodError {
        let path = path.into();
        move |source| PodError::Fs { op, path, source }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            PodError::NotFound(_) => "NOT_FOUND",
            PodError::AlreadyExists(_) => "EXISTS",
            PodError::ReservedName(_) => "WEB",
            PodError::InvalidName(_) => "INVALID_NAME",
            PodError::NoScript { .. } => "NO_SCRIPT",
            PodError::NotRunning(_) => "NOT_RUNNING",
            PodError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            PodError::UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
            PodError::HookFailed { .. } => "HOOK_FAILED",
            PodError::RollbackFailed { .. } => "ROLLBACK_FAILED",
            PodError::SupervisorUnavailable(_) => "SUPERVISOR_UNAVAILABLE",
            PodError::Supervisor(_) => "SUPERVISOR",
            PodError::Git(_) => "GIT",
            PodError::Cleanup { .. } => "CLEANUP",
            PodError::Fs { .. } | PodError::IoError(_) => "IO",
            PodError::JsonError(_) => "JSON",
            PodError::ConfigError(_) => "CONFIG",
            PodError::ServerError(_) => "SERVER",
            PodError::Internal(_) => "INTERNAL",
        }
    }

    /// Process exit status used by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            PodError::RollbackFailed { .. } => 3,
            PodError::SupervisorUnavailable(_) => 4,
            PodError::HookFailed { code, .. } => code.filter(|c| *c > 0).unwrap_or(1),
            _ => 1,
        }
    }
}

impl From<anyhow::Error> for PodError {
    fn from(err: anyhow::Error) -> Self {
        PodError::Internal(err.to_string())
    }
}
