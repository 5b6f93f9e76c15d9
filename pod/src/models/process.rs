//! Process supervisor models

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::app::AppDefinition;

/// Process status as reported by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Online,
    Launching,
    Stopping,
    Stopped,
    Errored,
    #[serde(other)]
    Unknown,
}

/// A supervised process observed at query time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInstance {
    /// Supervisor id
    pub id: u64,

    /// OS process id, absent when not running
    pub pid: Option<u32>,

    /// Process name, the app name for processes launched by pod
    pub name: String,

    /// Executable path as reported by the supervisor
    pub script: Option<PathBuf>,

    pub status: ProcessStatus,

    /// When the current run started
    pub uptime_start: Option<DateTime<Utc>>,

    pub restart_count: u32,

    /// CPU usage in percent
    pub cpu: f32,

    /// Resident memory in bytes
    pub memory: u64,
}

impl ProcessInstance {
    /// Counted as live unless the supervisor reports it stopped
    pub fn is_live(&self) -> bool {
        self.status != ProcessStatus::Stopped
    }

    pub fn is_errored(&self) -> bool {
        self.status == ProcessStatus::Errored
    }

    /// Whether this process was launched for the given app
    pub fn matches(&self, app: &AppDefinition) -> bool {
        self.name == app.name || self.runs_script(&app.script_path)
    }

    /// Whether this process executes `script`
    pub fn runs_script(&self, script: &Path) -> bool {
        self.script.as_deref() == Some(script)
    }
}

/// Everything the supervisor needs to launch an app
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchDescriptor {
    pub name: String,
    pub script: PathBuf,
    pub cwd: PathBuf,
    pub env: serde_json::Map<String, serde_json::Value>,
    pub instances: u32,
    pub out_file: PathBuf,
    pub error_file: PathBuf,
    pub pid_file: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_uptime: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<serde_json::Value>,

    /// Remaining app options handed to the supervisor untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
