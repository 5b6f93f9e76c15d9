//! Derived per-app status

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::app::AppDefinition;
use crate::models::process::ProcessInstance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppStatus {
    Running,
    Error,
    Stopped,
    Broken,
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AppStatus::Running => "RUNNING",
            AppStatus::Error => "ERROR",
            AppStatus::Stopped => "STOPPED",
            AppStatus::Broken => "BROKEN",
        };
        f.write_str(label)
    }
}

/// A registered app joined with its supervised processes at query time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppView {
    pub name: String,
    pub status: AppStatus,
    /// At least one live instance, whatever their health
    pub is_running: bool,
    pub is_broken: bool,
    /// Restarts summed over all instances
    pub restarts: u32,
    /// Seconds since the oldest instance started
    pub uptime: Option<u64>,
    pub total_memory: u64,
    pub total_cpu: f32,
    pub instance_count: usize,
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

impl AppView {
    /// Build the view of `app` from the full supervisor listing
    pub fn derive(
        app: &AppDefinition,
        processes: &[ProcessInstance],
        broken: bool,
        port: Option<u16>,
        now: DateTime<Utc>,
    ) -> Self {
        let live: Vec<&ProcessInstance> = processes
            .iter()
            .filter(|p| p.is_live() && p.matches(app))
            .collect();

        let status = if broken {
            AppStatus::Broken
        } else if live.is_empty() {
            AppStatus::Stopped
        } else if live.iter().any(|p| p.is_errored()) {
            AppStatus::Error
        } else {
            AppStatus::Running
        };

        let uptime = live
            .iter()
            .filter_map(|p| p.uptime_start)
            .min()
            .map(|started| (now - started).num_seconds().max(0) as u64);

        AppView {
            name: app.name.clone(),
            status,
            is_running: !live.is_empty(),
            is_broken: broken,
            restarts: live.iter().map(|p| p.restart_count).sum(),
            uptime,
            total_memory: live.iter().map(|p| p.memory).sum(),
            total_cpu: live.iter().map(|p| p.cpu).sum(),
            instance_count: live.len(),
            port,
            remote: app.remote.clone(),
        }
    }
}
