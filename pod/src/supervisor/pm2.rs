//! PM2 adapter driving the `pm2` command line

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::PodError;
use crate::filesys::file::File;
use crate::models::process::{LaunchDescriptor, ProcessInstance, ProcessStatus};
use crate::supervisor::Supervisor;

/// Supervisor backed by a local PM2 installation
#[derive(Debug, Clone)]
pub struct Pm2Supervisor {
    binary: PathBuf,
    scratch_dir: PathBuf,
}

impl Default for Pm2Supervisor {
    fn default() -> Self {
        Self::new("pm2")
    }
}

impl Pm2Supervisor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Directory for the transient ecosystem files passed to `pm2 start`
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    async fn run(&self, args: &[&str]) -> Result<String, PodError> {
        debug!("Running {} {}", self.binary.display(), args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PodError::SupervisorUnavailable(format!(
                        "{} not found in PATH",
                        self.binary.display()
                    ))
                } else {
                    PodError::SupervisorUnavailable(format!(
                        "failed to run {}: {}",
                        self.binary.display(),
                        e
                    ))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PodError::Supervisor(format!(
                "pm2 {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Supervisor for Pm2Supervisor {
    async fn list(&self) -> Result<Vec<ProcessInstance>, PodError> {
        let stdout = self.run(&["jlist"]).await?;
        parse_jlist(&stdout)
    }

    async fn launch(&self, descriptor: &LaunchDescriptor) -> Result<(), PodError> {
        let file = File::new(
            self.scratch_dir
                .join(format!("pod-{}-{}.json", descriptor.name, uuid::Uuid::new_v4().simple())),
        );
        file.write_json(&ecosystem(descriptor)?).await?;

        let path = file.path().to_string_lossy().into_owned();
        let result = self.run(&["start", &path]).await;
        if let Err(e) = file.delete().await {
            debug!("Failed to remove ecosystem file: {}", e);
        }
        result?;

        info!(
            "Launched {} ({} instance(s)) under pm2",
            descriptor.name, descriptor.instances
        );
        Ok(())
    }

    async fn stop_instance(&self, id: u64) -> Result<(), PodError> {
        let id = id.to_string();
        self.run(&["stop", &id]).await?;
        self.run(&["delete", &id]).await?;
        Ok(())
    }

    async fn restart_instance(&self, id: u64) -> Result<(), PodError> {
        self.run(&["restart", &id.to_string()]).await?;
        Ok(())
    }
}

/// Build the `{ "apps": [...] }` document understood by `pm2 start`
fn ecosystem(descriptor: &LaunchDescriptor) -> Result<Value, PodError> {
    let mut app = serde_json::to_value(descriptor)?;
    if let Value::Object(map) = &mut app {
        if descriptor.instances > 1 {
            map.insert("exec_mode".to_string(), json!("cluster"));
        }
    }
    Ok(json!({ "apps": [app] }))
}

#[derive(Debug, Deserialize)]
struct Pm2Process {
    pm_id: u64,
    #[serde(default)]
    pid: Option<u32>,
    name: String,
    #[serde(default)]
    pm2_env: Pm2Env,
    #[serde(default)]
    monit: Pm2Monit,
}

#[derive(Debug, Default, Deserialize)]
struct Pm2Env {
    #[serde(default)]
    pm_exec_path: Option<PathBuf>,
    #[serde(default)]
    status: Option<ProcessStatus>,
    #[serde(default)]
    pm_uptime: Option<i64>,
    #[serde(default)]
    restart_time: u32,
}

#[derive(Debug, Default, Deserialize)]
struct Pm2Monit {
    #[serde(default)]
    memory: u64,
    #[serde(default)]
    cpu: f32,
}

/// Parse `pm2 jlist` output, skipping any banner printed before the JSON
fn parse_jlist(stdout: &str) -> Result<Vec<ProcessInstance>, PodError> {
    let mut offset = 0;
    let mut start = None;
    for line in stdout.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if opens_json_array(trimmed) {
            start = Some(offset + (line.len() - trimmed.len()));
            break;
        }
        offset += line.len();
    }
    let Some(start) = start else {
        return Ok(Vec::new());
    };

    let procs: Vec<Pm2Process> = serde_json::from_str(stdout[start..].trim_end())
        .map_err(|e| PodError::Supervisor(format!("unreadable pm2 process list: {}", e)))?;

    Ok(procs.into_iter().map(ProcessInstance::from).collect())
}

/// `[{...` or `[]`, as opposed to banner lines such as `[PM2] ...`
fn opens_json_array(line: &str) -> bool {
    match line.strip_prefix('[') {
        Some(rest) => {
            let rest = rest.trim_start();
            rest.is_empty() || rest.starts_with('{') || rest.starts_with(']')
        }
        None => false,
    }
}

impl From<Pm2Process> for ProcessInstance {
    fn from(p: Pm2Process) -> Self {
        let status = p.pm2_env.status.unwrap_or(ProcessStatus::Unknown);
        ProcessInstance {
            id: p.pm_id,
            pid: p.pid.filter(|pid| *pid > 0),
            name: p.name,
            script: p.pm2_env.pm_exec_path,
            status,
            uptime_start: p.pm2_env.pm_uptime.and_then(millis_to_datetime),
            restart_count: p.pm2_env.restart_time,
            cpu: p.monit.cpu,
            memory: p.monit.memory,
        }
    }
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
