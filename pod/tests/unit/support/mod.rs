//! Shared test fixtures

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use pod::app::options::DeployOptions;
use pod::errors::PodError;
use pod::models::process::{LaunchDescriptor, ProcessInstance, ProcessStatus};
use pod::orchestrator::Orchestrator;
use pod::registry::{RegistryStore, StorageLayout};
use pod::supervisor::Supervisor;

#[derive(Default)]
struct FakeState {
    processes: Vec<ProcessInstance>,
    next_id: u64,
    launches: Vec<LaunchDescriptor>,
    stops: Vec<u64>,
    restarts: Vec<u64>,
    unavailable: bool,
}

/// In-memory supervisor recording every call
#[derive(Default)]
pub struct FakeSupervisor {
    state: Mutex<FakeState>,
}

impl FakeSupervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Add a process as if another tool had started it
    pub fn insert(&self, name: &str, script: &Path, status: ProcessStatus) -> u64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.processes.push(process(id, name, script, status));
        id
    }

    pub fn set_status(&self, id: u64, status: ProcessStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(p) = state.processes.iter_mut().find(|p| p.id == id) {
            p.status = status;
        }
    }

    pub fn processes(&self) -> Vec<ProcessInstance> {
        self.state.lock().unwrap().processes.clone()
    }

    pub fn launches(&self) -> Vec<LaunchDescriptor> {
        self.state.lock().unwrap().launches.clone()
    }

    pub fn stops(&self) -> Vec<u64> {
        self.state.lock().unwrap().stops.clone()
    }

    pub fn restarts(&self) -> Vec<u64> {
        self.state.lock().unwrap().restarts.clone()
    }

    fn check(&self) -> Result<(), PodError> {
        if self.state.lock().unwrap().unavailable {
            return Err(PodError::SupervisorUnavailable("fake supervisor is down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Supervisor for FakeSupervisor {
    async fn list(&self) -> Result<Vec<ProcessInstance>, PodError> {
        self.check()?;
        Ok(self.processes())
    }

    async fn launch(&self, descriptor: &LaunchDescriptor) -> Result<(), PodError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        for _ in 0..descriptor.instances {
            let id = state.next_id;
            state.next_id += 1;
            state.processes.push(process(
                id,
                &descriptor.name,
                &descriptor.script,
                ProcessStatus::Online,
            ));
        }
        state.launches.push(descriptor.clone());
        Ok(())
    }

    async fn stop_instance(&self, id: u64) -> Result<(), PodError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.processes.retain(|p| p.id != id);
        state.stops.push(id);
        Ok(())
    }

    async fn restart_instance(&self, id: u64) -> Result<(), PodError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        if let Some(p) = state.processes.iter_mut().find(|p| p.id == id) {
            p.status = ProcessStatus::Online;
            p.restart_count += 1;
            p.uptime_start = Some(Utc::now());
        }
        state.restarts.push(id);
        Ok(())
    }
}

fn process(id: u64, name: &str, script: &Path, status: ProcessStatus) -> ProcessInstance {
    ProcessInstance {
        id,
        pid: Some(4000 + id as u32),
        name: name.to_string(),
        script: Some(script.to_path_buf()),
        status,
        uptime_start: Some(Utc::now()),
        restart_count: 0,
        cpu: 0.5,
        memory: 2 * 1024 * 1024,
    }
}

/// A pod root in a temp dir wired to a [`FakeSupervisor`]
pub struct TestPod {
    pub dir: TempDir,
    pub supervisor: Arc<FakeSupervisor>,
    pub orchestrator: Arc<Orchestrator>,
}

impl TestPod {
    pub async fn new() -> Self {
        Self::with_timeout(Duration::from_secs(10)).await
    }

    pub async fn with_timeout(webhook_timeout: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let registry = RegistryStore::init(dir.path().join("podrc"), dir.path().join("pod"))
            .await
            .unwrap();
        let supervisor = FakeSupervisor::new();
        let options = DeployOptions {
            webhook_timeout,
            cli_timeout: None,
            shell: "bash".to_string(),
            pod_bin: PathBuf::from("true"),
        };
        let orchestrator = Orchestrator::new(Arc::new(registry), supervisor.clone(), options).await;
        Self {
            dir,
            supervisor,
            orchestrator,
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        self.orchestrator.layout()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("podrc")
    }

    /// Register `name` without touching git, with an entry script in place
    pub async fn register_with_script(&self, name: &str, options: serde_json::Value) -> PathBuf {
        let options = options.as_object().cloned().unwrap_or_default();
        let app = self.orchestrator.registry().create(name, options).await.unwrap();
        let work_tree = self.layout().work_tree(name);
        work_tree.create().await.unwrap();
        if !app.is_remote() {
            self.layout().bare_repo(name).create().await.unwrap();
        }
        std::fs::write(&app.script_path, "require('http').createServer().listen(3000)\n").unwrap();
        app.script_path
    }
}

/// Run git in `dir` with a fixed identity, returning trimmed stdout
pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .env("GIT_AUTHOR_NAME", "Pod Test")
        .env("GIT_AUTHOR_EMAIL", "pod@example.com")
        .env("GIT_COMMITTER_NAME", "Pod Test")
        .env("GIT_COMMITTER_EMAIL", "pod@example.com")
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
