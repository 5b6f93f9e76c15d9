//! Process supervisor boundary

pub mod pm2;

use std::path::Path;

use async_trait::async_trait;

use crate::errors::PodError;
use crate::models::process::{LaunchDescriptor, ProcessInstance};

pub use pm2::Pm2Supervisor;

/// An external process manager that owns the running app processes
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Every process the supervisor knows about, in any state
    async fn list(&self) -> Result<Vec<ProcessInstance>, PodError>;

    /// Processes executing `script`
    async fn find_by_script(&self, script: &Path) -> Result<Vec<ProcessInstance>, PodError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.runs_script(script))
            .collect())
    }

    /// Start new processes for an app
    async fn launch(&self, descriptor: &LaunchDescriptor) -> Result<(), PodError>;

    /// Stop a process and remove it from the supervisor's list
    async fn stop_instance(&self, id: u64) -> Result<(), PodError>;

    /// Restart a process, reviving it when stopped or errored
    async fn restart_instance(&self, id: u64) -> Result<(), PodError>;
}
