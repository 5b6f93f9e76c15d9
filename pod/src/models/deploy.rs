//! Deployment outcome models

use serde::{Deserialize, Serialize};

/// Result of one deploy hook run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployOutcome {
    pub app_name: String,

    /// Hook exited with status 0
    pub succeeded: bool,

    /// Work tree HEAD before the hook ran, absent for an empty repository
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_commit_hash: Option<String>,

    /// Work tree HEAD after a successful run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_commit_hash: Option<String>,

    /// Hook exit status, absent when killed by a signal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}
