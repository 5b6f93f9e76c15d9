//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

/// Webhook/dashboard HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 19999,
        }
    }
}

/// Deploy pipeline options
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// How long a webhook request waits for the deploy hook before answering
    pub webhook_timeout: Duration,

    /// Time limit for deploys started from the command line, unbounded when `None`
    pub cli_timeout: Option<Duration>,

    /// Shell used to run rendered deploy scripts
    pub shell: String,

    /// Binary invoked by installed post-receive hooks
    pub pod_bin: PathBuf,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            webhook_timeout: Duration::from_secs(3),
            cli_timeout: None,
            shell: "bash".to_string(),
            pod_bin: std::env::current_exe().unwrap_or_else(|_| PathBuf::from("pod")),
        }
    }
}
