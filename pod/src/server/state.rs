//! Server state

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::orchestrator::Orchestrator;
use crate::registry::config::WebConfig;

/// Dashboard credentials checked by HTTP basic auth
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl From<&WebConfig> for Credentials {
    fn from(web: &WebConfig) -> Self {
        Self {
            username: web.username.clone(),
            password: SecretString::from(web.password.clone()),
        }
    }
}

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub credentials: Credentials,
    /// How long a webhook request waits for its deploy before answering
    pub hook_timeout: Duration,
}

impl ServerState {
    pub fn new(orchestrator: Arc<Orchestrator>, credentials: Credentials, hook_timeout: Duration) -> Self {
        Self {
            orchestrator,
            credentials,
            hook_timeout,
        }
    }
}
