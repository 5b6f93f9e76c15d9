//! Webhook payload model, normalization and deploy gating

pub mod guard;
pub mod normalize;

use std::fmt;

use axum::http::HeaderMap;
use serde::Serialize;

pub use guard::{GuardDecision, SKIP_MARKER};
pub use normalize::{decode_body, normalize, parse_local};

/// Where a push notification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    GitLab,
    Bitbucket,
    /// The post-receive hook of a local bare repository
    Local,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::GitHub => "github",
            Provider::GitLab => "gitlab",
            Provider::Bitbucket => "bitbucket",
            Provider::Local => "local",
        };
        f.write_str(name)
    }
}

/// Provider and event name taken from the request headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub provider: Provider,
    pub event: Option<String>,
}

impl Delivery {
    pub fn new(provider: Provider, event: Option<&str>) -> Self {
        Self {
            provider,
            event: event.map(str::to_string),
        }
    }

    /// Identify the sender. Requests without a provider header are read with
    /// the GitHub payload shape, which GitLab and most tools share.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        if let Some(event) = header("x-github-event") {
            Self::new(Provider::GitHub, Some(event))
        } else if let Some(event) = header("x-gitlab-event") {
            Self::new(Provider::GitLab, Some(event))
        } else if let Some(event) = header("x-event-key") {
            Self::new(Provider::Bitbucket, Some(event))
        } else {
            Self::new(Provider::GitHub, None)
        }
    }

    /// Whether the sender announced a connectivity check rather than a push
    pub fn is_ping(&self) -> bool {
        let Some(event) = self.event.as_deref() else {
            return false;
        };
        match self.provider {
            Provider::GitHub | Provider::GitLab => event.eq_ignore_ascii_case("ping"),
            Provider::Bitbucket => event == "diagnostics:ping",
            Provider::Local => false,
        }
    }
}

/// A normalized push notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushEvent {
    pub provider: Provider,
    pub repo_url: String,
    /// Branch name without the `refs/heads/` prefix
    pub branch: String,
    pub commit_message: Option<String>,
}

/// A provider's connectivity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingEvent {
    pub provider: Provider,
    pub repo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Ping(PingEvent),
    Push(PushEvent),
}
