//! Decide whether a push should redeploy an app

use std::fmt;

use tracing::info;
use url::Url;

use crate::models::app::AppDefinition;
use crate::webhook::{PingEvent, PushEvent};

/// Commit message marker that suppresses a deploy
pub const SKIP_MARKER: &str = "[pod skip]";

/// Outcome of the deploy gates, in evaluation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Deploy,
    /// The app has no remote, so webhooks do not apply to it
    NotRemote,
    RepoMismatch { expected: String, received: String },
    /// The head commit asked to be skipped
    Skipped,
    BranchMismatch { expected: String, received: String },
}

impl GuardDecision {
    pub fn is_deploy(&self) -> bool {
        matches!(self, GuardDecision::Deploy)
    }
}

impl fmt::Display for GuardDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardDecision::Deploy => write!(f, "deploy"),
            GuardDecision::NotRemote => write!(f, "app has no remote"),
            GuardDecision::RepoMismatch { expected, received } => {
                write!(f, "repository {} does not match {}", received, expected)
            }
            GuardDecision::Skipped => write!(f, "commit message contains {}", SKIP_MARKER),
            GuardDecision::BranchMismatch { expected, received } => {
                write!(f, "branch {} is not the tracked branch {}", received, expected)
            }
        }
    }
}

/// Reduce a repository URL to a `host/path` key so that HTTPS, git, SSH and
/// scp-like forms of one repository compare equal while the same path on
/// another host does not.
///
/// `https://github.com/acme/test.git`, `git@github.com:acme/test` and
/// `ssh://git@github.com:22/acme/test/` all become `github.com/acme/test`.
/// Local paths keep their leading slash.
pub fn canonical_repo_url(url: &str) -> String {
    let url = url.trim();

    let key = if url.contains("://") {
        match Url::parse(url) {
            Ok(parsed) => {
                let path = parsed.path().trim_start_matches('/');
                match parsed.host_str().filter(|h| !h.is_empty()) {
                    Some(host) => format!("{}/{}", host.to_ascii_lowercase(), path),
                    // file:///path has no host
                    None => format!("/{}", path),
                }
            }
            Err(_) => url.to_string(),
        }
    } else if let Some((host, path)) = scp_parts(url) {
        format!("{}/{}", host.to_ascii_lowercase(), path)
    } else {
        url.to_string()
    };

    let key = key.trim_end_matches('/');
    let key = key.strip_suffix(".git").unwrap_or(key);
    key.trim_end_matches('/').to_string()
}

/// Host and path of `user@host:path` / `host:path`
fn scp_parts(url: &str) -> Option<(&str, &str)> {
    let colon = url.find(':')?;
    let slash = url.find('/');
    if slash.is_some_and(|s| s < colon) || colon == 0 {
        return None;
    }
    let authority = &url[..colon];
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    Some((host, url[colon + 1..].trim_start_matches('/')))
}

/// Evaluate the deploy gates for `push` against `app`
pub fn evaluate(push: &PushEvent, app: &AppDefinition) -> GuardDecision {
    let Some(remote) = app.remote.as_deref() else {
        return GuardDecision::NotRemote;
    };

    let expected = canonical_repo_url(remote);
    let received = canonical_repo_url(&push.repo_url);
    if expected != received {
        return GuardDecision::RepoMismatch { expected, received };
    }

    if push
        .commit_message
        .as_deref()
        .is_some_and(|m| m.contains(SKIP_MARKER))
    {
        return GuardDecision::Skipped;
    }

    let received = push
        .branch
        .strip_prefix("refs/heads/")
        .unwrap_or(&push.branch);
    if received != app.branch() {
        return GuardDecision::BranchMismatch {
            expected: app.branch().to_string(),
            received: received.to_string(),
        };
    }

    GuardDecision::Deploy
}

/// Whether `push` should redeploy `app`, logging the gate that declined it
pub fn should_deploy(push: &PushEvent, app: &AppDefinition) -> bool {
    let decision = evaluate(push, app);
    if !decision.is_deploy() {
        info!(
            app = %app.name,
            provider = %push.provider,
            "Ignoring push: {}",
            decision
        );
    }
    decision.is_deploy()
}

/// Whether a ping's repository is the app's remote
pub fn ping_matches(ping: &PingEvent, app: &AppDefinition) -> bool {
    match (app.remote.as_deref(), ping.repo_url.as_deref()) {
        (Some(remote), Some(url)) => canonical_repo_url(remote) == canonical_repo_url(url),
        _ => false,
    }
}
