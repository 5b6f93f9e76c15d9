//! Registered application model

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PodError;
use crate::registry::config::DEFAULT_BRANCH;

/// Free-form per-app options, stored exactly as given at creation
pub type AppOptions = serde_json::Map<String, Value>;

/// An application registered with pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDefinition {
    /// Unique app name, also the registry key
    pub name: String,

    /// Absolute path of the entry script inside the work tree
    pub script_path: PathBuf,

    /// Upstream repository for webhook driven apps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,

    /// Tracked branch, `master` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Options given at creation
    #[serde(default)]
    pub config: AppOptions,
}

impl AppDefinition {
    /// Tracked branch name
    pub fn branch(&self) -> &str {
        self.branch.as_deref().unwrap_or(DEFAULT_BRANCH)
    }

    /// Whether the app follows an upstream remote instead of a local bare repo
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Port configured through the `port` option
    pub fn port(&self) -> Option<u16> {
        match self.config.get("port")? {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Number of supervisor instances to launch
    pub fn instances(&self) -> u32 {
        match self.config.get("instances") {
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(1),
            Some(Value::String(s)) => s.trim().parse().ok().filter(|n| *n > 0).unwrap_or(1),
            _ => 1,
        }
    }

    /// String valued option
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// Expand `user/repo` shorthand into a GitHub HTTPS URL
pub fn expand_remote(remote: &str) -> String {
    let remote = remote.trim();
    let is_shorthand = !remote.contains(':')
        && !remote.starts_with('/')
        && !remote.starts_with('.')
        && remote.split('/').count() == 2
        && remote.split('/').all(|part| !part.is_empty());

    if is_shorthand {
        format!("https://github.com/{}.git", remote.trim_end_matches(".git"))
    } else {
        remote.to_string()
    }
}

/// Reject names that cannot be used as a directory name under the pod root
pub fn validate_name(name: &str) -> Result<(), PodError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(PodError::InvalidName(name.to_string()))
    }
}

/// Find a literal port in `.listen(...)` calls of a script.
///
/// Handles both `.listen(8080)` and `.listen(port)` with a `port = 8080`
/// assignment elsewhere in the source.
pub fn sniff_port(source: &str) -> Option<u16> {
    for call in source.split(".listen(").skip(1) {
        let args = call.split(')').next().unwrap_or_default();
        if let Some(port) = first_port_literal(args) {
            return Some(port);
        }

        let ident: String = args
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic() || *c == '_' || *c == '$')
            .collect();
        if ident.is_empty() {
            continue;
        }
        for assignment in source.split(ident.as_str()).skip(1) {
            let rest = assignment.trim_start();
            if let Some(value) = rest.strip_prefix('=') {
                if value.starts_with('=') {
                    continue;
                }
                let line = value.lines().next().unwrap_or_default();
                if let Some(port) = first_port_literal(line) {
                    return Some(port);
                }
            }
        }
    }
    None
}

/// First run of 4 or 5 digits in `text`
fn first_port_literal(text: &str) -> Option<u16> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|digits| digits.len() == 4 || digits.len() == 5)
        .find_map(|digits| digits.parse().ok())
}
