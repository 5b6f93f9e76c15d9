//! Registry file schema and loading

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PodError;
use crate::filesys::file::File;
use crate::models::app::{expand_remote, AppDefinition};

/// Id of the built-in webhook/dashboard service
pub const WEB_SERVICE_ID: &str = "pod-web-service";

/// Branch tracked when an app does not name one
pub const DEFAULT_BRANCH: &str = "master";

/// Registry file name under the home directory
pub const DEFAULT_CONFIG_NAME: &str = ".podrc";

/// Environment variable overriding the registry file location
pub const CONFIG_PATH_ENV: &str = "POD_CONF";

/// Environment variable overriding the pod root directory
pub const ROOT_DIR_ENV: &str = "POD_ROOT_DIR";

const LEGACY_KEYS: &[(&str, &str)] = &[
    ("nodeEnv", "node_env"),
    ("defaultScript", "default_script"),
    ("fileOutput", "out_file"),
    ("fileError", "error_file"),
    ("pidFile", "pid_file"),
    ("minUptime", "min_uptime"),
    ("maxRestarts", "max_restarts"),
];

/// Dashboard and webhook server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 19999,
            username: "admin".to_string(),
            password: "admin".to_string(),
        }
    }
}

/// Contents of the registry file: global settings plus registered apps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodConfig {
    /// Directory holding `apps/`, `repos/` and `logs/`
    pub root: PathBuf,

    #[serde(default = "default_node_env")]
    pub node_env: String,

    #[serde(default = "default_script")]
    pub default_script: String,

    /// Environment passed to every app
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_uptime: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<Value>,

    #[serde(default)]
    pub web: WebConfig,

    #[serde(default)]
    pub apps: BTreeMap<String, AppDefinition>,
}

fn default_node_env() -> String {
    "development".to_string()
}

fn default_script() -> String {
    "app.js".to_string()
}

impl PodConfig {
    /// Fresh configuration rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            node_env: default_node_env(),
            default_script: default_script(),
            env: BTreeMap::new(),
            min_uptime: None,
            max_restarts: None,
            web: WebConfig::default(),
            apps: BTreeMap::new(),
        }
    }

    /// Parse a registry document, upgrading legacy keys and app entries.
    ///
    /// Returns the config and whether the document needed upgrading.
    pub fn from_value(mut value: Value) -> Result<(Self, bool), PodError> {
        let mut upgraded = upgrade_legacy_keys(&mut value);
        upgraded |= upgrade_legacy_apps(&mut value)?;

        let mut config: PodConfig = serde_json::from_value(value)?;
        for (name, app) in config.apps.iter_mut() {
            app.name.clone_from(name);
        }
        Ok((config, upgraded))
    }

    /// Load the registry file at `path`
    pub async fn load(path: &Path) -> Result<(Self, bool), PodError> {
        let file = File::new(path);
        if !file.exists().await {
            return Err(PodError::ConfigError(format!(
                "no config found at {}, run `pod init <root>` first",
                path.display()
            )));
        }
        let (mut config, upgraded) = Self::from_value(file.read_json_value().await?)?;
        if let Some(root) = std::env::var_os(ROOT_DIR_ENV) {
            config.root = PathBuf::from(root);
        }
        Ok((config, upgraded))
    }
}

/// Resolve the registry file location: explicit path, `POD_CONF`, then `~/.podrc`
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, PodError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .ok_or_else(|| {
            PodError::ConfigError("cannot locate home directory, set POD_CONF".to_string())
        })?;
    Ok(PathBuf::from(home).join(DEFAULT_CONFIG_NAME))
}

/// Rename camelCase keys at any depth
fn upgrade_legacy_keys(value: &mut Value) -> bool {
    let Value::Object(map) = value else {
        return false;
    };

    let mut changed = false;
    for (old, new) in LEGACY_KEYS {
        if let Some(v) = map.remove(*old) {
            map.insert(new.to_string(), v);
            changed = true;
        }
    }
    for child in map.values_mut() {
        changed |= upgrade_legacy_keys(child);
    }
    changed
}

/// Convert flat app option objects into `AppDefinition` documents
fn upgrade_legacy_apps(value: &mut Value) -> Result<bool, PodError> {
    let root = value
        .get("root")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| PodError::ConfigError("config has no `root` directory".to_string()))?;
    let script = value
        .get("default_script")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(default_script);

    let Some(Value::Object(apps)) = value.get_mut("apps") else {
        return Ok(false);
    };

    let mut changed = false;
    for (name, entry) in apps.iter_mut() {
        let Value::Object(options) = entry else {
            continue;
        };
        if options.contains_key("script_path") {
            continue;
        }
        let options = std::mem::take(options);
        let app = AppDefinition {
            name: name.clone(),
            script_path: root
                .join("apps")
                .join(name)
                .join(options.get("script").and_then(Value::as_str).unwrap_or(script.as_str())),
            remote: options.get("remote").and_then(Value::as_str).map(expand_remote),
            branch: options.get("branch").and_then(Value::as_str).map(str::to_string),
            config: options,
        };
        *entry = serde_json::to_value(app)?;
        changed = true;
    }
    Ok(changed)
}
