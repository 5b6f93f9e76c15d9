//! Deploy script and git hook templates

use std::path::Path;

use crate::registry::config::DEFAULT_BRANCH;

const DEPLOY_SCRIPT: &str = include_str!("templates/deploy.sh");
const POST_RECEIVE: &str = include_str!("templates/post-receive");

/// Render the script run on every deploy of `app`.
///
/// A tracked branch other than `master` replaces `origin/master`.
pub fn render_deploy_script(pod_dir: &Path, app: &str, branch: &str) -> String {
    let script = DEPLOY_SCRIPT
        .replace("{{pod_dir}}", &pod_dir.to_string_lossy())
        .replace("{{app}}", app);

    if branch == DEFAULT_BRANCH {
        script
    } else {
        script.replace(
            &format!("origin/{}", DEFAULT_BRANCH),
            &format!("origin/{}", branch),
        )
    }
}

/// Render the post-receive hook installed in a local app's bare repository
pub fn render_post_receive(pod_bin: &Path, pod_conf: &Path, app: &str) -> String {
    POST_RECEIVE
        .replace("{{pod_bin}}", &pod_bin.to_string_lossy())
        .replace("{{pod_conf}}", &pod_conf.to_string_lossy())
        .replace("{{app}}", app)
}
