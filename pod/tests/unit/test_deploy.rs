//! Deploy pipeline tests against real git repositories

mod support;

use std::time::Duration;

use serde_json::json;

use pod::deploy::git;
use pod::errors::PodError;
use pod::lifecycle::StartResult;
use pod::orchestrator::{Activation, DeployReport};

use support::{run_git, TestPod};

/// Developer checkout of the app's bare repository
struct Checkout {
    dir: tempfile::TempDir,
}

impl Checkout {
    fn clone_from(pod: &TestPod, app: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bare = pod.layout().bare_repo(app).path().to_string_lossy().into_owned();
        run_git(dir.path(), &["clone", &bare, "."]);
        Self { dir }
    }

    /// Commit `files` and push them to master, returning the new commit hash
    fn push(&self, message: &str, files: &[(&str, &str)]) -> String {
        for (name, contents) in files {
            std::fs::write(self.dir.path().join(name), contents).unwrap();
        }
        run_git(self.dir.path(), &["add", "-A"]);
        run_git(self.dir.path(), &["commit", "-q", "-m", message]);
        run_git(self.dir.path(), &["push", "-q", "origin", "HEAD:master"]);
        run_git(self.dir.path(), &["rev-parse", "HEAD"])
    }

    fn remove(&self, name: &str) {
        run_git(self.dir.path(), &["rm", "-q", name]);
    }
}

async fn create_local_app(pod: &TestPod, name: &str) -> Checkout {
    let steps = pod
        .orchestrator
        .create(name, json!({}).as_object().cloned().unwrap())
        .await
        .unwrap();
    assert!(steps.iter().any(|s| s.contains("bare repo")));
    assert!(pod.layout().post_receive_hook(name).exists().await);
    Checkout::clone_from(pod, name)
}

#[tokio::test]
async fn test_first_deploy_checks_out_and_starts() {
    let pod = TestPod::new().await;
    let checkout = create_local_app(&pod, "blog").await;
    let hash = checkout.push("initial", &[("app.js", "console.log('hi')\n")]);

    let report = pod.orchestrator.deploy("blog", None).await.unwrap();
    let DeployReport::Deployed { outcome, activation } = report else {
        panic!("deploy should finish without a time limit");
    };
    assert!(outcome.succeeded);
    assert_eq!(outcome.previous_commit_hash, None);
    assert_eq!(outcome.new_commit_hash.as_deref(), Some(hash.as_str()));
    assert!(matches!(
        activation,
        Activation::Started(StartResult::Started { instances: 1, .. })
    ));

    let launches = pod.supervisor.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].name, "blog");
    assert!(launches[0].script.ends_with("apps/blog/app.js"));
}

#[tokio::test]
async fn test_redeploy_restarts_running_app() {
    let pod = TestPod::new().await;
    let checkout = create_local_app(&pod, "blog").await;
    checkout.push("initial", &[("app.js", "console.log('v1')\n")]);
    pod.orchestrator.deploy("blog", None).await.unwrap();

    checkout.push("second", &[("app.js", "console.log('v2')\n")]);
    let report = pod.orchestrator.deploy("blog", None).await.unwrap();
    let DeployReport::Deployed { activation, .. } = report else {
        panic!("deploy should finish");
    };
    assert_eq!(activation, Activation::Restarted { count: 1 });
    assert_eq!(pod.supervisor.restarts().len(), 1);
    assert_eq!(pod.supervisor.launches().len(), 1);
}

#[tokio::test]
async fn test_failed_hook_rolls_back() {
    let pod = TestPod::new().await;
    let checkout = create_local_app(&pod, "blog").await;
    let good = checkout.push("initial", &[("app.js", "console.log('v1')\n")]);
    pod.orchestrator.deploy("blog", None).await.unwrap();

    let bad = checkout.push(
        "broken build",
        &[("app.js", "console.log('v2')\n"), (".podhook", "echo building\nexit 1\n")],
    );
    assert_ne!(good, bad);

    let err = pod.orchestrator.deploy("blog", None).await.unwrap_err();
    assert!(
        matches!(err, PodError::HookFailed { code: Some(1), .. }),
        "unexpected error {:?}",
        err
    );
    assert_eq!(err.exit_code(), 1);

    let work_tree = pod.layout().work_tree("blog");
    let current = git::current_commit_hash(work_tree.path()).await.unwrap();
    assert_eq!(current.as_deref(), Some(good.as_str()));
    assert!(!work_tree.path().join(".podhook").exists());
    assert!(pod.supervisor.restarts().is_empty());
    assert!(pod.layout().hooks_dir().list_names().await.unwrap().is_empty());

    // A later good push deploys normally again
    checkout.remove(".podhook");
    let fixed = checkout.push("fix build", &[("app.js", "console.log('v3')\n")]);
    pod.orchestrator.deploy("blog", None).await.unwrap();
    let current = git::current_commit_hash(work_tree.path()).await.unwrap();
    assert_eq!(current.as_deref(), Some(fixed.as_str()));
}

#[tokio::test]
async fn test_slow_hook_finishes_in_background() {
    let pod = TestPod::new().await;
    let checkout = create_local_app(&pod, "blog").await;
    let hash = checkout.push(
        "slow build",
        &[("app.js", "console.log('v1')\n"), (".podhook", "sleep 1\n")],
    );

    let report = pod
        .orchestrator
        .deploy("blog", Some(Duration::from_millis(100)))
        .await
        .unwrap();
    assert_eq!(report, DeployReport::Pending);

    // Waits on the app lock held by the background deploy
    let started = pod.orchestrator.start("blog").await.unwrap();
    assert_eq!(started, StartResult::AlreadyRunning);

    let current = git::current_commit_hash(pod.layout().work_tree("blog").path())
        .await
        .unwrap();
    assert_eq!(current.as_deref(), Some(hash.as_str()));
    assert_eq!(pod.supervisor.launches().len(), 1);
    assert!(pod.layout().hooks_dir().list_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_local_push_only_deploys_tracked_branch() {
    let pod = TestPod::new().await;
    let checkout = create_local_app(&pod, "blog").await;
    checkout.push("initial", &[("app.js", "console.log('v1')\n")]);

    let other = vec!["0000 1111 refs/heads/feature".to_string()];
    let report = pod
        .orchestrator
        .handle_local_push("blog", &other, None)
        .await
        .unwrap();
    assert!(report.is_none());
    assert!(pod.supervisor.launches().is_empty());

    let tracked = vec![
        "0000 1111 refs/heads/feature".to_string(),
        "0000 2222 refs/heads/master".to_string(),
    ];
    let report = pod
        .orchestrator
        .handle_local_push("blog", &tracked, None)
        .await
        .unwrap();
    assert!(matches!(report, Some(DeployReport::Deployed { .. })));
    assert_eq!(pod.supervisor.launches().len(), 1);
}

#[tokio::test]
async fn test_deploy_unknown_app() {
    let pod = TestPod::new().await;
    let err = pod.orchestrator.deploy("ghost", None).await.unwrap_err();
    assert!(matches!(err, PodError::NotFound(_)));
    assert!(pod.supervisor.launches().is_empty());
}

#[tokio::test]
async fn test_remove_deletes_repositories() {
    let pod = TestPod::new().await;
    let checkout = create_local_app(&pod, "blog").await;
    checkout.push("initial", &[("app.js", "console.log('v1')\n")]);
    pod.orchestrator.deploy("blog", None).await.unwrap();

    pod.orchestrator.remove("blog").await.unwrap();
    assert!(!pod.layout().work_tree("blog").exists().await);
    assert!(!pod.layout().bare_repo("blog").exists().await);
    assert!(pod.supervisor.processes().is_empty());
    assert!(pod.orchestrator.registry().get("blog").await.is_none());
}
