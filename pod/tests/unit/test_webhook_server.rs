//! Webhook and dashboard HTTP tests

mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tower::ServiceExt;

use pod::deploy::git;
use pod::registry::config::WebConfig;
use pod::server::{build_router, Credentials, ServerState};

use support::{run_git, TestPod};

fn router(pod: &TestPod) -> Router {
    let state = ServerState::new(
        pod.orchestrator.clone(),
        Credentials::from(&WebConfig::default()),
        pod.orchestrator.options().webhook_timeout,
    );
    build_router(Arc::new(state))
}

fn hook_request(app: &str, event: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/hooks/{}", app))
        .header("x-github-event", event)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register_remote(pod: &TestPod, name: &str, remote: &str) {
    pod.orchestrator
        .registry()
        .create(name, json!({ "remote": remote }).as_object().cloned().unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health() {
    let pod = TestPod::new().await;
    let response = router(&pod)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "pod");
}

#[tokio::test]
async fn test_ping_from_matching_repository() {
    let pod = TestPod::new().await;
    register_remote(&pod, "site", "acme/site").await;

    let payload = json!({ "zen": "hi", "repository": { "html_url": "https://github.com/acme/site" } });
    let response = router(&pod)
        .oneshot(hook_request("site", "ping", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ping_from_other_repository() {
    let pod = TestPod::new().await;
    register_remote(&pod, "site", "acme/site").await;

    let payload = json!({ "repository": { "html_url": "https://github.com/acme/other" } });
    let response = router(&pod)
        .oneshot(hook_request("site", "ping", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_ping_for_unknown_app() {
    let pod = TestPod::new().await;
    let payload = json!({ "repository": { "html_url": "https://github.com/acme/site" } });
    let response = router(&pod)
        .oneshot(hook_request("ghost", "ping", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_declined_push_answers_ok() {
    let pod = TestPod::new().await;
    register_remote(&pod, "site", "acme/site").await;

    let payload = json!({
        "ref": "refs/heads/master",
        "repository": { "url": "https://github.com/acme/other" },
        "head_commit": { "message": "unrelated" },
    });
    let response = router(&pod)
        .oneshot(hook_request("site", "push", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(pod.supervisor.launches().is_empty());
}

#[tokio::test]
async fn test_malformed_push_answers_ok() {
    let pod = TestPod::new().await;
    register_remote(&pod, "site", "acme/site").await;

    let request = Request::builder()
        .method("POST")
        .uri("/hooks/site")
        .header("x-github-event", "push")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = router(&pod).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(pod.supervisor.launches().is_empty());
}

#[tokio::test]
async fn test_push_deploys_remote_app() {
    let pod = TestPod::new().await;

    // Upstream repository with one commit
    let upstream = tempfile::tempdir().unwrap();
    run_git(
        upstream.path(),
        &["-c", "init.defaultBranch=master", "init", "-q", "--bare", "site.git"],
    );
    let upstream_url = upstream.path().join("site.git").to_string_lossy().to_string();
    let dev = tempfile::tempdir().unwrap();
    run_git(dev.path(), &["clone", "-q", &upstream_url, "."]);
    std::fs::write(dev.path().join("app.js"), "console.log('v1')\n").unwrap();
    run_git(dev.path(), &["add", "-A"]);
    run_git(dev.path(), &["commit", "-q", "-m", "initial"]);
    run_git(dev.path(), &["push", "-q", "origin", "HEAD:master"]);

    let options = json!({ "remote": upstream_url }).as_object().cloned().unwrap();
    pod.orchestrator.create("site", options).await.unwrap();

    std::fs::write(dev.path().join("app.js"), "console.log('v2')\n").unwrap();
    run_git(dev.path(), &["commit", "-q", "-am", "second"]);
    run_git(dev.path(), &["push", "-q", "origin", "HEAD:master"]);
    let head = run_git(dev.path(), &["rev-parse", "HEAD"]);

    let payload = json!({
        "ref": "refs/heads/master",
        "repository": { "url": upstream_url },
        "head_commit": { "message": "second" },
    });
    let response = router(&pod)
        .oneshot(hook_request("site", "push", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The handler waits for the deploy when it finishes within the webhook timeout
    let current = git::current_commit_hash(pod.layout().work_tree("site").path())
        .await
        .unwrap();
    assert_eq!(current.as_deref(), Some(head.as_str()));
    assert_eq!(pod.supervisor.launches().len(), 1);
}

#[tokio::test]
async fn test_push_for_app_registered_later_is_found() {
    let pod = TestPod::new().await;
    let app = router(&pod);

    // Another process registers the app after the server loaded the registry
    let other = pod::registry::RegistryStore::open(pod.config_path()).await.unwrap();
    other
        .create("site", json!({ "remote": "acme/site" }).as_object().cloned().unwrap())
        .await
        .unwrap();

    let payload = json!({ "repository": { "html_url": "https://github.com/acme/site" } });
    let response = app.oneshot(hook_request("site", "ping", &payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_dashboard_requires_credentials() {
    let pod = TestPod::new().await;
    pod.register_with_script("blog", json!({ "port": 8080 })).await;

    let response = router(&pod)
        .oneshot(Request::get("/json").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let wrong = format!("Basic {}", STANDARD.encode("admin:nope"));
    let response = router(&pod)
        .oneshot(
            Request::get("/json")
                .header(header::AUTHORIZATION, wrong)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let auth = format!("Basic {}", STANDARD.encode("admin:admin"));
    let response = router(&pod)
        .oneshot(
            Request::get("/json")
                .header(header::AUTHORIZATION, auth)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body[0]["name"], "blog");
    assert_eq!(body[0]["status"], "STOPPED");
    assert_eq!(body[0]["port"], 8080);
}
