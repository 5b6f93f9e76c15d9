//! Webhook normalization and deploy gate tests

use std::path::PathBuf;

use serde_json::json;

use pod::errors::PodError;
use pod::models::app::{expand_remote, AppDefinition, AppOptions};
use pod::webhook::guard::{evaluate, ping_matches};
use pod::webhook::{
    decode_body, normalize, parse_local, Delivery, GuardDecision, Provider, WebhookEvent,
};

fn remote_app(remote: &str, branch: Option<&str>) -> AppDefinition {
    AppDefinition {
        name: "test".to_string(),
        script_path: PathBuf::from("/srv/pod/apps/test/app.js"),
        remote: Some(expand_remote(remote)),
        branch: branch.map(str::to_string),
        config: AppOptions::new(),
    }
}

fn github_push(repo_url: &str, git_ref: &str, message: &str) -> WebhookEvent {
    let payload = json!({
        "ref": git_ref,
        "repository": { "url": repo_url },
        "head_commit": { "message": message },
    });
    normalize(&payload, &Delivery::new(Provider::GitHub, Some("push"))).unwrap()
}

fn push_of(event: WebhookEvent) -> pod::webhook::PushEvent {
    match event {
        WebhookEvent::Push(push) => push,
        other => panic!("expected a push, got {:?}", other),
    }
}

#[test]
fn test_matching_push_deploys() {
    let app = remote_app("https://github.com/acme/test.git", None);
    let push = push_of(github_push(
        "https://github.com/acme/test",
        "refs/heads/master",
        "fix typo",
    ));
    assert_eq!(evaluate(&push, &app), GuardDecision::Deploy);
}

#[test]
fn test_repository_mismatch_declines() {
    let app = remote_app("acme/test", None);
    let push = push_of(github_push(
        "https://github.com/acme/other",
        "refs/heads/master",
        "fix typo",
    ));
    assert!(matches!(
        evaluate(&push, &app),
        GuardDecision::RepoMismatch { .. }
    ));
}

#[test]
fn test_same_path_on_other_host_declines() {
    let app = remote_app("https://github.com/acme/test.git", None);
    let push = push_of(github_push(
        "https://gitlab.com/acme/test",
        "refs/heads/master",
        "fix typo",
    ));
    assert_eq!(
        evaluate(&push, &app),
        GuardDecision::RepoMismatch {
            expected: "github.com/acme/test".to_string(),
            received: "gitlab.com/acme/test".to_string(),
        }
    );

    let scp = remote_app("git@github.com:acme/test.git", None);
    let push = push_of(github_push(
        "https://github.com/acme/test",
        "refs/heads/master",
        "fix typo",
    ));
    assert_eq!(evaluate(&push, &scp), GuardDecision::Deploy);
}

#[test]
fn test_skip_marker_declines() {
    let app = remote_app("https://github.com/acme/test.git", None);
    let push = push_of(github_push(
        "https://github.com/acme/test",
        "refs/heads/master",
        "docs only [pod skip]",
    ));
    assert_eq!(evaluate(&push, &app), GuardDecision::Skipped);
}

#[test]
fn test_branch_gate() {
    let app = remote_app("https://github.com/acme/test.git", None);
    let push = push_of(github_push(
        "https://github.com/acme/test",
        "refs/heads/feature",
        "wip",
    ));
    assert_eq!(
        evaluate(&push, &app),
        GuardDecision::BranchMismatch {
            expected: "master".to_string(),
            received: "feature".to_string(),
        }
    );

    let tracking = remote_app("https://github.com/acme/test.git", Some("feature"));
    assert_eq!(evaluate(&push, &tracking), GuardDecision::Deploy);
}

#[test]
fn test_local_app_ignores_webhooks() {
    let mut app = remote_app("acme/test", None);
    app.remote = None;
    let push = push_of(github_push(
        "https://github.com/acme/test",
        "refs/heads/master",
        "fix",
    ));
    assert_eq!(evaluate(&push, &app), GuardDecision::NotRemote);
}

#[test]
fn test_gitlab_push_uses_github_shape() {
    let payload = json!({
        "object_kind": "push",
        "ref": "refs/heads/master",
        "repository": {
            "git_http_url": "https://gitlab.com/acme/test.git",
            "homepage": "https://gitlab.com/acme/test",
        },
        "commits": [
            { "message": "first" },
            { "message": "second [pod skip]" },
        ],
    });
    let event = normalize(&payload, &Delivery::new(Provider::GitLab, Some("Push Hook"))).unwrap();
    let push = push_of(event);
    assert_eq!(push.provider, Provider::GitLab);
    assert_eq!(push.branch, "master");
    assert_eq!(push.commit_message.as_deref(), Some("second [pod skip]"));

    let app = remote_app("https://gitlab.com/acme/test", None);
    assert_eq!(evaluate(&push, &app), GuardDecision::Skipped);
}

#[test]
fn test_gitlab_system_hook_without_ref_is_ping() {
    let payload = json!({
        "event_name": "project_create",
        "project": { "web_url": "https://gitlab.com/acme/test" },
    });
    let delivery = Delivery::new(Provider::GitLab, Some("System Hook"));
    let WebhookEvent::Ping(ping) = normalize(&payload, &delivery).unwrap() else {
        panic!("expected a ping");
    };
    assert_eq!(ping.repo_url.as_deref(), Some("https://gitlab.com/acme/test"));
    assert!(ping_matches(&ping, &remote_app("https://gitlab.com/acme/test.git", None)));

    let push = json!({
        "event_name": "push",
        "ref": "refs/heads/master",
        "repository": { "url": "https://gitlab.com/acme/test.git" },
        "commits": [{ "message": "release" }],
    });
    let push = push_of(normalize(&push, &delivery).unwrap());
    assert_eq!(push.branch, "master");
}

#[test]
fn test_bitbucket_push() {
    let payload = json!({
        "repository": {
            "full_name": "acme/test",
            "links": { "html": { "href": "https://bitbucket.org/acme/test" } },
        },
        "push": {
            "changes": [{
                "new": {
                    "type": "branch",
                    "name": "master",
                    "target": { "message": "release" },
                },
            }],
        },
    });
    let event = normalize(
        &payload,
        &Delivery::new(Provider::Bitbucket, Some("repo:push")),
    )
    .unwrap();
    let push = push_of(event);
    assert_eq!(push.repo_url, "https://bitbucket.org/acme/test");
    assert_eq!(push.commit_message.as_deref(), Some("release"));

    let app = remote_app("git@bitbucket.org:acme/test.git", None);
    assert_eq!(evaluate(&push, &app), GuardDecision::Deploy);
}

#[test]
fn test_bitbucket_branch_deletion_is_unsupported() {
    let payload = json!({
        "repository": { "full_name": "acme/test" },
        "push": { "changes": [{ "new": null }] },
    });
    let err = normalize(
        &payload,
        &Delivery::new(Provider::Bitbucket, Some("repo:push")),
    )
    .unwrap_err();
    assert!(matches!(err, PodError::UnsupportedProvider(_)));
}

#[test]
fn test_ping_matches_remote() {
    let payload = json!({
        "zen": "Keep it logically awesome.",
        "repository": { "html_url": "https://github.com/acme/test" },
    });
    let event = normalize(&payload, &Delivery::new(Provider::GitHub, Some("ping"))).unwrap();
    let WebhookEvent::Ping(ping) = event else {
        panic!("expected a ping");
    };

    assert!(ping_matches(&ping, &remote_app("acme/test", None)));
    assert!(!ping_matches(&ping, &remote_app("acme/other", None)));
    assert!(!ping_matches(
        &ping,
        &remote_app("https://gitlab.com/acme/test.git", None)
    ));
}

#[test]
fn test_form_encoded_payload_field() {
    let body = format!(
        "payload={}",
        url::form_urlencoded::byte_serialize(
            br#"{"ref":"refs/heads/master","repository":{"url":"https://github.com/acme/test"}}"#
        )
        .collect::<String>()
    );
    let payload = decode_body(body.as_bytes(), Some("application/x-www-form-urlencoded")).unwrap();
    let push = push_of(normalize(&payload, &Delivery::new(Provider::GitHub, Some("push"))).unwrap());
    assert_eq!(push.repo_url, "https://github.com/acme/test");
    assert_eq!(push.branch, "master");
}

#[test]
fn test_form_encoded_bracket_keys() {
    let body = b"ref=refs%2Fheads%2Fmaster&repository%5Burl%5D=https%3A%2F%2Fgithub.com%2Facme%2Ftest";
    let payload = decode_body(body, Some("application/x-www-form-urlencoded")).unwrap();
    assert_eq!(payload["repository"]["url"], "https://github.com/acme/test");
}

#[test]
fn test_malformed_bodies() {
    assert!(matches!(
        decode_body(b"", Some("application/json")),
        Err(PodError::MalformedPayload(_))
    ));
    assert!(matches!(
        decode_body(b"{not json", None),
        Err(PodError::MalformedPayload(_))
    ));

    let err = normalize(&json!([1, 2]), &Delivery::new(Provider::GitHub, Some("push"))).unwrap_err();
    assert!(matches!(err, PodError::MalformedPayload(_)));

    let err = normalize(
        &json!({ "ref": "refs/heads/master" }),
        &Delivery::new(Provider::GitHub, Some("push")),
    )
    .unwrap_err();
    assert!(matches!(err, PodError::MalformedPayload(_)));
}

#[test]
fn test_parse_local_line() {
    let push = parse_local(
        "0000000000000000000000000000000000000000 1f2e3d refs/heads/master",
        "/srv/pod/repos/test.git",
    )
    .unwrap();
    assert_eq!(push.provider, Provider::Local);
    assert_eq!(push.branch, "master");

    assert!(parse_local("garbage", "/srv/pod/repos/test.git").is_err());
}
