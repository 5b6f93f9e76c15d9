//! Turn provider specific webhook payloads into [`WebhookEvent`]s

use serde_json::{Map, Value};

use crate::errors::PodError;
use crate::webhook::{Delivery, PingEvent, Provider, PushEvent, WebhookEvent};

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Decode a request body into JSON.
///
/// Form encoded bodies carry the JSON document in a `payload` field (GitHub's
/// "form" content type). Without that field, bracketed keys such as
/// `repository[url]` are folded into nested objects.
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> Result<Value, PodError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(PodError::MalformedPayload("empty request body".to_string()));
    }

    let is_form = content_type
        .map(|ct| ct.trim().starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if !is_form {
        return serde_json::from_slice(body)
            .map_err(|e| PodError::MalformedPayload(format!("invalid JSON: {}", e)));
    }

    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(body).into_owned().collect();
    if let Some((_, payload)) = pairs.iter().find(|(k, _)| k == "payload") {
        return serde_json::from_str(payload)
            .map_err(|e| PodError::MalformedPayload(format!("invalid JSON in payload field: {}", e)));
    }

    let mut root = Map::new();
    for (key, value) in pairs {
        insert_nested(&mut root, &key, Value::String(value));
    }
    Ok(Value::Object(root))
}

fn insert_nested(root: &mut Map<String, Value>, key: &str, value: Value) {
    let (head, rest) = match key.find('[') {
        Some(i) => (&key[..i], &key[i..]),
        None => (key, ""),
    };
    let mut path = vec![head.to_string()];
    path.extend(
        rest.split('[')
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches(']').to_string()),
    );

    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = root;
    for segment in parents {
        let slot = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
    current.insert(last.clone(), value);
}

/// Normalize a decoded payload according to the delivery headers
pub fn normalize(payload: &Value, delivery: &Delivery) -> Result<WebhookEvent, PodError> {
    if !payload.is_object() {
        return Err(PodError::MalformedPayload(
            "payload is not a JSON object".to_string(),
        ));
    }

    if delivery.is_ping() || is_system_hook_check(payload, delivery) {
        return Ok(WebhookEvent::Ping(PingEvent {
            provider: delivery.provider,
            repo_url: ping_repo_url(payload, delivery.provider),
        }));
    }

    let push = match delivery.provider {
        Provider::GitHub | Provider::GitLab => parse_github(payload, delivery.provider)?,
        Provider::Bitbucket => parse_bitbucket(payload)?,
        Provider::Local => {
            return Err(PodError::UnsupportedProvider(
                "local pushes arrive as post-receive lines".to_string(),
            ))
        }
    };
    Ok(WebhookEvent::Push(push))
}

/// GitLab sends every system event as `System Hook`. Pushes carry a ref,
/// anything else (such as the settings page test) is treated as a ping.
fn is_system_hook_check(payload: &Value, delivery: &Delivery) -> bool {
    delivery.provider == Provider::GitLab
        && delivery
            .event
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case("system hook"))
        && payload.get("ref").is_none()
}

/// GitHub push payloads, also used for GitLab and header-less senders
fn parse_github(payload: &Value, provider: Provider) -> Result<PushEvent, PodError> {
    let git_ref = str_at(payload, &["ref"]).ok_or_else(|| {
        PodError::UnsupportedProvider(format!("{} payload without a ref", provider))
    })?;

    let repo_url = str_at(payload, &["repository", "url"])
        .or_else(|| str_at(payload, &["repository", "git_http_url"]))
        .or_else(|| str_at(payload, &["repository", "homepage"]))
        .or_else(|| str_at(payload, &["repository", "html_url"]))
        .ok_or_else(|| PodError::MalformedPayload("missing repository url".to_string()))?;

    let commit_message = payload
        .pointer("/head_commit/message")
        .and_then(Value::as_str)
        .or_else(|| {
            payload
                .get("commits")
                .and_then(Value::as_array)
                .and_then(|commits| commits.last())
                .and_then(|c| c.get("message"))
                .and_then(Value::as_str)
        });

    Ok(PushEvent {
        provider,
        repo_url: repo_url.to_string(),
        branch: branch_name(git_ref).to_string(),
        commit_message: commit_message.map(str::to_string),
    })
}

fn parse_bitbucket(payload: &Value) -> Result<PushEvent, PodError> {
    let change = payload
        .pointer("/push/changes/0/new")
        .filter(|v| v.is_object())
        .ok_or_else(|| {
            PodError::UnsupportedProvider("bitbucket payload without a pushed branch".to_string())
        })?;

    let repo_url = bitbucket_repo_url(payload)
        .ok_or_else(|| PodError::MalformedPayload("missing repository link".to_string()))?;
    let branch = change
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| PodError::MalformedPayload("pushed change has no name".to_string()))?;

    Ok(PushEvent {
        provider: Provider::Bitbucket,
        repo_url,
        branch: branch.to_string(),
        commit_message: change
            .pointer("/target/message")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn bitbucket_repo_url(payload: &Value) -> Option<String> {
    str_at(payload, &["repository", "links", "html", "href"])
        .map(str::to_string)
        .or_else(|| {
            str_at(payload, &["repository", "full_name"])
                .map(|name| format!("https://bitbucket.org/{}", name))
        })
}

fn ping_repo_url(payload: &Value, provider: Provider) -> Option<String> {
    match provider {
        Provider::Bitbucket => bitbucket_repo_url(payload),
        _ => str_at(payload, &["repository", "html_url"])
            .or_else(|| str_at(payload, &["repository", "url"]))
            .or_else(|| str_at(payload, &["project", "web_url"]))
            .map(str::to_string),
    }
}

/// Parse one post-receive stdin line: `<old-sha> <new-sha> <ref>`
pub fn parse_local(line: &str, repo_url: &str) -> Result<PushEvent, PodError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let [_old, _new, git_ref] = parts.as_slice() else {
        return Err(PodError::MalformedPayload(format!(
            "expected `<old> <new> <ref>`, got {:?}",
            line
        )));
    };

    Ok(PushEvent {
        provider: Provider::Local,
        repo_url: repo_url.to_string(),
        branch: branch_name(git_ref).to_string(),
        commit_message: None,
    })
}

fn branch_name(git_ref: &str) -> &str {
    git_ref.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(git_ref)
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
