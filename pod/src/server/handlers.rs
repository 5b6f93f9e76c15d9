//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::errors::PodError;
use crate::orchestrator::DeployReport;
use crate::server::state::ServerState;
use crate::utils::version_info;
use crate::webhook::{decode_body, normalize, Delivery, WebhookEvent};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "pod".to_string(),
        version: version_info().version,
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
}

/// App listing for the dashboard
pub async fn apps_json_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    state.orchestrator.list().await.map(Json).map_err(|e| {
        error!("Failed to list apps: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                code: e.code().to_string(),
                error: e.to_string(),
            }),
        )
    })
}

/// Webhook endpoint.
///
/// Pings answer 200 when their repository is the app's remote and 500
/// otherwise. Pushes always answer an empty 200; what happened to them is
/// only logged.
pub async fn hook_handler(
    State(state): State<Arc<ServerState>>,
    Path(app_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let delivery = Delivery::from_headers(&headers);
    let declined = if delivery.is_ping() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let event = match decode_body(&body, content_type).and_then(|p| normalize(&p, &delivery)) {
        Ok(event) => event,
        Err(e) => {
            warn!(app = %app_id, provider = %delivery.provider, "Unusable webhook: {}", e);
            return declined;
        }
    };

    if let Err(e) = ensure_known(&state, &app_id).await {
        warn!(app = %app_id, "Webhook for unknown app: {}", e);
        return declined;
    }

    match event {
        WebhookEvent::Ping(ping) => match state.orchestrator.ping_matches(&app_id, &ping).await {
            Ok(true) => {
                info!(app = %app_id, "Webhook ping accepted");
                StatusCode::OK
            }
            Ok(false) => {
                warn!(app = %app_id, "Webhook ping from {:?} does not match the remote", ping.repo_url);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Err(e) => {
                warn!(app = %app_id, "Webhook ping failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        WebhookEvent::Push(push) => {
            let orchestrator = state.orchestrator.clone();
            let timeout = state.hook_timeout;
            let name = app_id.clone();
            // Runs detached so that a deploy waiting on the app lock cannot hold the response
            let task = tokio::spawn(async move {
                log_push_result(
                    &name,
                    orchestrator.handle_push(&name, &push, Some(timeout)).await,
                );
            });
            if tokio::time::timeout(state.hook_timeout, task).await.is_err() {
                info!(app = %app_id, "Deploy still in progress, answering webhook");
            }
            StatusCode::OK
        }
    }
}

/// Resolve `app_id`, re-reading the registry once if it is not known yet
async fn ensure_known(state: &ServerState, app_id: &str) -> Result<(), PodError> {
    match state.orchestrator.resolve(app_id).await {
        Err(PodError::NotFound(_)) => {
            state.orchestrator.registry().reload().await?;
            state.orchestrator.resolve(app_id).await.map(|_| ())
        }
        other => other.map(|_| ()),
    }
}

fn log_push_result(app: &str, result: Result<Option<DeployReport>, PodError>) {
    match result {
        Ok(None) => {}
        Ok(Some(DeployReport::Pending)) => {
            info!(app = %app, "Deploy hook running in background")
        }
        Ok(Some(DeployReport::Deployed {
            outcome,
            activation,
        })) => info!(
            app = %app,
            "Deployed {} ({:?})",
            outcome.new_commit_hash.as_deref().unwrap_or("unknown commit"),
            activation
        ),
        Err(e @ PodError::RollbackFailed { .. }) => error!(app = %app, "{}", e),
        Err(e) => warn!(app = %app, "Deploy failed: {}", e),
    }
}
