//! Webhook server run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::ServerOptions;
use crate::errors::PodError;
use crate::orchestrator::Orchestrator;
use crate::registry::RegistryStore;
use crate::server::serve::serve;
use crate::server::state::{Credentials, ServerState};

/// Serve webhooks and the dashboard until `shutdown_signal` resolves
pub async fn run(
    options: ServerOptions,
    orchestrator: Arc<Orchestrator>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PodError> {
    info!("Initializing pod web service...");

    let config = orchestrator.registry().snapshot().await;
    let state = ServerState::new(
        orchestrator.clone(),
        Credentials::from(&config.web),
        orchestrator.options().webhook_timeout,
    );

    let (shutdown_tx, _): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut server_shutdown = shutdown_tx.subscribe();
    let server_handle = serve(&options, Arc::new(state), async move {
        let _ = server_shutdown.recv().await;
    })
    .await?;

    let reload_handle = spawn_reload_on_hangup(orchestrator.registry().clone(), shutdown_tx.subscribe());

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");
    let _ = shutdown_tx.send(());

    if let Some(handle) = reload_handle {
        let _ = handle.await;
    }
    match server_handle.await {
        Ok(result) => result,
        Err(e) => {
            error!("HTTP server task failed: {}", e);
            Err(PodError::ServerError(e.to_string()))
        }
    }
}

/// Re-read the registry file whenever the process receives SIGHUP
#[cfg(unix)]
fn spawn_reload_on_hangup(
    registry: Arc<RegistryStore>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Option<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            error!("Cannot listen for SIGHUP, registry reload disabled: {}", e);
            return None;
        }
    };

    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    match registry.reload().await {
                        Ok(config) => info!("SIGHUP received, reloaded {} app(s)", config.apps.len()),
                        Err(e) => error!("SIGHUP received, registry reload failed: {}", e),
                    }
                }
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(
    _registry: Arc<RegistryStore>,
    _shutdown_rx: broadcast::Receiver<()>,
) -> Option<JoinHandle<()>> {
    None
}
