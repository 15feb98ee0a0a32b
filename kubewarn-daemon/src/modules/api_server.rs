//! API server module.
//!
//! Wraps the axum server in the `Pipeline` lifecycle: `start` binds the
//! listener and spawns the server, `stop` triggers graceful shutdown and
//! waits for in-flight requests to drain.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use kubewarn_core::config::KubewarnConfig;
use kubewarn_core::error::{KubewarnError, PipelineError};
use kubewarn_core::pipeline::{HealthStatus, Pipeline};

use super::ModuleHandle;
use crate::api::{self, AppState};

/// Upper bound on waiting for in-flight requests during stop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// The HTTP/websocket server.
pub struct ApiServer {
    addr: SocketAddr,
    router: Router,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
    bound_tx: watch::Sender<Option<SocketAddr>>,
}

impl ApiServer {
    /// Create a server for `state`. Nothing is bound until `start`.
    pub fn new(addr: SocketAddr, state: AppState, cors_permissive: bool) -> Self {
        let shutdown = state.shutdown.clone();
        let (bound_tx, _) = watch::channel(None);
        Self {
            addr,
            router: api::router(state, cors_permissive),
            shutdown,
            task: None,
            bound_tx,
        }
    }

    /// Observe the bound address (resolves port 0).
    pub fn bound_addr(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.bound_tx.subscribe()
    }
}

impl Pipeline for ApiServer {
    async fn start(&mut self) -> Result<(), KubewarnError> {
        if self.task.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        if self.shutdown.is_cancelled() {
            return Err(
                PipelineError::InitFailed("api server cannot be restarted".to_owned()).into(),
            );
        }

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        let router = self.router.clone();
        let shutdown = self.shutdown.clone();
        self.task = Some(tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "api server terminated with error");
            }
        }));

        self.bound_tx.send_replace(Some(local_addr));
        tracing::info!(listen_addr = %local_addr, "api server listening");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), KubewarnError> {
        let Some(mut task) = self.task.take() else {
            return Err(PipelineError::NotRunning.into());
        };

        self.shutdown.cancel();
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "api server task panicked"),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = DRAIN_TIMEOUT.as_secs(),
                    "api server did not drain in time, aborting"
                );
                task.abort();
            }
        }

        self.bound_tx.send_replace(None);
        tracing::info!("api server stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match &self.task {
            Some(task) if !task.is_finished() => HealthStatus::Healthy,
            Some(_) => HealthStatus::Unhealthy("server task exited".to_owned()),
            None => HealthStatus::Unhealthy("not serving".to_owned()),
        }
    }
}

/// Initialize the API server module.
///
/// # Errors
///
/// Invalid `server.listen_addr`.
pub fn init(
    config: &KubewarnConfig,
    state: AppState,
) -> Result<(ModuleHandle, watch::Receiver<Option<SocketAddr>>)> {
    let addr = config
        .server
        .socket_addr()
        .map_err(|e| anyhow::anyhow!("invalid server config: {}", e))?;
    let server = ApiServer::new(addr, state, config.server.cors_permissive);
    let bound = server.bound_addr();
    Ok((ModuleHandle::new("api-server", Box::new(server)), bound))
}
