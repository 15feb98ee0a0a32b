//! Module orchestration -- assembly, wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `kubewarn-daemon`.
//! It connects the startup dependencies, builds the modules, manages
//! startup and shutdown ordering, and waits for a termination signal.
//!
//! # Startup Order
//!
//! 1. Event store (connect + schema), fatal on failure
//! 2. Kubernetes client, fatal on failure
//! 3. Ingestion pipeline (`connect()` fatal, then listing and watch)
//! 4. API server
//!
//! # Shutdown Order (reverse)
//!
//! 1. API server (stop accepting, drain requests, end live feeds)
//! 2. Ingestion pipeline (cancel watch, close remaining subscribers)
//! 3. Event store connections

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{broadcast, watch};

use kubewarn_core::config::KubewarnConfig;
use kubewarn_core::metrics as m;
use kubewarn_event_source::{EventSource, KubeEventSource};
use kubewarn_event_store::AnyEventStore;
use kubewarn_ingest::ReadinessHandle;

use crate::api::AppState;
use crate::health::{DaemonHealth, ModuleHealth};
use crate::metrics_server;
use crate::modules::{ModuleRegistry, api_server, ingest};

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: KubewarnConfig,
    /// Registered modules (ordered for start/stop).
    modules: ModuleRegistry,
    /// Store shared by ingestion and queries; closed last.
    store: Arc<AnyEventStore>,
    /// Ingestion state, for readiness waits.
    readiness: ReadinessHandle,
    /// Address the API server bound to, once started.
    api_addr: watch::Receiver<Option<SocketAddr>>,
    /// Shutdown broadcast sender (signals background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Build from a loaded configuration, connecting to the configured
    /// store and to the Kubernetes API.
    ///
    /// # Errors
    ///
    /// - Configuration fails validation
    /// - Event store or Kubernetes client cannot be created
    pub async fn build_from_config(config: KubewarnConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let store = connect_store(&config).await?;

        let namespace = match config.kubernetes.namespace.trim() {
            "" => None,
            ns => Some(ns.to_owned()),
        };
        let source = KubeEventSource::try_default()
            .await
            .map_err(|e| anyhow::anyhow!("failed to create kubernetes client: {}", e))?
            .with_namespace(namespace);

        Self::build_with(config, Arc::new(source), store)
    }

    /// Assemble modules around a given event source and store.
    ///
    /// Does not install the metrics recorder; tests use this with
    /// in-memory collaborators.
    pub fn build_with<E: EventSource>(
        config: KubewarnConfig,
        source: Arc<E>,
        store: AnyEventStore,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let store = Arc::new(store);
        let mut modules = ModuleRegistry::new();

        let (ingest_handle, wiring) = ingest::init(&config, source, Arc::clone(&store))?;
        modules.register(ingest_handle);

        let state = AppState::new(
            Arc::clone(&store),
            wiring.broadcaster,
            wiring.readiness.clone(),
        )
        .with_write_timeout(Duration::from_secs(config.server.write_timeout_secs));
        let (api_handle, api_addr) = api_server::init(&config, state)?;
        modules.register(api_handle);

        let (shutdown_tx, _) = broadcast::channel(4);

        tracing::info!(
            modules = modules.count(),
            backend = store.backend_name(),
            "orchestrator initialized"
        );
        record_daemon_metrics(modules.count());

        Ok(Self {
            config,
            modules,
            store,
            readiness: wiring.readiness,
            api_addr,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start all modules, wait for SIGTERM or SIGINT, then shut down.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Start all modules, wait for `signal`, then shut down.
    ///
    /// `signal` resolves to the name of the trigger, used for logging.
    pub async fn run_until<F>(&mut self, signal: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        self.start().await?;

        let uptime_task = spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe());

        tracing::info!("kubewarn-daemon running");
        let signal = signal.await;
        match &signal {
            Ok(name) => tracing::info!(signal = name, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "failed to wait for shutdown signal"),
        }

        let _ = self.shutdown_tx.send(());
        let _ = uptime_task.await;

        let stopped = self.shutdown().await;
        signal?;
        stopped
    }

    /// Write the PID file and start modules in order.
    ///
    /// On failure, modules that already started are stopped again and
    /// the PID file is removed.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(path) = self.pid_file() {
            write_pid_file(path)?;
        }

        tracing::info!("starting all modules");
        if let Err(e) = self.modules.start_all().await {
            tracing::warn!("startup failed, rolling back already-started modules");
            if let Err(stop_err) = self.modules.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            self.store.close().await;
            if let Some(path) = self.pid_file() {
                remove_pid_file(path);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Stop modules in reverse order, close the store, remove the PID file.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all modules");
        let result = self.modules.stop_all().await;
        self.store.close().await;
        if let Some(path) = self.pid_file() {
            remove_pid_file(path);
        }
        tracing::info!("kubewarn-daemon shut down");
        result
    }

    /// Current aggregated health of all modules.
    pub async fn health(&self) -> DaemonHealth {
        let modules = self
            .modules
            .health_statuses()
            .await
            .into_iter()
            .map(|(name, status)| ModuleHealth::new(name, status))
            .collect();
        DaemonHealth::from_modules(modules, self.start_time.elapsed().as_secs())
    }

    /// Ingestion readiness handle.
    pub fn readiness(&self) -> ReadinessHandle {
        self.readiness.clone()
    }

    /// Address the API server is listening on, once started.
    pub fn api_addr(&self) -> Option<SocketAddr> {
        *self.api_addr.borrow()
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &KubewarnConfig {
        &self.config
    }

    fn pid_file(&self) -> Option<&Path> {
        let path = self.config.general.pid_file.as_str();
        (!path.is_empty()).then(|| Path::new(path))
    }
}

/// Connect to the configured event store.
async fn connect_store(config: &KubewarnConfig) -> Result<AnyEventStore> {
    let store = AnyEventStore::from_core(&config.storage)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect event store: {}", e))?;
    tracing::info!(backend = store.backend_name(), "event store ready");
    Ok(store)
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// Refuses to overwrite an existing file so a second daemon instance
/// fails at startup.
///
/// # Security
///
/// - `create_new(true)` creates the file atomically
/// - The created file must be a regular file
/// - Parent directory is created with mode 0o700, the file with 0o600
///
/// # Errors
///
/// Returns an error if the PID file exists or cannot be written.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o700)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on shutdown. Failures are logged only.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Record daemon-level metrics (build info, modules registered).
fn record_daemon_metrics(module_count: usize) {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_MODULES_REGISTERED).set(module_count as f64);
}

/// Spawn a task that refreshes the uptime gauge every 10 seconds.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
