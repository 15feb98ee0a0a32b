//! Module registry and initialization.
//!
//! Each long-running component is wrapped as a [`ModuleHandle`] that
//! provides uniform lifecycle management via the [`DynPipeline`] trait.
//! The [`ModuleRegistry`] starts modules in registration order and stops
//! them in reverse.

pub mod api_server;
pub mod ingest;

use kubewarn_core::pipeline::{DynPipeline, HealthStatus};

/// A handle to a registered module.
pub struct ModuleHandle {
    /// Module name for logging and health reporting.
    pub name: String,
    /// The module's pipeline implementation (start/stop/health_check).
    pub pipeline: Box<dyn DynPipeline>,
}

impl ModuleHandle {
    /// Create a new module handle.
    pub fn new(name: impl Into<String>, pipeline: Box<dyn DynPipeline>) -> Self {
        Self {
            name: name.into(),
            pipeline,
        }
    }
}

/// Registry of daemon modules.
///
/// Dependencies are registered first. Ingestion starts its watch and owns the
/// broadcaster before the API binds; `start` returns while the initial listing
/// may still be synchronizing, so callers that need a populated history wait
/// on the readiness handle. On stop the API goes first so no new viewers
/// subscribe while ingestion closes the live feed.
pub struct ModuleRegistry {
    modules: Vec<ModuleHandle>,
    /// Number of modules started by the last `start_all`.
    started: usize,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            started: 0,
        }
    }

    /// Register a module.
    pub fn register(&mut self, handle: ModuleHandle) {
        self.modules.push(handle);
    }

    /// Start all modules in registration order.
    ///
    /// Returns an error on the first module that fails to start.
    /// Already-started modules are not rolled back here; the caller
    /// invokes `stop_all`, which only stops modules that started.
    pub async fn start_all(&mut self) -> anyhow::Result<()> {
        self.started = 0;
        for handle in &mut self.modules {
            tracing::info!(module = %handle.name, "starting module");
            handle
                .pipeline
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("failed to start module '{}': {}", handle.name, e))?;
            self.started += 1;
            tracing::info!(module = %handle.name, "module started successfully");
        }
        Ok(())
    }

    /// Stop started modules in reverse registration order.
    ///
    /// Logs errors but continues stopping remaining modules.
    pub async fn stop_all(&mut self) -> anyhow::Result<()> {
        let mut errors = Vec::new();
        let started = std::mem::take(&mut self.started);

        for handle in self.modules[..started].iter_mut().rev() {
            tracing::info!(module = %handle.name, "stopping module");
            if let Err(e) = handle.pipeline.stop().await {
                tracing::error!(module = %handle.name, error = %e, "failed to stop module");
                errors.push(format!("{}: {}", handle.name, e));
            } else {
                tracing::info!(module = %handle.name, "module stopped successfully");
            }
        }

        if !errors.is_empty() {
            return Err(anyhow::anyhow!(
                "errors stopping modules: {}",
                errors.join("; ")
            ));
        }
        Ok(())
    }

    /// Health status of every registered module, in registration order.
    pub async fn health_statuses(&self) -> Vec<(String, HealthStatus)> {
        let mut statuses = Vec::with_capacity(self.modules.len());
        for handle in &self.modules {
            statuses.push((handle.name.clone(), handle.pipeline.health_check().await));
        }
        statuses
    }

    /// Number of registered modules.
    pub fn count(&self) -> usize {
        self.modules.len()
    }

    /// Number of modules currently started.
    pub fn started_count(&self) -> usize {
        self.started
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
