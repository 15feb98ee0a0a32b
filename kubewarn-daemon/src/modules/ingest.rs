//! Ingestion module initialization.
//!
//! Converts the `[kubernetes]` and `[ingest]` sections into an
//! `EventFilter` and `IngestPipelineConfig`, builds the pipeline over the
//! shared store, and wraps it in a `ModuleHandle`.
//!
//! # Wiring
//!
//! ```text
//! EventSource --> IngestionPipeline --put--> AnyEventStore <--read-- QueryService (API)
//!                       |
//!                       +--publish--> Broadcaster --> live viewers (API)
//! ```

use std::sync::Arc;

use anyhow::Result;

use kubewarn_core::config::KubewarnConfig;
use kubewarn_event_source::{EventFilter, EventSource};
use kubewarn_event_store::AnyEventStore;
use kubewarn_ingest::{
    Broadcaster, IngestPipelineConfig, IngestionPipelineBuilder, ReadinessHandle,
};

use super::ModuleHandle;

/// Handles the API needs from the ingestion module.
pub struct IngestWiring {
    pub broadcaster: Broadcaster,
    pub readiness: ReadinessHandle,
}

/// Initialize the ingestion module.
///
/// # Errors
///
/// Invalid `[ingest]` values.
pub fn init<E: EventSource>(
    config: &KubewarnConfig,
    source: Arc<E>,
    store: Arc<AnyEventStore>,
) -> Result<(ModuleHandle, IngestWiring)> {
    let pipeline_config = IngestPipelineConfig::from_core(&config.ingest)
        .map_err(|e| anyhow::anyhow!("invalid ingest config: {}", e))?;
    let filter = EventFilter::from_core(&config.kubernetes);

    tracing::info!(
        filter = %filter,
        policy = %pipeline_config.publish_policy,
        queue_capacity = pipeline_config.subscriber_queue_capacity,
        "initializing ingestion pipeline"
    );

    let pipeline = IngestionPipelineBuilder::new()
        .config(pipeline_config)
        .filter(filter)
        .source(source)
        .store(store)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build ingestion pipeline: {}", e))?;

    let wiring = IngestWiring {
        broadcaster: pipeline.broadcaster(),
        readiness: pipeline.readiness(),
    };

    Ok((ModuleHandle::new("ingest", Box::new(pipeline)), wiring))
}
