//! HTTP and websocket API.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /events` | websocket live feed, one `{id, data}` text frame per new event |
//! | `GET /api/events` | all recorded events |
//! | `GET /api/events/{uid}` | one recorded event, 404 if absent |
//! | `GET /health` | aggregated health |

pub mod error;
pub mod events;
pub mod health;
pub mod live;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::http::{Method, header};
use axum::routing::get;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use kubewarn_event_store::AnyEventStore;
use kubewarn_ingest::{Broadcaster, QueryService, ReadinessHandle};

pub use error::ApiError;

/// Default bound on writing one live-feed frame.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub query: QueryService<AnyEventStore>,
    pub broadcaster: Broadcaster,
    pub readiness: ReadinessHandle,
    /// Cancelled when the API server stops; ends live feeds.
    pub shutdown: CancellationToken,
    /// A viewer that takes longer than this to accept a frame is disconnected.
    pub write_timeout: Duration,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<AnyEventStore>,
        broadcaster: Broadcaster,
        readiness: ReadinessHandle,
    ) -> Self {
        Self {
            query: QueryService::new(store),
            broadcaster,
            readiness,
            shutdown: CancellationToken::new(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            started_at: Instant::now(),
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }
}

/// Build the API router.
pub fn router(state: AppState, cors_permissive: bool) -> Router {
    let router = Router::new()
        .route("/events", get(live::live_events))
        .route("/api/events", get(events::list_events))
        .route("/api/events/{uid}", get(events::get_event))
        .route("/health", get(health::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_permissive {
        router.layer(cors_layer())
    } else {
        router
    }
}

/// Any origin; the methods and headers a browser dashboard sends.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
