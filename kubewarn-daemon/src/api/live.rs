//! Live feed endpoint (`GET /events`, websocket).
//!
//! Each connection owns one broadcaster subscription and a forwarding
//! task. Client messages are ignored apart from Close.
//!
//! The connection is torn down when:
//! - the broadcaster evicts the subscription because its queue filled,
//! - a frame is not accepted within the write timeout,
//! - the API server shuts down, or the broadcaster closes.
//!
//! Only the last case sends a Close frame; a stalled socket is dropped.

use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use kubewarn_ingest::Subscription;

use super::AppState;
use super::error::ApiError;

/// Handle the websocket upgrade.
///
/// The subscription is taken before upgrading so a full subscriber set
/// is reported as 503 instead of an immediately closed socket.
pub async fn live_events(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let subscription = state
        .broadcaster
        .subscribe()
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    let shutdown = state.shutdown.clone();
    let write_timeout = state.write_timeout;
    Ok(ws.on_upgrade(move |socket| serve_viewer(socket, subscription, shutdown, write_timeout)))
}

async fn serve_viewer(
    socket: WebSocket,
    subscription: Subscription,
    shutdown: CancellationToken,
    write_timeout: Duration,
) {
    let subscriber = subscription.id();
    let (sender, mut receiver) = socket.split();
    debug!(%subscriber, "live viewer connected");

    let mut forward = tokio::spawn(forward_events(sender, subscription, shutdown, write_timeout));

    let mut inbound = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut forward => inbound.abort(),
        _ = &mut inbound => forward.abort(),
    }
    debug!(%subscriber, "live viewer disconnected");
}

/// Forward subscription documents to the socket until the feed ends.
async fn forward_events(
    mut sender: SplitSink<WebSocket, Message>,
    mut subscription: Subscription,
    shutdown: CancellationToken,
    write_timeout: Duration,
) {
    let subscriber = subscription.id();

    loop {
        let document = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = subscription.evicted() => {
                debug!(%subscriber, "live viewer fell behind, dropping connection");
                return;
            }
            document = subscription.recv() => match document {
                Some(document) => document,
                None => break,
            },
        };

        let text = match serde_json::to_string(&*document) {
            Ok(text) => text,
            Err(e) => {
                warn!(%subscriber, event_id = %document.id, error = %e, "failed to encode event");
                continue;
            }
        };

        let write = tokio::time::timeout(write_timeout, sender.send(Message::Text(text.into())));
        let written = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = subscription.evicted() => {
                debug!(%subscriber, "live viewer fell behind mid-write, dropping connection");
                return;
            }
            written = write => written,
        };
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(%subscriber, error = %e, "live viewer write failed");
                return;
            }
            Err(_) => {
                warn!(
                    %subscriber,
                    timeout_secs = write_timeout.as_secs(),
                    "live viewer did not accept a frame in time, dropping connection"
                );
                return;
            }
        }
    }

    let _ = tokio::time::timeout(write_timeout, sender.send(Message::Close(None))).await;
}
