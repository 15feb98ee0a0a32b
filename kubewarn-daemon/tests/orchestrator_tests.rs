//! Orchestrator integration tests.
//!
//! Runs the assembled daemon on an ephemeral port with an in-memory event
//! source and store, and talks to it over real HTTP and websocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_tungstenite::tungstenite::Message;

use kubewarn_core::WarningEvent;
use kubewarn_core::config::KubewarnConfig;
use kubewarn_daemon::orchestrator::Orchestrator;
use kubewarn_event_source::{MemoryEventSource, MemorySourceHandle, SourceEvent};
use kubewarn_event_store::{AnyEventStore, MemoryEventStore};

const WAIT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn test_config() -> KubewarnConfig {
    let mut config = KubewarnConfig::default();
    config.storage.backend = "memory".to_owned();
    config.server.listen_addr = "127.0.0.1:0".to_owned();
    config
}

fn warning(id: &str) -> WarningEvent {
    WarningEvent::new(
        id,
        "Warning",
        json!({
            "metadata": { "uid": id, "namespace": "kube-system" },
            "type": "Warning",
            "reason": "Unhealthy",
            "message": "Readiness probe failed"
        }),
    )
}

fn build(config: KubewarnConfig) -> (Orchestrator, MemorySourceHandle) {
    let (source, handle) = MemoryEventSource::channel();
    let orchestrator = Orchestrator::build_with(
        config,
        Arc::new(source),
        AnyEventStore::Memory(MemoryEventStore::new()),
    )
    .expect("orchestrator should build");
    (orchestrator, handle)
}

async fn start_ready(config: KubewarnConfig) -> (Orchestrator, MemorySourceHandle, SocketAddr) {
    let (mut orchestrator, handle) = build(config);
    orchestrator.start().await.expect("daemon should start");
    handle.sync();
    orchestrator
        .readiness()
        .wait_ready()
        .await
        .expect("ingestion should become ready");
    let addr = orchestrator.api_addr().expect("api server should be bound");
    (orchestrator, handle, addr)
}

fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn connect_viewer(addr: SocketAddr) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/events"))
        .await
        .expect("websocket should connect");
    ws
}

async fn next_document(ws: &mut WsStream) -> Value {
    loop {
        let message = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for live event")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Read until the server closes the connection.
async fn expect_closed(ws: &mut WsStream) {
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .expect("server should close the live feed");
}

#[tokio::test]
async fn new_event_reaches_viewer_and_history() {
    // Given: A running daemon with one live viewer
    let (mut orchestrator, handle, addr) = start_ready(test_config()).await;
    let mut viewer = connect_viewer(addr).await;

    // When: A new warning event is observed
    handle.observe(warning("evt-1"));

    // Then: The viewer receives {id, data}
    let doc = next_document(&mut viewer).await;
    assert_eq!(doc["id"], "evt-1");
    assert_eq!(doc["data"]["reason"], "Unhealthy");

    // And: History has exactly that event
    let client = http();
    let all: Vec<Value> = client
        .get(format!("http://{addr}/api/events"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["id"], "evt-1");

    // When: The same event is observed again, followed by a new one
    handle.observe(warning("evt-1"));
    handle.observe(warning("evt-3"));

    // Then: Only the new one is pushed, and history holds two records
    let doc = next_document(&mut viewer).await;
    assert_eq!(doc["id"], "evt-3");
    let all: Vec<Value> = client
        .get(format!("http://{addr}/api/events"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    // And: A never-seen id is not found
    let missing = client
        .get(format!("http://{addr}/api/events/evt-2"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn every_viewer_receives_each_event() {
    // Given: Three connected viewers
    let (mut orchestrator, handle, addr) = start_ready(test_config()).await;
    let mut viewers = Vec::new();
    for _ in 0..3 {
        viewers.push(connect_viewer(addr).await);
    }

    // When: One event is observed
    handle.observe(warning("evt-fanout"));

    // Then: All viewers receive it
    for viewer in &mut viewers {
        assert_eq!(next_document(viewer).await["id"], "evt-fanout");
    }

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn disconnected_viewer_does_not_affect_others() {
    // Given: Two viewers, one of which leaves
    let (mut orchestrator, handle, addr) = start_ready(test_config()).await;
    let mut staying = connect_viewer(addr).await;
    let mut leaving = connect_viewer(addr).await;
    leaving.close(None).await.unwrap();
    drop(leaving);

    // When: Events keep arriving
    handle.observe(warning("evt-a"));
    handle.observe(warning("evt-b"));

    // Then: The remaining viewer receives them in order
    assert_eq!(next_document(&mut staying).await["id"], "evt-a");
    assert_eq!(next_document(&mut staying).await["id"], "evt-b");

    orchestrator.shutdown().await.unwrap();
}

/// A warning whose payload is large enough to fill socket buffers quickly.
fn bulky_warning(id: &str) -> WarningEvent {
    WarningEvent::new(
        id,
        "Warning",
        json!({
            "metadata": { "uid": id, "namespace": "kube-system" },
            "type": "Warning",
            "reason": "BackOff",
            "message": "x".repeat(256 * 1024)
        }),
    )
}

#[tokio::test]
async fn stalled_viewer_is_disconnected_while_others_keep_receiving() {
    // Given: A one-slot subscriber queue, a viewer that never reads and one that does
    let mut config = test_config();
    config.ingest.subscriber_queue_capacity = 1;
    config.server.write_timeout_secs = 1;
    let (mut orchestrator, handle, addr) = start_ready(config).await;
    let mut stalled = connect_viewer(addr).await;
    let mut reading = connect_viewer(addr).await;

    // When: More data is published than the stalled socket can buffer
    let ids: Vec<String> = (0..128).map(|n| format!("evt-{n:03}")).collect();
    let mut received = Vec::with_capacity(ids.len());
    for id in &ids {
        handle.observe(bulky_warning(id));
        let doc = next_document(&mut reading).await;
        received.push(doc["id"].as_str().unwrap().to_owned());
    }

    // Then: The stalled viewer is dropped
    expect_closed(&mut stalled).await;

    // And: The reading viewer got every event in order and is still served
    assert_eq!(received, ids);
    handle.observe(warning("evt-after"));
    assert_eq!(next_document(&mut reading).await["id"], "evt-after");

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn history_survives_watch_reconnect() {
    // Given: A daemon that recorded one event
    let (mut orchestrator, handle, addr) = start_ready(test_config()).await;
    let mut viewer = connect_viewer(addr).await;
    handle.observe(warning("evt-1"));
    next_document(&mut viewer).await;

    // When: The watch drops and relists the same event
    handle.disconnect("stream reset");
    handle.send(SourceEvent::Resync);
    handle.observe(warning("evt-1"));
    handle.observe(warning("evt-2"));
    handle.sync();

    // Then: Only the unseen event is pushed, nothing is duplicated
    assert_eq!(next_document(&mut viewer).await["id"], "evt-2");
    let all: Vec<Value> = http()
        .get(format!("http://{addr}/api/events"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn viewers_connect_before_initial_listing_completes() {
    // Given: A started daemon whose initial listing has not finished
    let (mut orchestrator, handle) = build(test_config());
    orchestrator.start().await.expect("daemon should start");
    assert!(!orchestrator.readiness().current().is_ready());
    let addr = orchestrator.api_addr().expect("api server should be bound");

    // When: A viewer connects during the listing
    let mut viewer = connect_viewer(addr).await;

    // Then: Once the listing completes, new events reach that viewer
    handle.sync();
    orchestrator.readiness().wait_ready().await.unwrap();
    handle.observe(warning("evt-late"));
    assert_eq!(next_document(&mut viewer).await["id"], "evt-late");

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_live_viewers() {
    // Given: A running daemon with a connected viewer
    let (mut orchestrator, _handle, addr) = start_ready(test_config()).await;
    let mut viewer = connect_viewer(addr).await;

    // When: The daemon shuts down
    orchestrator.shutdown().await.unwrap();

    // Then: The viewer's connection is closed and the port is released
    expect_closed(&mut viewer).await;
    assert!(orchestrator.api_addr().is_none());
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn health_reports_all_modules() {
    // Given: A ready daemon
    let (mut orchestrator, _handle, addr) = start_ready(test_config()).await;

    // When: Checking aggregated health, in-process and over HTTP
    let report = orchestrator.health().await;
    let response = http()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();

    // Then: Both modules are healthy
    assert!(report.status.is_healthy());
    let names: Vec<_> = report.modules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["ingest", "api-server"]);
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    orchestrator.shutdown().await.unwrap();
    assert!(orchestrator.health().await.status.is_unhealthy());
}

#[tokio::test]
async fn source_connect_failure_aborts_startup() {
    // Given: An event source that cannot reach the API server
    let temp = TempDir::new().unwrap();
    let pid_path = temp.path().join("kubewarn.pid");
    let mut config = test_config();
    config.general.pid_file = pid_path.display().to_string();

    let source = MemoryEventSource::scripted(Vec::new()).failing_connect("connection refused");
    let mut orchestrator = Orchestrator::build_with(
        config,
        Arc::new(source),
        AnyEventStore::Memory(MemoryEventStore::new()),
    )
    .unwrap();

    // When: Starting
    let err = orchestrator.start().await.unwrap_err();

    // Then: Startup fails, nothing is served, the PID file is cleaned up
    assert!(err.to_string().contains("ingest"), "got: {err}");
    assert!(orchestrator.api_addr().is_none());
    assert!(!pid_path.exists());
}

#[tokio::test]
async fn pid_file_lifecycle() {
    // Given: A config with a PID file
    let temp = TempDir::new().unwrap();
    let pid_path = temp.path().join("run").join("kubewarn.pid");
    let mut config = test_config();
    config.general.pid_file = pid_path.display().to_string();

    // When: The daemon starts
    let (mut orchestrator, _handle, _addr) = start_ready(config.clone()).await;

    // Then: The PID file holds our PID
    let content = std::fs::read_to_string(&pid_path).unwrap();
    assert_eq!(content.trim(), std::process::id().to_string());

    // And: A second instance refuses to start
    let (mut second, _second_handle) = build(config);
    let err = second.start().await.unwrap_err();
    assert!(err.to_string().contains("already exists"));

    // When: The first daemon shuts down
    orchestrator.shutdown().await.unwrap();

    // Then: The PID file is removed
    assert!(!pid_path.exists());
}

#[tokio::test]
async fn run_until_stops_on_signal() {
    // Given: A daemon driven by a test signal
    let (mut orchestrator, handle) = build(test_config());
    let readiness = orchestrator.readiness();
    let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();

    let runner = tokio::spawn(async move {
        let result = orchestrator
            .run_until(async move {
                let _ = signal_rx.await;
                Ok("TEST")
            })
            .await;
        (orchestrator, result)
    });

    // When: It becomes ready and the signal fires
    handle.sync();
    let mut readiness_wait = readiness.clone();
    readiness_wait.wait_ready().await.unwrap();
    signal_tx.send(()).unwrap();

    // Then: run_until returns cleanly after stopping every module
    let (orchestrator, result) = tokio::time::timeout(WAIT, runner).await.unwrap().unwrap();
    result.unwrap();
    assert_eq!(
        readiness.current(),
        kubewarn_ingest::IngestState::Stopped
    );
    assert!(orchestrator.api_addr().is_none());
}

#[test]
fn invalid_listen_addr_fails_build() {
    let mut config = test_config();
    config.server.listen_addr = "not-an-address".to_owned();
    let (source, _handle) = MemoryEventSource::channel();

    let result = Orchestrator::build_with(
        config,
        Arc::new(source),
        AnyEventStore::Memory(MemoryEventStore::new()),
    );

    assert!(result.is_err());
}
