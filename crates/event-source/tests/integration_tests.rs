//! EventSource trait 통합 테스트
//!
//! 파이프라인이 하는 것처럼 trait을 제네릭으로 소비하여
//! 초기 목록과 재연결 시퀀스를 검증합니다.

use futures::StreamExt;
use kubewarn_core::WarningEvent;
use kubewarn_event_source::{EventFilter, EventSource, MemoryEventSource, SourceEvent};
use serde_json::json;

fn warning(id: &str) -> WarningEvent {
    WarningEvent::new(id, "Warning", json!({"metadata": {"uid": id}, "type": "Warning"}))
}

/// `Synced`까지 관측된 이벤트 ID를 모읍니다.
async fn drain_initial_listing<S: EventSource>(source: &S) -> Vec<String> {
    source.connect().await.expect("connect");
    let mut stream = source.watch(EventFilter::warnings());
    let mut ids = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            SourceEvent::Observed(event) => ids.push(event.id),
            SourceEvent::Synced => break,
            SourceEvent::Resync | SourceEvent::Disconnected(_) => {}
        }
    }
    ids
}

#[tokio::test]
async fn initial_listing_precedes_synced() {
    let source = MemoryEventSource::listing(vec![warning("evt-1"), warning("evt-2")]);
    let ids = drain_initial_listing(&source).await;
    assert_eq!(ids, vec!["evt-1", "evt-2"]);
}

#[tokio::test]
async fn resume_after_disconnect_may_redeliver() {
    let source = MemoryEventSource::scripted(vec![
        SourceEvent::Resync,
        SourceEvent::Observed(warning("evt-1")),
        SourceEvent::Synced,
        SourceEvent::Disconnected("connection reset".to_owned()),
        SourceEvent::Resync,
        SourceEvent::Observed(warning("evt-1")),
        SourceEvent::Observed(warning("evt-2")),
        SourceEvent::Synced,
    ]);

    let kinds: Vec<&'static str> = source
        .watch(EventFilter::warnings())
        .take(8)
        .map(|item| item.kind())
        .collect()
        .await;

    assert_eq!(
        kinds,
        vec![
            "resync",
            "observed",
            "synced",
            "disconnected",
            "resync",
            "observed",
            "observed",
            "synced"
        ]
    );
}

#[tokio::test]
async fn connect_failure_surfaces_before_watch() {
    let source = MemoryEventSource::scripted(Vec::new()).failing_connect("no route to host");
    let err = source.connect().await.unwrap_err();
    assert!(err.to_string().contains("no route to host"));
    assert_eq!(source.watch_calls(), 0);
}

#[tokio::test]
async fn injected_events_flow_through_handle() {
    let (source, handle) = MemoryEventSource::channel();
    let mut stream = source.watch(EventFilter::warnings().in_namespace("default"));

    handle.observe(warning("late-1"));
    let item = stream.next().await;
    assert!(matches!(item, Some(SourceEvent::Observed(e)) if e.id == "late-1"));
    assert_eq!(
        source.last_filter().and_then(|f| f.namespace).as_deref(),
        Some("default")
    );
}
