//! 메모리 이벤트 소스 (테스트 지원)
//!
//! 두 가지 방식으로 이벤트를 공급합니다.
//!
//! - [`MemoryEventSource::scripted`]: 미리 정한 항목을 순서대로 내보낸 뒤 대기
//! - [`MemoryEventSource::channel`]: [`MemorySourceHandle`]로 실행 중에 항목 주입
//!
//! 어느 쪽이든 스트림은 끝나지 않으며, 실제 watch처럼 소비자가 취소할 때까지 대기합니다.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use futures::stream;
use kubewarn_core::WarningEvent;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::EventSourceError;
use crate::source::{EventFilter, EventSource, SourceEvent, SourceStream};

enum Feed {
    Scripted(Vec<SourceEvent>),
    Channel(Option<mpsc::UnboundedReceiver<SourceEvent>>),
}

/// 메모리 이벤트 소스
pub struct MemoryEventSource {
    feed: Mutex<Feed>,
    connect_error: Option<String>,
    last_filter: Mutex<Option<EventFilter>>,
    watch_calls: AtomicUsize,
}

impl MemoryEventSource {
    /// 미리 정한 항목을 내보내는 소스를 생성합니다.
    ///
    /// `watch()`를 여러 번 호출하면 매번 같은 항목을 처음부터 내보냅니다.
    pub fn scripted(items: Vec<SourceEvent>) -> Self {
        Self::with_feed(Feed::Scripted(items))
    }

    /// 초기 목록을 흉내 냅니다: `Resync`, 각 이벤트의 `Observed`, `Synced`.
    pub fn listing(events: Vec<WarningEvent>) -> Self {
        let mut items = Vec::with_capacity(events.len() + 2);
        items.push(SourceEvent::Resync);
        items.extend(events.into_iter().map(SourceEvent::Observed));
        items.push(SourceEvent::Synced);
        Self::scripted(items)
    }

    /// 채널로 항목을 주입하는 소스와 핸들을 생성합니다.
    ///
    /// 채널 방식의 스트림은 한 번만 가져갈 수 있습니다.
    pub fn channel() -> (Self, MemorySourceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self::with_feed(Feed::Channel(Some(rx))),
            MemorySourceHandle { tx },
        )
    }

    fn with_feed(feed: Feed) -> Self {
        Self {
            feed: Mutex::new(feed),
            connect_error: None,
            last_filter: Mutex::new(None),
            watch_calls: AtomicUsize::new(0),
        }
    }

    /// `connect()`가 주어진 사유로 실패하도록 설정합니다.
    pub fn failing_connect(mut self, reason: impl Into<String>) -> Self {
        self.connect_error = Some(reason.into());
        self
    }

    /// 마지막 `watch()` 호출에 전달된 필터
    pub fn last_filter(&self) -> Option<EventFilter> {
        self.last_filter
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// `watch()` 호출 횟수
    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::Relaxed)
    }
}

impl EventSource for MemoryEventSource {
    async fn connect(&self) -> Result<(), EventSourceError> {
        match &self.connect_error {
            Some(reason) => Err(EventSourceError::Connection(reason.clone())),
            None => Ok(()),
        }
    }

    fn watch(&self, filter: EventFilter) -> SourceStream {
        self.watch_calls.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_filter.lock() {
            *last = Some(filter);
        }

        let Ok(mut feed) = self.feed.lock() else {
            warn!("memory event source lock poisoned, returning idle stream");
            return stream::pending().boxed();
        };

        match &mut *feed {
            Feed::Scripted(items) => stream::iter(items.clone())
                .chain(stream::pending())
                .boxed(),
            Feed::Channel(rx) => match rx.take() {
                Some(mut rx) => stream::poll_fn(move |cx| rx.poll_recv(cx))
                    .chain(stream::pending())
                    .boxed(),
                None => {
                    warn!("memory event source channel already consumed, returning idle stream");
                    stream::pending().boxed()
                }
            },
        }
    }
}

/// 채널 방식 [`MemoryEventSource`]에 항목을 주입하는 핸들
#[derive(Clone)]
pub struct MemorySourceHandle {
    tx: mpsc::UnboundedSender<SourceEvent>,
}

impl MemorySourceHandle {
    /// 항목 하나를 보냅니다. 소스가 해제되었으면 `false`를 반환합니다.
    pub fn send(&self, item: SourceEvent) -> bool {
        self.tx.send(item).is_ok()
    }

    /// 관측 이벤트를 보냅니다.
    pub fn observe(&self, event: WarningEvent) -> bool {
        self.send(SourceEvent::Observed(event))
    }

    /// 초기 목록 완료를 흉내 냅니다 (`Resync` 후 `Synced`).
    pub fn sync(&self) -> bool {
        self.send(SourceEvent::Resync) && self.send(SourceEvent::Synced)
    }

    /// 전송 끊김을 흉내 냅니다.
    pub fn disconnect(&self, reason: impl Into<String>) -> bool {
        self.send(SourceEvent::Disconnected(reason.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn warning(id: &str) -> WarningEvent {
        WarningEvent::new(id, "Warning", json!({"metadata": {"uid": id}}))
    }

    #[tokio::test]
    async fn listing_wraps_events_in_resync_and_synced() {
        let source = MemoryEventSource::listing(vec![warning("a"), warning("b")]);
        let items: Vec<_> = source.watch(EventFilter::default()).take(4).collect().await;
        assert_eq!(items[0], SourceEvent::Resync);
        assert!(matches!(&items[1], SourceEvent::Observed(e) if e.id == "a"));
        assert!(matches!(&items[2], SourceEvent::Observed(e) if e.id == "b"));
        assert_eq!(items[3], SourceEvent::Synced);
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_stream_does_not_end() {
        let source = MemoryEventSource::scripted(vec![SourceEvent::Synced]);
        let mut stream = source.watch(EventFilter::default());
        assert_eq!(stream.next().await, Some(SourceEvent::Synced));

        let next = tokio::time::timeout(Duration::from_secs(60), stream.next()).await;
        assert!(next.is_err(), "stream should stay pending");
    }

    #[tokio::test]
    async fn channel_delivers_injected_items() {
        let (source, handle) = MemoryEventSource::channel();
        let mut stream = source.watch(EventFilter::default());

        assert!(handle.sync());
        assert!(handle.observe(warning("x")));
        assert!(handle.disconnect("reset"));

        assert_eq!(stream.next().await, Some(SourceEvent::Resync));
        assert_eq!(stream.next().await, Some(SourceEvent::Synced));
        assert!(matches!(stream.next().await, Some(SourceEvent::Observed(e)) if e.id == "x"));
        assert_eq!(
            stream.next().await,
            Some(SourceEvent::Disconnected("reset".to_owned()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn channel_second_watch_is_idle() {
        let (source, handle) = MemoryEventSource::channel();
        let _first = source.watch(EventFilter::default());
        let mut second = source.watch(EventFilter::default());
        handle.sync();

        let next = tokio::time::timeout(Duration::from_secs(1), second.next()).await;
        assert!(next.is_err());
        assert_eq!(source.watch_calls(), 2);
    }

    #[tokio::test]
    async fn records_last_filter() {
        let source = MemoryEventSource::scripted(Vec::new());
        assert!(source.last_filter().is_none());
        let _stream = source.watch(EventFilter::warnings().in_namespace("kube-system"));
        assert_eq!(
            source.last_filter().and_then(|f| f.namespace),
            Some("kube-system".to_owned())
        );
    }

    #[tokio::test]
    async fn failing_connect_reports_reason() {
        let source = MemoryEventSource::scripted(Vec::new()).failing_connect("forbidden");
        let err = source.connect().await.unwrap_err();
        assert!(err.to_string().contains("forbidden"));
    }
}
