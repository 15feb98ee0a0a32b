//! 수집 파이프라인 -- 이벤트 소스 소비, 저장, 방송
//!
//! [`IngestionPipeline`]은 core의 [`Pipeline`] trait을 구현하여
//! `kubewarn-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 처리 흐름
//! ```text
//! EventSource.watch() ──> 수집 태스크 (단일)
//!                            │ Observed(event)
//!                            ├── type != Warning → skip
//!                            ├── store.put(event)
//!                            │     ├── Err → 로그, 카운트, skip
//!                            │     └── Inserted / AlreadyExists
//!                            └── PublishPolicy 허용 시 broadcaster.publish()
//! ```
//!
//! # 상태 전이
//! ```text
//! NotStarted → Synchronizing → Streaming ⇄ Reconnecting
//!                   ↑                          │
//!                   └──────── (재목록) ─────────┘
//! 어느 상태에서든 stop() → Stopped
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kubewarn_core::error::{KubewarnError, PipelineError};
use kubewarn_core::metrics as m;
use kubewarn_core::pipeline::{HealthStatus, Pipeline};
use kubewarn_core::WarningEvent;
use kubewarn_event_source::{EventFilter, EventSource, SourceEvent, SourceStream};
use kubewarn_event_store::{EventStore, PutOutcome};

use crate::broadcast::Broadcaster;
use crate::config::{IngestPipelineConfig, PublishPolicy};
use crate::error::IngestError;

/// 수집 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// 아직 시작하지 않음
    NotStarted,
    /// (재)목록 조회 중
    Synchronizing,
    /// 초기 목록 완료, 실시간 watch 중
    Streaming,
    /// 전송 에러 후 재연결 대기 중
    ///
    /// 다음 `Observed` 또는 재목록 완료(`Synced`)를 받아야 `Streaming`으로 돌아갑니다.
    /// 재목록 없이 watch만 조용히 재개되면 새 이벤트가 올 때까지 이 상태로 남아
    /// health가 `Degraded`로 보고됩니다.
    Reconnecting,
    /// 정지됨
    Stopped,
}

impl IngestState {
    /// 상태 이름
    pub fn name(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Synchronizing => "synchronizing",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
        }
    }

    /// 실시간 이벤트를 처리 중인지 확인합니다.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// 상태만으로 판단한 건강 상태 (저장소 연결은 고려하지 않음)
    pub fn health_status(self) -> HealthStatus {
        match self {
            Self::Streaming => HealthStatus::Healthy,
            Self::Synchronizing => {
                HealthStatus::Degraded("initial event listing in progress".to_owned())
            }
            Self::Reconnecting => HealthStatus::Degraded("event watch reconnecting".to_owned()),
            Self::NotStarted => HealthStatus::Unhealthy("not started".to_owned()),
            Self::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 수집 상태 관찰 핸들
///
/// 테스트와 데몬이 `Streaming` 진입을 결정적으로 기다릴 때 사용합니다.
#[derive(Clone)]
pub struct ReadinessHandle {
    rx: watch::Receiver<IngestState>,
}

impl ReadinessHandle {
    /// 현재 상태
    pub fn current(&self) -> IngestState {
        *self.rx.borrow()
    }

    /// `Streaming`에 도달할 때까지 기다립니다.
    ///
    /// # Errors
    ///
    /// 그 전에 파이프라인이 정지되면 `IngestError::Stopped`
    pub async fn wait_ready(&mut self) -> Result<(), IngestError> {
        let state = self
            .wait_for(|s| s.is_ready() || s == IngestState::Stopped)
            .await?;
        if state.is_ready() {
            Ok(())
        } else {
            Err(IngestError::Stopped)
        }
    }

    /// 조건을 만족하는 상태가 될 때까지 기다린 뒤 그 상태를 반환합니다.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(IngestState) -> bool,
    ) -> Result<IngestState, IngestError> {
        self.rx
            .wait_for(|s| predicate(*s))
            .await
            .map(|s| *s)
            .map_err(|_| IngestError::Stopped)
    }

    /// 다음 상태 변경을 기다립니다.
    pub async fn changed(&mut self) -> Result<IngestState, IngestError> {
        self.rx.changed().await.map_err(|_| IngestError::Stopped)?;
        Ok(*self.rx.borrow_and_update())
    }
}

/// 수집 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// 관측된 이벤트 수
    pub observed: u64,
    /// 새로 기록된 이벤트 수
    pub inserted: u64,
    /// 이미 기록되어 있던 이벤트 수
    pub duplicates: u64,
    /// 저장 실패로 건너뛴 이벤트 수
    pub store_errors: u64,
    /// Warning이 아니어서 건너뛴 이벤트 수
    pub skipped: u64,
    /// 방송한 이벤트 수
    pub published: u64,
    /// 재연결 횟수
    pub reconnects: u64,
}

#[derive(Default)]
struct Counters {
    observed: AtomicU64,
    inserted: AtomicU64,
    duplicates: AtomicU64,
    store_errors: AtomicU64,
    skipped: AtomicU64,
    published: AtomicU64,
    reconnects: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> IngestStats {
        IngestStats {
            observed: self.observed.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Warning 이벤트 수집 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use kubewarn_ingest::IngestionPipelineBuilder;
///
/// let mut pipeline = IngestionPipelineBuilder::new()
///     .config(config)
///     .source(Arc::new(source))
///     .store(Arc::clone(&store))
///     .build()?;
///
/// pipeline.start().await?;
/// pipeline.readiness().wait_ready().await?;
/// ```
pub struct IngestionPipeline<E: EventSource, S: EventStore> {
    config: IngestPipelineConfig,
    filter: EventFilter,
    source: Arc<E>,
    store: Arc<S>,
    broadcaster: Broadcaster,
    state_tx: Arc<watch::Sender<IngestState>>,
    state_rx: watch::Receiver<IngestState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl<E: EventSource, S: EventStore> IngestionPipeline<E, S> {
    /// 현재 수집 상태
    pub fn state(&self) -> IngestState {
        *self.state_rx.borrow()
    }

    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &'static str {
        self.state().name()
    }

    /// 상태 관찰 핸들
    pub fn readiness(&self) -> ReadinessHandle {
        ReadinessHandle {
            rx: self.state_rx.clone(),
        }
    }

    /// 방송기 (API 모듈과 공유)
    pub fn broadcaster(&self) -> Broadcaster {
        self.broadcaster.clone()
    }

    /// 저장소 (조회 서비스와 공유)
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// 적용 중인 watch 필터
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// 방송 정책
    pub fn publish_policy(&self) -> PublishPolicy {
        self.config.publish_policy
    }

    /// 수집 통계 스냅샷
    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }
}

impl<E: EventSource, S: EventStore> Pipeline for IngestionPipeline<E, S> {
    async fn start(&mut self) -> Result<(), KubewarnError> {
        match self.state() {
            IngestState::NotStarted => {}
            IngestState::Stopped => {
                return Err(PipelineError::InitFailed(
                    "ingestion pipeline cannot be restarted; rebuild it".to_owned(),
                )
                .into());
            }
            _ => return Err(PipelineError::AlreadyRunning.into()),
        }

        info!(
            filter = %self.filter,
            policy = %self.config.publish_policy,
            "starting ingestion pipeline"
        );

        // 1. API 서버 접근 확인 (실패 시 기동 실패)
        self.source.connect().await.map_err(IngestError::from)?;

        // 2. watch 시작 및 수집 태스크 스폰
        let stream = self.source.watch(self.filter.clone());
        self.state_tx.send_replace(IngestState::Synchronizing);

        let worker = Worker {
            store: Arc::clone(&self.store),
            broadcaster: self.broadcaster.clone(),
            policy: self.config.publish_policy,
            state_tx: Arc::clone(&self.state_tx),
            counters: Arc::clone(&self.counters),
        };
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(worker.run(stream, cancel)));

        info!("ingestion pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), KubewarnError> {
        let Some(task) = self.task.take() else {
            return Err(PipelineError::NotRunning.into());
        };

        info!("stopping ingestion pipeline");

        // 진행 중인 put/publish는 끝까지 수행된 뒤 루프가 종료됨
        self.cancel.cancel();
        if let Err(e) = task.await {
            error!(error = %e, "ingestion task terminated abnormally");
        }

        self.broadcaster.close_all();
        self.state_tx.send_replace(IngestState::Stopped);

        let stats = self.stats();
        info!(
            observed = stats.observed,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            store_errors = stats.store_errors,
            "ingestion pipeline stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        let state = self.state();
        if !state.is_ready() {
            return state.health_status();
        }
        match self.store.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Degraded(format!("event store unreachable: {e}")),
        }
    }
}

/// 수집 태스크가 소유하는 상태
struct Worker<S: EventStore> {
    store: Arc<S>,
    broadcaster: Broadcaster,
    policy: PublishPolicy,
    state_tx: Arc<watch::Sender<IngestState>>,
    counters: Arc<Counters>,
}

impl<S: EventStore> Worker<S> {
    async fn run(self, mut stream: SourceStream, cancel: CancellationToken) {
        loop {
            // 취소는 다음 항목을 기다리는 동안에만 적용됨
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("ingestion loop cancelled");
                    break;
                }
                item = stream.next() => item,
            };

            let Some(item) = item else {
                error!("event source stream ended unexpectedly");
                self.state_tx.send_replace(IngestState::Stopped);
                break;
            };

            match item {
                SourceEvent::Resync => {
                    debug!("event listing started");
                    self.transition(IngestState::Synchronizing);
                }
                SourceEvent::Observed(event) => {
                    // 재목록 없이 watch가 재개된 경우
                    if self.current() == IngestState::Reconnecting {
                        self.transition(IngestState::Streaming);
                    }
                    self.handle_observed(event).await;
                }
                SourceEvent::Synced => {
                    metrics::counter!(m::SOURCE_SYNCS_TOTAL).increment(1);
                    self.transition(IngestState::Streaming);
                }
                SourceEvent::Disconnected(reason) => {
                    warn!(reason = %reason, "event watch disconnected, retrying with backoff");
                    self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(m::SOURCE_RECONNECTS_TOTAL).increment(1);
                    self.transition(IngestState::Reconnecting);
                }
            }
        }
    }

    fn current(&self) -> IngestState {
        *self.state_tx.borrow()
    }

    fn transition(&self, next: IngestState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "ingestion state changed");
        }
    }

    async fn handle_observed(&self, event: WarningEvent) {
        self.counters.observed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::INGEST_EVENTS_OBSERVED_TOTAL).increment(1);

        // 서버 측 필터는 보조 수단이므로 다시 확인
        if !event.is_warning() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::INGEST_SKIPPED_TOTAL).increment(1);
            debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                "skipping non-warning event"
            );
            return;
        }

        let started = Instant::now();
        let outcome = self.store.put(&event).await;
        let result = match &outcome {
            Ok(PutOutcome::Inserted) => "inserted",
            Ok(PutOutcome::AlreadyExists) => "duplicate",
            Err(_) => "error",
        };
        metrics::histogram!(m::INGEST_PUT_DURATION_SECONDS, m::LABEL_RESULT => result)
            .record(started.elapsed().as_secs_f64());

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::INGEST_STORE_ERRORS_TOTAL).increment(1);
                error!(event_id = %event.id, error = %e, "failed to record event, skipping");
                return;
            }
        };

        match outcome {
            PutOutcome::Inserted => {
                self.counters.inserted.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::INGEST_EVENTS_INSERTED_TOTAL).increment(1);
                info!(%event, "warning event recorded");
            }
            PutOutcome::AlreadyExists => {
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::INGEST_DUPLICATES_TOTAL).increment(1);
                debug!(event_id = %event.id, "warning event already recorded");
            }
        }

        if self.policy.should_publish(outcome) {
            self.counters.published.fetch_add(1, Ordering::Relaxed);
            let report = self.broadcaster.publish(event.into_document());
            debug!(
                delivered = report.delivered,
                dropped = report.dropped(),
                "event published to live subscribers"
            );
        }
    }
}

/// 수집 파이프라인 빌더
pub struct IngestionPipelineBuilder<E: EventSource, S: EventStore> {
    config: IngestPipelineConfig,
    filter: EventFilter,
    source: Option<Arc<E>>,
    store: Option<Arc<S>>,
    broadcaster: Option<Broadcaster>,
}

impl<E: EventSource, S: EventStore> IngestionPipelineBuilder<E, S> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: IngestPipelineConfig::default(),
            filter: EventFilter::default(),
            source: None,
            store: None,
            broadcaster: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: IngestPipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// watch 필터를 지정합니다. 기본값은 전체 네임스페이스의 Warning 이벤트입니다.
    pub fn filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    /// 이벤트 소스를 설정합니다.
    pub fn source(mut self, source: Arc<E>) -> Self {
        self.source = Some(source);
        self
    }

    /// 저장소를 설정합니다.
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// 외부 방송기를 설정합니다.
    ///
    /// 설정하지 않으면 설정값으로 새 방송기를 생성합니다.
    pub fn broadcaster(mut self, broadcaster: Broadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<IngestionPipeline<E, S>, IngestError> {
        self.config.validate()?;

        let source = self.source.ok_or_else(|| IngestError::Config {
            field: "source".to_owned(),
            reason: "event source must be provided".to_owned(),
        })?;
        let store = self.store.ok_or_else(|| IngestError::Config {
            field: "store".to_owned(),
            reason: "event store must be provided".to_owned(),
        })?;
        let broadcaster = self.broadcaster.unwrap_or_else(|| {
            Broadcaster::new(
                self.config.subscriber_queue_capacity,
                self.config.max_subscribers,
            )
        });

        let (state_tx, state_rx) = watch::channel(IngestState::NotStarted);

        Ok(IngestionPipeline {
            config: self.config,
            filter: self.filter,
            source,
            store,
            broadcaster,
            state_tx: Arc::new(state_tx),
            state_rx,
            cancel: CancellationToken::new(),
            task: None,
            counters: Arc::new(Counters::default()),
        })
    }
}

impl<E: EventSource, S: EventStore> Default for IngestionPipelineBuilder<E, S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubewarn_event_source::MemoryEventSource;
    use kubewarn_event_store::MemoryEventStore;
    use serde_json::json;

    fn warning(id: &str) -> WarningEvent {
        WarningEvent::new(id, "Warning", json!({"metadata": {"uid": id}, "type": "Warning"}))
    }

    fn build(
        source: MemoryEventSource,
        store: Arc<MemoryEventStore>,
    ) -> IngestionPipeline<MemoryEventSource, MemoryEventStore> {
        IngestionPipelineBuilder::new()
            .source(Arc::new(source))
            .store(store)
            .build()
            .unwrap()
    }

    #[test]
    fn build_requires_source_and_store() {
        let result = IngestionPipelineBuilder::<MemoryEventSource, MemoryEventStore>::new()
            .store(Arc::new(MemoryEventStore::new()))
            .build();
        assert!(matches!(result, Err(IngestError::Config { ref field, .. }) if field == "source"));

        let result = IngestionPipelineBuilder::<MemoryEventSource, MemoryEventStore>::new()
            .source(Arc::new(MemoryEventSource::scripted(Vec::new())))
            .build();
        assert!(matches!(result, Err(IngestError::Config { ref field, .. }) if field == "store"));
    }

    #[test]
    fn build_rejects_invalid_config() {
        let result = IngestionPipelineBuilder::<MemoryEventSource, MemoryEventStore>::new()
            .config(IngestPipelineConfig {
                subscriber_queue_capacity: 0,
                ..Default::default()
            })
            .source(Arc::new(MemoryEventSource::scripted(Vec::new())))
            .store(Arc::new(MemoryEventStore::new()))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn new_pipeline_is_not_started_and_unhealthy() {
        let pipeline = build(
            MemoryEventSource::scripted(Vec::new()),
            Arc::new(MemoryEventStore::new()),
        );
        assert_eq!(pipeline.state(), IngestState::NotStarted);
        assert_eq!(pipeline.state_name(), "not_started");
        assert!(pipeline.health_check().await.is_unhealthy());
    }

    #[tokio::test]
    async fn start_records_listing_and_becomes_ready() {
        let store = Arc::new(MemoryEventStore::new());
        let mut pipeline = build(
            MemoryEventSource::listing(vec![warning("a"), warning("b")]),
            Arc::clone(&store),
        );

        pipeline.start().await.unwrap();
        pipeline.readiness().wait_ready().await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(pipeline.health_check().await.is_healthy());
        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state(), IngestState::Stopped);
    }

    #[tokio::test]
    async fn connect_failure_fails_start() {
        let mut pipeline = build(
            MemoryEventSource::scripted(Vec::new()).failing_connect("forbidden"),
            Arc::new(MemoryEventStore::new()),
        );
        let err = pipeline.start().await.unwrap_err();
        assert!(matches!(err, KubewarnError::Source(_)));
        assert_eq!(pipeline.state(), IngestState::NotStarted);
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let mut pipeline = build(
            MemoryEventSource::scripted(Vec::new()),
            Arc::new(MemoryEventStore::new()),
        );
        pipeline.start().await.unwrap();
        assert!(matches!(
            pipeline.start().await,
            Err(KubewarnError::Pipeline(PipelineError::AlreadyRunning))
        ));
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_rejected() {
        let mut pipeline = build(
            MemoryEventSource::scripted(Vec::new()),
            Arc::new(MemoryEventStore::new()),
        );
        assert!(matches!(
            pipeline.stop().await,
            Err(KubewarnError::Pipeline(PipelineError::NotRunning))
        ));
    }

    #[tokio::test]
    async fn restart_after_stop_is_rejected() {
        let mut pipeline = build(
            MemoryEventSource::scripted(Vec::new()),
            Arc::new(MemoryEventStore::new()),
        );
        pipeline.start().await.unwrap();
        pipeline.stop().await.unwrap();
        assert!(matches!(
            pipeline.start().await,
            Err(KubewarnError::Pipeline(PipelineError::InitFailed(_)))
        ));
    }

    #[tokio::test]
    async fn stop_closes_subscribers() {
        let mut pipeline = build(
            MemoryEventSource::scripted(Vec::new()),
            Arc::new(MemoryEventStore::new()),
        );
        let mut sub = pipeline.broadcaster().subscribe().unwrap();
        pipeline.start().await.unwrap();
        pipeline.stop().await.unwrap();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn wait_ready_fails_when_stopped_first() {
        let mut pipeline = build(
            MemoryEventSource::scripted(Vec::new()),
            Arc::new(MemoryEventStore::new()),
        );
        let mut readiness = pipeline.readiness();
        pipeline.start().await.unwrap();
        pipeline.stop().await.unwrap();
        assert!(matches!(
            readiness.wait_ready().await,
            Err(IngestError::Stopped)
        ));
    }

    #[test]
    fn state_names() {
        assert_eq!(IngestState::Synchronizing.to_string(), "synchronizing");
        assert_eq!(IngestState::Reconnecting.name(), "reconnecting");
        assert!(IngestState::Streaming.is_ready());
        assert!(!IngestState::Reconnecting.is_ready());
    }
}
