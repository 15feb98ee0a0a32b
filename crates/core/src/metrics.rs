//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `kubewarn_`
//! - 모듈명: `source_`, `ingest_`, `store_`, `broadcast_`, `api_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (inserted, duplicate, error)
pub const LABEL_RESULT: &str = "result";

/// 엔드포인트 레이블 키 (list, get)
pub const LABEL_ENDPOINT: &str = "endpoint";

// ─── Event Source 메트릭 ────────────────────────────────────────────

/// Source: watch 재연결 횟수 (counter)
pub const SOURCE_RECONNECTS_TOTAL: &str = "kubewarn_source_reconnects_total";

/// Source: 초기/재 목록 동기화 완료 횟수 (counter)
pub const SOURCE_SYNCS_TOTAL: &str = "kubewarn_source_syncs_total";

// ─── Ingest Pipeline 메트릭 ─────────────────────────────────────────

/// Ingest: 관측된 이벤트 수 (counter)
pub const INGEST_EVENTS_OBSERVED_TOTAL: &str = "kubewarn_ingest_events_observed_total";

/// Ingest: 새로 기록된 이벤트 수 (counter)
pub const INGEST_EVENTS_INSERTED_TOTAL: &str = "kubewarn_ingest_events_inserted_total";

/// Ingest: 이미 기록되어 있던 이벤트 수 (counter)
pub const INGEST_DUPLICATES_TOTAL: &str = "kubewarn_ingest_duplicates_total";

/// Ingest: 스토어 쓰기 실패 수 (counter)
pub const INGEST_STORE_ERRORS_TOTAL: &str = "kubewarn_ingest_store_errors_total";

/// Ingest: Warning이 아니어서 건너뛴 이벤트 수 (counter)
pub const INGEST_SKIPPED_TOTAL: &str = "kubewarn_ingest_skipped_total";

/// Ingest: 스토어 put 지연 시간 (histogram, 초)
pub const INGEST_PUT_DURATION_SECONDS: &str = "kubewarn_ingest_put_duration_seconds";

// ─── Broadcast 메트릭 ───────────────────────────────────────────────

/// Broadcast: 현재 구독자 수 (gauge)
pub const BROADCAST_SUBSCRIBERS: &str = "kubewarn_broadcast_subscribers";

/// Broadcast: publish 호출 수 (counter)
pub const BROADCAST_PUBLISHED_TOTAL: &str = "kubewarn_broadcast_published_total";

/// Broadcast: 전달 실패로 제거된 구독자 수 (counter)
pub const BROADCAST_DROPPED_SUBSCRIBERS_TOTAL: &str =
    "kubewarn_broadcast_dropped_subscribers_total";

// ─── API 메트릭 ─────────────────────────────────────────────────────

/// API: 조회 요청 수 (counter, label: endpoint)
pub const API_QUERIES_TOTAL: &str = "kubewarn_api_queries_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "kubewarn_daemon_uptime_seconds";

/// Daemon: 등록된 모듈 수 (gauge)
pub const DAEMON_MODULES_REGISTERED: &str = "kubewarn_daemon_modules_registered";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "kubewarn_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 스토어 쓰기 지연 시간 히스토그램 버킷 (초)
///
/// 1ms ~ 5s 범위 (네트워크 왕복 포함)
pub const PUT_DURATION_BUCKETS: [f64; 9] = [0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0, 5.0];

/// 전체 메트릭 이름 목록
pub const ALL_METRIC_NAMES: &[&str] = &[
    SOURCE_RECONNECTS_TOTAL,
    SOURCE_SYNCS_TOTAL,
    INGEST_EVENTS_OBSERVED_TOTAL,
    INGEST_EVENTS_INSERTED_TOTAL,
    INGEST_DUPLICATES_TOTAL,
    INGEST_STORE_ERRORS_TOTAL,
    INGEST_SKIPPED_TOTAL,
    INGEST_PUT_DURATION_SECONDS,
    BROADCAST_SUBSCRIBERS,
    BROADCAST_PUBLISHED_TOTAL,
    BROADCAST_DROPPED_SUBSCRIBERS_TOTAL,
    API_QUERIES_TOTAL,
    DAEMON_UPTIME_SECONDS,
    DAEMON_MODULES_REGISTERED,
    DAEMON_BUILD_INFO,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `kubewarn-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Event Source
    describe_counter!(
        SOURCE_RECONNECTS_TOTAL,
        "Number of times the Kubernetes event watch disconnected and resumed"
    );
    describe_counter!(
        SOURCE_SYNCS_TOTAL,
        "Number of completed initial or resync event listings"
    );

    // Ingest
    describe_counter!(
        INGEST_EVENTS_OBSERVED_TOTAL,
        "Total events drawn from the event source"
    );
    describe_counter!(
        INGEST_EVENTS_INSERTED_TOTAL,
        "Events newly recorded in the event store"
    );
    describe_counter!(
        INGEST_DUPLICATES_TOTAL,
        "Observed events that were already recorded"
    );
    describe_counter!(
        INGEST_STORE_ERRORS_TOTAL,
        "Events skipped because the store write failed"
    );
    describe_counter!(
        INGEST_SKIPPED_TOTAL,
        "Events skipped because they were not Warning events"
    );
    describe_histogram!(
        INGEST_PUT_DURATION_SECONDS,
        "Event store put latency in seconds"
    );

    // Broadcast
    describe_gauge!(BROADCAST_SUBSCRIBERS, "Currently connected live subscribers");
    describe_counter!(
        BROADCAST_PUBLISHED_TOTAL,
        "Events offered to live subscribers"
    );
    describe_counter!(
        BROADCAST_DROPPED_SUBSCRIBERS_TOTAL,
        "Subscribers disconnected because their queue was full or closed"
    );

    // API
    describe_counter!(API_QUERIES_TOTAL, "Historical query requests served");

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(DAEMON_MODULES_REGISTERED, "Number of registered modules");
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
}
