//! 이벤트 소스 추상화
//!
//! [`EventSource`]는 Kubernetes list+watch API를 감싸며,
//! 수집 파이프라인은 이 trait을 통해서만 이벤트를 받습니다.
//!
//! ```text
//! ┌────────────────────┐
//! │ IngestionPipeline  │
//! └─────────┬──────────┘
//!           │ watch(filter)
//!           ▼
//!    ┌─────────────┐
//!    │ EventSource │ (trait)
//!    └─────────────┘
//!       │        │
//!       ▼        ▼
//!   ┌──────┐ ┌────────┐
//!   │ Kube │ │ Memory │
//!   └──┬───┘ └────────┘
//!      ▼
//!  API server
//! ```

use std::fmt;
use std::future::Future;

use futures::stream::BoxStream;
use kubewarn_core::WarningEvent;
use kubewarn_core::config::KubernetesConfig;
use kubewarn_core::event::WARNING_FIELD_SELECTOR;

use crate::error::EventSourceError;

/// `watch()`가 반환하는 스트림 타입
pub type SourceStream = BoxStream<'static, SourceEvent>;

/// 이벤트 소스가 내보내는 항목
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// (재)목록 조회 시작
    Resync,
    /// 목록 조회 또는 watch로 관측된 이벤트
    Observed(WarningEvent),
    /// 초기(또는 재) 목록 조회 완료
    Synced,
    /// 전송 에러. 스트림은 백오프 후 스스로 재개됩니다.
    Disconnected(String),
}

impl SourceEvent {
    /// 상태 이름 (로그용)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Resync => "resync",
            Self::Observed(_) => "observed",
            Self::Synced => "synced",
            Self::Disconnected(_) => "disconnected",
        }
    }
}

/// watch 대상 선택 조건
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// 서버 측 필드 셀렉터 (예: `type=Warning`)
    pub field_selector: String,
    /// 감시할 네임스페이스. `None`이면 클러스터 전체
    pub namespace: Option<String>,
}

impl EventFilter {
    /// 전체 네임스페이스의 Warning 이벤트
    pub fn warnings() -> Self {
        Self {
            field_selector: WARNING_FIELD_SELECTOR.to_owned(),
            namespace: None,
        }
    }

    /// 네임스페이스를 지정합니다.
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// 코어 설정에서 필터를 생성합니다.
    ///
    /// 빈 네임스페이스는 클러스터 전체를 의미합니다.
    pub fn from_core(config: &KubernetesConfig) -> Self {
        let namespace = match config.namespace.trim() {
            "" => None,
            ns => Some(ns.to_owned()),
        };
        Self {
            field_selector: config.field_selector.clone(),
            namespace,
        }
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::warnings()
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in {}",
            self.field_selector,
            self.namespace.as_deref().unwrap_or("<all namespaces>")
        )
    }
}

/// Kubernetes 이벤트 소스 trait
///
/// # 구현체
///
/// - [`KubeEventSource`](crate::KubeEventSource): 운영 구현
/// - [`MemoryEventSource`](crate::MemoryEventSource): 테스트 구현
pub trait EventSource: Send + Sync + 'static {
    /// API 서버 접근 및 이벤트 목록 조회 가능 여부를 확인합니다.
    ///
    /// 실패는 기동 실패로 취급됩니다.
    fn connect(&self) -> impl Future<Output = Result<(), EventSourceError>> + Send;

    /// 끝나지 않는 이벤트 스트림을 시작합니다.
    ///
    /// 초기 전체 목록이 [`SourceEvent::Synced`]보다 먼저 전달되며,
    /// 전송 실패 후 재개될 때 이미 전달한 이벤트가 다시 올 수 있습니다.
    fn watch(&self, filter: EventFilter) -> SourceStream;
}
