//! 수집 파이프라인 에러 타입
//!
//! `From<IngestError> for KubewarnError` 변환이 구현되어 있어
//! 데몬에서 `?` 연산자로 전파할 수 있습니다.

use kubewarn_core::error::{ConfigError, KubewarnError, PipelineError};
use kubewarn_event_source::EventSourceError;
use kubewarn_event_store::StoreError;

/// 수집 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 이벤트 소스 에러
    #[error(transparent)]
    Source(#[from] EventSourceError),

    /// 저장소 에러
    #[error(transparent)]
    Store(#[from] StoreError),

    /// 구독자 수 상한 도달
    #[error("subscriber limit reached ({0})")]
    SubscriberLimit(usize),

    /// 방송기가 닫힘 (종료 중)
    #[error("broadcaster is closed")]
    BroadcasterClosed,

    /// 파이프라인이 Streaming에 도달하기 전에 정지됨
    #[error("pipeline stopped before becoming ready")]
    Stopped,
}

impl From<IngestError> for KubewarnError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Config { field, reason } => {
                KubewarnError::Config(ConfigError::InvalidValue { field, reason })
            }
            IngestError::Source(e) => e.into(),
            IngestError::Store(e) => e.into(),
            other => KubewarnError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
