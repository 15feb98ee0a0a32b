//! 이벤트 소스 에러 타입
//!
//! `From<EventSourceError> for KubewarnError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use kubewarn_core::error::{KubewarnError, SourceError};

/// 이벤트 소스 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EventSourceError {
    /// Kubernetes 클라이언트 생성 실패 (kubeconfig / in-cluster 설정 없음 등)
    #[error("kubernetes client error: {0}")]
    Client(String),

    /// API 서버에 접근할 수 없거나 이벤트 목록 조회 권한이 없음
    #[error("kubernetes api unreachable: {0}")]
    Connection(String),
}

impl From<EventSourceError> for KubewarnError {
    fn from(err: EventSourceError) -> Self {
        match err {
            EventSourceError::Client(msg) | EventSourceError::Connection(msg) => {
                KubewarnError::Source(SourceError::Connection(msg))
            }
        }
    }
}
