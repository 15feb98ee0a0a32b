//! 이벤트 저장소 에러 타입
//!
//! 중복 삽입은 에러가 아닙니다. [`PutOutcome::AlreadyExists`](crate::PutOutcome)로 표현됩니다.

use kubewarn_core::error::{KubewarnError, StorageError};

/// 이벤트 저장소 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 연결 실패 또는 저장소 사용 불가
    #[error("store unavailable: {0}")]
    Connection(String),

    /// 스키마 생성/검증 실패
    #[error("schema setup failed: {0}")]
    Schema(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 레코드 변환 실패
    #[error("record decode failed: {0}")]
    Decode(String),
}

impl StoreError {
    /// 연결 계열 에러인지 확인합니다 (health check 판단용).
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_) => StoreError::Connection(err.to_string()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => StoreError::Decode(err.to_string()),
            other => StoreError::Query(other.to_string()),
        }
    }
}

impl From<StoreError> for KubewarnError {
    fn from(err: StoreError) -> Self {
        let storage = match err {
            StoreError::Connection(msg) => StorageError::Connection(msg),
            StoreError::Schema(msg) | StoreError::Query(msg) => StorageError::Query(msg),
            StoreError::Decode(msg) => StorageError::Serialization(msg),
        };
        KubewarnError::Storage(storage)
    }
}
