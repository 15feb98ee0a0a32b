//! 이벤트 저장소 trait과 레코드 타입
//!
//! 저장소는 시스템의 기록 원본입니다. 실시간 전달이 실패해도
//! 저장된 이벤트는 조회 API로 언제든 다시 읽을 수 있습니다.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use kubewarn_core::{EventDocument, WarningEvent};

use crate::error::StoreError;

/// `put` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// 새로 기록됨 (이 시점에 커밋 완료)
    Inserted,
    /// 같은 id의 레코드가 이미 존재함
    AlreadyExists,
}

impl PutOutcome {
    /// 새로 기록되었는지 확인합니다.
    pub fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

impl fmt::Display for PutOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inserted => write!(f, "inserted"),
            Self::AlreadyExists => write!(f, "already_exists"),
        }
    }
}

/// 저장된 이벤트 레코드
///
/// `seq`와 `recorded_at`은 저장소 내부 필드이며 외부로 노출되지 않습니다.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// 저장소가 부여한 순번
    pub seq: i64,
    /// 커밋 시각
    pub recorded_at: DateTime<Utc>,
    /// 원본 이벤트
    pub event: WarningEvent,
}

impl StoredEvent {
    /// 이벤트 ID
    pub fn id(&self) -> &str {
        &self.event.id
    }

    /// 내부 필드를 제거한 외부 노출용 문서로 변환합니다.
    pub fn into_document(self) -> EventDocument {
        self.event.into_document()
    }
}

/// 이벤트 저장소 trait
///
/// # 구현체
///
/// - [`PgEventStore`](crate::PgEventStore): PostgreSQL
/// - [`MemoryEventStore`](crate::MemoryEventStore): 메모리 (비영속)
/// - [`AnyEventStore`](crate::AnyEventStore): 설정 기반 선택
pub trait EventStore: Send + Sync + 'static {
    /// 이벤트를 기록합니다.
    ///
    /// 같은 id에 대한 동시 호출 중 정확히 하나만 `Inserted`를 받습니다.
    fn put(
        &self,
        event: &WarningEvent,
    ) -> impl Future<Output = Result<PutOutcome, StoreError>> + Send;

    /// id로 레코드를 조회합니다.
    fn get_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<StoredEvent>, StoreError>> + Send;

    /// 커밋된 모든 레코드를 `seq` 순서로 반환합니다.
    fn list_all(&self) -> impl Future<Output = Result<Vec<StoredEvent>, StoreError>> + Send;

    /// 저장소 연결 상태를 확인합니다.
    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<S: EventStore> EventStore for Arc<S> {
    fn put(
        &self,
        event: &WarningEvent,
    ) -> impl Future<Output = Result<PutOutcome, StoreError>> + Send {
        S::put(self, event)
    }

    fn get_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<StoredEvent>, StoreError>> + Send {
        S::get_by_id(self, id)
    }

    fn list_all(&self) -> impl Future<Output = Result<Vec<StoredEvent>, StoreError>> + Send {
        S::list_all(self)
    }

    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send {
        S::ping(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stored_event_document_strips_internal_fields() {
        let stored = StoredEvent {
            seq: 7,
            recorded_at: Utc::now(),
            event: WarningEvent::new("evt-1", "Warning", json!({"reason": "Failed"})),
        };
        assert_eq!(stored.id(), "evt-1");

        let value = serde_json::to_value(stored.into_document()).unwrap();
        assert_eq!(value, json!({"id": "evt-1", "data": {"reason": "Failed"}}));
    }

    #[test]
    fn put_outcome_display() {
        assert_eq!(PutOutcome::Inserted.to_string(), "inserted");
        assert_eq!(PutOutcome::AlreadyExists.to_string(), "already_exists");
        assert!(PutOutcome::Inserted.is_inserted());
        assert!(!PutOutcome::AlreadyExists.is_inserted());
    }
}
