//! 조회 서비스 -- 저장된 이벤트를 외부 문서 형태로 반환

use std::sync::Arc;

use kubewarn_core::metrics as m;
use kubewarn_core::EventDocument;
use kubewarn_event_store::{EventStore, StoreError};
use tracing::debug;

/// 저장소 읽기 전용 조회 서비스
///
/// 저장소의 기록 순서(시퀀스)대로 `{id, data}` 문서를 반환합니다.
pub struct QueryService<S: EventStore> {
    store: Arc<S>,
}

// S: Clone 제약 없이 복제
impl<S: EventStore> Clone for QueryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EventStore> QueryService<S> {
    /// 새 조회 서비스를 생성합니다.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// 기록된 모든 이벤트를 기록 순서대로 반환합니다.
    pub async fn list_all(&self) -> Result<Vec<EventDocument>, StoreError> {
        metrics::counter!(m::API_QUERIES_TOTAL, m::LABEL_ENDPOINT => "list").increment(1);
        let events = self.store.list_all().await?;
        debug!(count = events.len(), "listed stored events");
        Ok(events.into_iter().map(|e| e.into_document()).collect())
    }

    /// ID로 이벤트 하나를 조회합니다. 없으면 `None`입니다.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<EventDocument>, StoreError> {
        metrics::counter!(m::API_QUERIES_TOTAL, m::LABEL_ENDPOINT => "get").increment(1);
        Ok(self.store.get_by_id(id).await?.map(|e| e.into_document()))
    }

    /// 저장소 연결 확인
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}
