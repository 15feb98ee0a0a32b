//! 메모리 이벤트 저장소
//!
//! 프로세스가 종료되면 내용이 사라집니다. 개발용 백엔드와 테스트에 사용합니다.
//! 유일성 판단과 삽입은 하나의 뮤텍스 구간 안에서 일어나므로 원자적입니다.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use kubewarn_core::WarningEvent;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{EventStore, PutOutcome, StoredEvent};

#[derive(Default)]
struct Records {
    next_seq: i64,
    by_id: HashMap<String, StoredEvent>,
    order: Vec<String>,
}

/// 메모리 이벤트 저장소
#[derive(Default)]
pub struct MemoryEventStore {
    records: Mutex<Records>,
    unavailable: AtomicBool,
}

impl MemoryEventStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장소 장애를 흉내 냅니다. `true`이면 모든 연산이 `StoreError::Connection`을 반환합니다.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 저장된 레코드 수
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.order.len()).unwrap_or(0)
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(
                "memory store marked unavailable".to_owned(),
            ));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Records>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Connection("memory store lock poisoned".to_owned()))
    }
}

impl EventStore for MemoryEventStore {
    async fn put(&self, event: &WarningEvent) -> Result<PutOutcome, StoreError> {
        self.check_available()?;
        let mut records = self.lock()?;

        if records.by_id.contains_key(&event.id) {
            debug!(event_id = %event.id, "event already recorded");
            return Ok(PutOutcome::AlreadyExists);
        }

        records.next_seq += 1;
        let stored = StoredEvent {
            seq: records.next_seq,
            recorded_at: Utc::now(),
            event: event.clone(),
        };
        records.order.push(event.id.clone());
        records.by_id.insert(event.id.clone(), stored);
        Ok(PutOutcome::Inserted)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredEvent>, StoreError> {
        self.check_available()?;
        Ok(self.lock()?.by_id.get(id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<StoredEvent>, StoreError> {
        self.check_available()?;
        let records = self.lock()?;
        Ok(records
            .order
            .iter()
            .filter_map(|id| records.by_id.get(id).cloned())
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
