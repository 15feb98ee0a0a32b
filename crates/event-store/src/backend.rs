//! 설정 기반 저장소 선택
//!
//! `storage.backend` 값에 따라 런타임에 구현체를 고릅니다.
//! 파이프라인과 조회 서비스는 `S: EventStore` 제네릭이므로,
//! 열거형 디스패치로 하나의 구체 타입을 제공합니다.

use kubewarn_core::WarningEvent;
use kubewarn_core::config::StorageConfig;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::memory::MemoryEventStore;
use crate::postgres::PgEventStore;
use crate::store::{EventStore, PutOutcome, StoredEvent};

/// 런타임에 선택된 저장소
pub enum AnyEventStore {
    /// PostgreSQL
    Postgres(PgEventStore),
    /// 메모리
    Memory(MemoryEventStore),
}

impl AnyEventStore {
    /// 설정에 맞는 저장소에 연결합니다.
    ///
    /// # Errors
    ///
    /// 알 수 없는 백엔드이거나 PostgreSQL 연결/스키마 생성에 실패하면 에러를 반환합니다.
    pub async fn from_core(config: &StorageConfig) -> Result<Self, StoreError> {
        match config.backend.as_str() {
            "postgres" => Ok(Self::Postgres(PgEventStore::from_core(config).await?)),
            "memory" => {
                warn!("using in-memory event store; recorded events are lost on restart");
                Ok(Self::Memory(MemoryEventStore::new()))
            }
            other => Err(StoreError::Connection(format!(
                "unknown storage backend '{other}'"
            ))),
        }
    }

    /// 백엔드 이름
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }

    /// 연결 자원을 정리합니다.
    pub async fn close(&self) {
        if let Self::Postgres(store) = self {
            store.close().await;
            info!("postgres event store closed");
        }
    }
}

impl EventStore for AnyEventStore {
    async fn put(&self, event: &WarningEvent) -> Result<PutOutcome, StoreError> {
        match self {
            Self::Postgres(store) => store.put(event).await,
            Self::Memory(store) => store.put(event).await,
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredEvent>, StoreError> {
        match self {
            Self::Postgres(store) => store.get_by_id(id).await,
            Self::Memory(store) => store.get_by_id(id).await,
        }
    }

    async fn list_all(&self) -> Result<Vec<StoredEvent>, StoreError> {
        match self {
            Self::Postgres(store) => store.list_all().await,
            Self::Memory(store) => store.list_all().await,
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match self {
            Self::Postgres(store) => store.ping().await,
            Self::Memory(store) => store.ping().await,
        }
    }
}
