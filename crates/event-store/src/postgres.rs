//! PostgreSQL 이벤트 저장소
//!
//! # 스키마
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS warning_events (
//!     seq         BIGSERIAL PRIMARY KEY,
//!     uid         TEXT NOT NULL UNIQUE,
//!     event_type  TEXT NOT NULL,
//!     data        JSONB NOT NULL,
//!     recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! )
//! ```
//!
//! 삽입 여부는 `ON CONFLICT (uid) DO NOTHING RETURNING seq`가 결정합니다.
//! 행이 반환되면 새로 기록된 것이고, 반환되지 않으면 이미 존재하던 것입니다.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kubewarn_core::WarningEvent;
use kubewarn_core::config::StorageConfig;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{EventStore, PutOutcome, StoredEvent};

/// 이벤트 테이블 이름
pub const TABLE_NAME: &str = "warning_events";

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS warning_events (
    seq         BIGSERIAL PRIMARY KEY,
    uid         TEXT NOT NULL UNIQUE,
    event_type  TEXT NOT NULL,
    data        JSONB NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// PostgreSQL 이벤트 저장소
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// 커넥션 풀을 만들고 스키마를 보장합니다.
    ///
    /// # Errors
    ///
    /// - 연결 실패: `StoreError::Connection`
    /// - 테이블 생성 실패: `StoreError::Schema`
    pub async fn connect(
        url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self::from_pool(pool);
        store.ensure_schema().await?;
        info!(max_connections, "postgres event store ready");
        Ok(store)
    }

    /// 코어 설정에서 저장소를 연결합니다.
    pub async fn from_core(config: &StorageConfig) -> Result<Self, StoreError> {
        Self::connect(
            &config.postgres_url,
            config.max_connections,
            Duration::from_secs(config.connect_timeout_secs),
        )
        .await
    }

    /// 기존 풀로 저장소를 생성합니다. 스키마는 보장하지 않습니다.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 이벤트 테이블이 없으면 생성합니다.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        debug!(table = TABLE_NAME, "event table ensured");
        Ok(())
    }

    /// 커넥션 풀을 닫습니다.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn map_row(row: &PgRow) -> Result<StoredEvent, StoreError> {
        let seq: i64 = row.try_get("seq")?;
        let uid: String = row.try_get("uid")?;
        let event_type: String = row.try_get("event_type")?;
        let Json(data): Json<serde_json::Value> = row.try_get("data")?;
        let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;

        Ok(StoredEvent {
            seq,
            recorded_at,
            event: WarningEvent::new(uid, event_type, data),
        })
    }
}

impl EventStore for PgEventStore {
    async fn put(&self, event: &WarningEvent) -> Result<PutOutcome, StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO warning_events (uid, event_type, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (uid) DO NOTHING
            RETURNING seq
            "#,
        )
        .bind(&event.id)
        .bind(&event.event_type)
        .bind(Json(&event.payload))
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => {
                let seq: i64 = row.try_get("seq")?;
                debug!(event_id = %event.id, seq, "event recorded");
                Ok(PutOutcome::Inserted)
            }
            None => Ok(PutOutcome::AlreadyExists),
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredEvent>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT seq, uid, event_type, data, recorded_at
            FROM warning_events
            WHERE uid = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT seq, uid, event_type, data, recorded_at
            FROM warning_events
            ORDER BY seq
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }
}
