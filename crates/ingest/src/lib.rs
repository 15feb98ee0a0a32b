#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 타입 (`IngestError`)
//! - [`config`]: 파이프라인 설정 (`IngestPipelineConfig`, `PublishPolicy`)
//! - [`broadcast`]: 실시간 구독자 관리 (`Broadcaster`, `Subscription`)
//! - [`pipeline`]: 수집 파이프라인 (`IngestionPipeline`, `IngestState`, `ReadinessHandle`)
//! - [`query`]: 조회 서비스 (`QueryService`)

pub mod broadcast;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod query;

pub use broadcast::{Broadcaster, PublishReport, SubscriberId, Subscription};
pub use config::{IngestPipelineConfig, PublishPolicy};
pub use error::IngestError;
pub use pipeline::{
    IngestState, IngestStats, IngestionPipeline, IngestionPipelineBuilder, ReadinessHandle,
};
pub use query::QueryService;
