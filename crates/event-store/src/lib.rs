#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 타입 (`StoreError`)
//! - [`store`]: `EventStore` trait, `PutOutcome`, `StoredEvent`
//! - [`postgres`]: `PgEventStore`
//! - [`memory`]: `MemoryEventStore`
//! - [`backend`]: `AnyEventStore` (설정 기반 선택)

pub mod backend;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use backend::AnyEventStore;
pub use error::StoreError;
pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;
pub use store::{EventStore, PutOutcome, StoredEvent};
