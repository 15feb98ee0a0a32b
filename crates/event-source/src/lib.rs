#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 타입 (`EventSourceError`)
//! - [`source`]: `EventSource` trait, `SourceEvent`, `EventFilter`
//! - [`kubernetes`]: `KubeEventSource` (Kubernetes API)
//! - [`memory`]: `MemoryEventSource` (테스트 지원)

pub mod error;
pub mod kubernetes;
pub mod memory;
pub mod source;

pub use error::EventSourceError;
pub use kubernetes::KubeEventSource;
pub use memory::{MemoryEventSource, MemorySourceHandle};
pub use source::{EventFilter, EventSource, SourceEvent, SourceStream};
