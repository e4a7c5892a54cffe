//! Core data model definitions shared across taskwatch crates.
//!
//! Everything in here is a wire type as well as a domain type: task records
//! arrive both as pushed stream envelopes and as polled JSON bodies, so the
//! decoding is deliberately tolerant (naive timestamps, legacy field names,
//! string-encoded entity lists).
#![allow(missing_docs)]

pub mod actions;
pub mod entity;
pub mod error;
pub mod events;
pub mod ids;
pub mod status;
pub mod task;
pub mod timestamp;

pub use actions::{BatchDownloadRequest, BatchDownloadSummary, TaskAccepted};
pub use entity::parse_entity_list;
pub use error::{ModelError, Result as ModelResult};
pub use events::{StreamEventKind, TaskEventEnvelope};
pub use ids::{EntityId, TaskId, TaskType};
pub use status::TaskStatus;
pub use task::{TaskRecord, TaskUpdate, UpdateSource};
pub use timestamp::parse_timestamp;
