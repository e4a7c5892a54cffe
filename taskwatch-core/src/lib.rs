#![allow(missing_docs)]
//! Live task-status synchronization.
//!
//! A [`TaskSyncSession`] owns one push connection to the backend's event
//! stream, falls back to polling whenever that stream is degraded, folds
//! every update into a [`TaskRegistry`] ordered by each record's own
//! `updated_at`, and derives per-type busy sets through an
//! [`EntityBusyIndex`].

pub mod api;
mod backfill;
pub mod busy;
pub mod config;
pub mod error;
pub mod poller;
pub mod registry;
pub mod session;
pub mod stream;
pub mod subscriptions;
pub mod target;

pub use api::{ApiClient, ApiService};
pub use busy::{BusyHold, BusySet, EntityBusyIndex};
pub use config::{PollConfig, RegistryConfig, StreamConfig, SyncConfig};
pub use error::{Result, SyncError};
pub use poller::FallbackPoller;
pub use registry::{MergeOutcome, RegistryObserver, TaskRegistry, TypeSnapshot};
pub use session::{BusyWatch, Submission, TaskSyncSession};
pub use stream::{
    EventTransport, SseTransport, StreamHealth, TaskStreamClient,
    TransportEvent,
};
pub use subscriptions::{SubscriptionHandle, SubscriptionManager};
pub use target::WatchTarget;

pub use taskwatch_model as model;
