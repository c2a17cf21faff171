//! eventdbx native core
//!
//! Embeddable event store: per-aggregate hash-chained event logs, state
//! projection with snapshots, integrity verification, and a C ABI
//! (`dbx_*` functions in [`api::ffi`]).

pub mod aggregate;
pub mod api;
pub mod audit;
pub mod cancel;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod event_store;
pub mod lock_manager;
pub mod pagination;
pub mod projection;
pub mod snapshot;
pub mod telemetry;

pub use aggregate::{AggregateRecord, AggregateStatus};
pub use audit::VerificationReport;
pub use cancel::CancelToken;
pub use client::{AggregateView, EventStoreClient, Outcome};
pub use config::{ConfigError, StoreConfig};
pub use domain::{AggregateKey, Digest, Event, EventKind};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use event_store::{EventStorage, InMemoryStorage};
pub use pagination::Page;
pub use projection::{ProjectedState, ReducerRegistry};
pub use snapshot::Snapshot;
