//! Event Store module
//!
//! Persistence layer for event sourcing: the storage seam, the in-memory
//! backend and the hash-chained event log built on top of it.

mod log;
mod memory;
mod storage;

pub use log::{EventLog, EventQuery, EventStream, SortOrder};
pub use memory::InMemoryStorage;
pub use storage::EventStorage;
