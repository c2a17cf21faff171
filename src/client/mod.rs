//! Client module
//!
//! The operation surface of the store, its JSON options and the three-way
//! outcome used at the C boundary.

pub mod options;
mod outcome;
mod service;

pub use outcome::Outcome;
pub use service::{AggregateView, EventStoreClient, EventStoreClientBuilder};
