//! Domain module
//!
//! Core domain types: aggregate identity, events, digests and the merge
//! patch used by `patch` events.

pub mod digest;
pub mod events;
pub mod key;
pub mod patch;

pub use digest::{chain_hash, Digest, DigestError, DIGEST_LEN};
pub use events::{Event, EventKind, EventMetadata, NewEvent};
pub use key::AggregateKey;
pub use patch::merge_patch;
