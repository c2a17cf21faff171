//! Aggregate module
//!
//! The aggregate index: per-aggregate version, archival flag and snapshot
//! lineage, plus listing order.

mod index;
mod record;
pub mod sort;

pub use index::{AggregateIndex, AggregateListQuery, CreatePlan};
pub use record::{AggregateRecord, AggregateStatus};
pub use sort::{parse_sort, AggregateSort, AggregateSortField};
