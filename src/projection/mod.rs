//! Projection module
//!
//! Derives aggregate state by folding events. Projections are never stored
//! as the source of truth; snapshots only cache them.

mod projector;
mod reducer;

pub use projector::{select_fields, ProjectedState, StateProjector};
pub use reducer::{Reducer, ReducerRegistry};
