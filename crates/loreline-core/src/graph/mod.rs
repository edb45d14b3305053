//! Progression and containment graph engines.
//!
//! [`guard`] holds the pure edge-admission logic (policies, cycle
//! detection), [`progression`] the `precedes` edge operations, and
//! [`containment`] the location hierarchy.

pub mod containment;
pub mod guard;
pub mod progression;

pub use containment::{ContainmentLink, Placement};
pub use guard::{LinkPolicy, ProgressionIndex};
pub use progression::{LinkedEntity, PredecessorLink};
