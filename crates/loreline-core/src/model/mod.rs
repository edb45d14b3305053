//! Domain types shared across the store and the graph engine.

pub mod entity;

pub use entity::{Condition, Entity, EntityDraft, EntityPatch, EntityType, LocationLevel};
