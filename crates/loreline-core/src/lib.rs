//! loreline-core: the progression-graph consistency engine.
//!
//! Maintains ordered, cycle-free progression chains (rank and timeline
//! entities) and a bounded location containment tree over a SQLite store,
//! with full-text entity search and a persisted board layout.
//!
//! # Conventions
//!
//! - **Errors**: public operations return [`error::EngineError`]; raw store
//!   failures surface as its `Storage` kind via `anyhow` context.
//! - **Transactions**: every public mutation is one scoped transaction
//!   ([`db::with_transaction`]); a rejected operation writes nothing.
//! - **Logging**: `tracing` macros, `debug!` on mutations.

pub mod board;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod model;
pub mod store;

pub use board::{BoardLayout, Point, RANK_BOARD_ID, SavedLayout};
pub use config::{EngineConfig, load_config};
pub use db::query::{EntityFilter, SortOrder};
pub use error::{EngineError, ErrorCode};
pub use graph::{ContainmentLink, LinkPolicy, LinkedEntity, Placement, PredecessorLink};
pub use model::{Condition, Entity, EntityDraft, EntityPatch, EntityType, LocationLevel};
