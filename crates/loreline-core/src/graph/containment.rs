//! Containment Hierarchy Manager: the location parent/child tree.
//!
//! Invariants, all enforced inside one transaction per call:
//! - a child has at most one parent at a time,
//! - the parent's structural level is greater than or equal to the child's,
//! - the optional validity window satisfies `until >= since`,
//! - the parent chain never loops back on itself.
//!
//! The storage layer backs the single-parent invariant with a primary key on
//! `child_id`, so even a bug here cannot persist a second parent.

use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::db::query::{self, ContainmentEdgeRow, EntityFilter};
use crate::db::with_transaction;
use crate::error::EngineError;
use crate::model::entity::format_timestamp;
use crate::model::{Entity, EntityType, LocationLevel};
use crate::store::{hydrate_entity, require_entity};

// ---------------------------------------------------------------------------
// View types
// ---------------------------------------------------------------------------

/// A resolved containment edge as seen from the child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainmentLink {
    pub parent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<&ContainmentEdgeRow> for ContainmentLink {
    fn from(row: &ContainmentEdgeRow) -> Self {
        Self {
            parent_id: row.parent_id.clone(),
            since_year: row.since_year,
            until_year: row.until_year,
            note: row.note.clone(),
        }
    }
}

/// An entity with its resolved parent edge, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(flatten)]
    pub entity: Entity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ContainmentLink>,
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Resolve a location and its structural level, or fail.
fn require_leveled_location(
    conn: &Connection,
    entity_id: &str,
) -> Result<(Entity, LocationLevel), EngineError> {
    let entity = require_entity(conn, entity_id)?;
    if entity.entity_type != EntityType::Location {
        return Err(EngineError::validation(format!(
            "containment is a location hierarchy; '{entity_id}' is a {}",
            entity.entity_type
        )));
    }
    let level = entity.level.ok_or_else(|| EngineError::LevelNotSet {
        entity_id: entity_id.to_string(),
    })?;
    Ok((entity, level))
}

/// Walk the parent chain from `start` and fail if it reaches `child_id`.
/// Equal levels are legal, so without this check two same-level locations
/// could contain each other.
fn ensure_no_ancestor_loop(
    conn: &Connection,
    child_id: &str,
    start: &str,
) -> Result<(), EngineError> {
    let mut path = vec![child_id.to_string(), start.to_string()];
    let mut current = start.to_string();

    while let Some(edge) = query::parent_edge_of(conn, &current)? {
        path.push(edge.parent_id.clone());
        if edge.parent_id == child_id {
            return Err(EngineError::Cycle { cycle_path: path });
        }
        current = edge.parent_id;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Place `child_id` inside `parent_id`, optionally bounded to a year window
/// with a free-text note.
///
/// Re-attaching to the same parent updates the window and note in place.
/// Attaching while a distinct parent exists fails; detach first.
///
/// # Errors
///
/// - [`EngineError::SelfLoop`] when `parent_id == child_id`
/// - [`EngineError::Validation`] for a backwards window or a non-location
/// - [`EngineError::EntityNotFound`] / [`EngineError::LevelNotSet`] when a
///   side is missing or has no structural level
/// - [`EngineError::LevelViolation`] when the parent's level is strictly
///   below the child's
/// - [`EngineError::AlreadyHasParent`] when the child is attached elsewhere
/// - [`EngineError::Cycle`] when the placement would loop the parent chain
/// - [`EngineError::Storage`] for store failures
pub fn attach(
    conn: &mut Connection,
    parent_id: &str,
    child_id: &str,
    since_year: Option<i32>,
    until_year: Option<i32>,
    note: Option<&str>,
) -> Result<(), EngineError> {
    if parent_id == child_id {
        return Err(EngineError::SelfLoop {
            entity_id: child_id.to_string(),
        });
    }
    if let (Some(since), Some(until)) = (since_year, until_year) {
        if until < since {
            return Err(EngineError::validation(format!(
                "containment window ends ({until}) before it starts ({since})"
            )));
        }
    }

    with_transaction(conn, |tx| {
        let (_, parent_level) = require_leveled_location(tx, parent_id)?;
        let (_, child_level) = require_leveled_location(tx, child_id)?;
        if parent_level < child_level {
            return Err(EngineError::LevelViolation {
                parent_id: parent_id.to_string(),
                parent_level,
                child_id: child_id.to_string(),
                child_level,
            });
        }

        if let Some(existing) = query::parent_edge_of(tx, child_id)? {
            if existing.parent_id != parent_id {
                return Err(EngineError::AlreadyHasParent {
                    child_id: child_id.to_string(),
                    parent_id: existing.parent_id,
                });
            }
        }

        ensure_no_ancestor_loop(tx, child_id, parent_id)?;

        let now = format_timestamp(Utc::now());
        tx.execute(
            "INSERT INTO containment_edges
                (child_id, parent_id, since_year, until_year, note, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT (child_id)
             DO UPDATE SET since_year = excluded.since_year,
                           until_year = excluded.until_year,
                           note = excluded.note,
                           updated_at = excluded.updated_at",
            params![child_id, parent_id, since_year, until_year, note, now],
        )?;

        debug!(child = child_id, parent = parent_id, "location attached");
        Ok(())
    })
}

/// Remove a child's containment edge. With `parent_id` given, only the edge
/// to that parent is removed; otherwise whichever parent edge exists.
/// Returns `false` when nothing matched (idempotent).
///
/// # Errors
///
/// `Storage` for store failures.
pub fn detach(
    conn: &mut Connection,
    child_id: &str,
    parent_id: Option<&str>,
) -> Result<bool, EngineError> {
    with_transaction(conn, |tx| {
        let removed = match parent_id {
            Some(parent) => tx.execute(
                "DELETE FROM containment_edges WHERE child_id = ?1 AND parent_id = ?2",
                params![child_id, parent],
            )?,
            None => tx.execute(
                "DELETE FROM containment_edges WHERE child_id = ?1",
                params![child_id],
            )?,
        };

        if removed > 0 {
            debug!(child = child_id, "location detached");
        }
        Ok(removed > 0)
    })
}

/// List entities matching the filter, each with its resolved parent edge.
///
/// # Errors
///
/// `Storage` for store failures.
pub fn list_placements(
    conn: &mut Connection,
    filter: &EntityFilter,
    config: &EngineConfig,
) -> Result<Vec<Placement>, EngineError> {
    with_transaction(conn, |tx| {
        let rows = query::list_entities(tx, filter, &config.list)?;
        rows.iter()
            .map(|row| {
                let entity = hydrate_entity(tx, row)?;
                let parent = query::parent_edge_of(tx, &entity.entity_id)?
                    .as_ref()
                    .map(ContainmentLink::from);
                Ok(Placement { entity, parent })
            })
            .collect()
    })
}

/// The parent chain of an entity, nearest first, up to the root.
///
/// # Errors
///
/// `EntityNotFound` when the id does not resolve; `Storage` for store
/// failures.
pub fn ancestors(conn: &mut Connection, entity_id: &str) -> Result<Vec<ContainmentLink>, EngineError> {
    with_transaction(conn, |tx| {
        require_entity(tx, entity_id)?;

        let mut chain = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut current = entity_id.to_string();

        while let Some(edge) = query::parent_edge_of(tx, &current)? {
            if !seen.insert(edge.parent_id.clone()) {
                break; // damaged store; do not spin
            }
            chain.push(ContainmentLink::from(&edge));
            current = edge.parent_id;
        }

        Ok(chain)
    })
}

/// Every id in the containment subtree rooted at `root_id`, the root
/// included, in breadth-first order.
///
/// # Errors
///
/// `EntityNotFound` when the root does not resolve; `Storage` for store
/// failures.
pub fn subtree_ids(conn: &mut Connection, root_id: &str) -> Result<Vec<String>, EngineError> {
    with_transaction(conn, |tx| {
        require_entity(tx, root_id)?;

        let mut order = vec![root_id.to_string()];
        let mut seen: std::collections::HashSet<String> =
            std::iter::once(root_id.to_string()).collect();
        let mut frontier = vec![root_id.to_string()];

        while let Some(parent) = frontier.pop() {
            for edge in query::child_edges_of(tx, &parent)? {
                if seen.insert(edge.child_id.clone()) {
                    order.push(edge.child_id.clone());
                    frontier.push(edge.child_id);
                }
            }
        }

        Ok(order)
    })
}
