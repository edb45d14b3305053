//! Progression edge operations: link, unlink, condition edits, relink, and
//! rank-system grouping.
//!
//! An edge `precedes(previous -> current)` means `previous` must be reached
//! before `current`. Every mutation runs the guard and the write inside one
//! scoped transaction, so a rejected edge leaves no partial state behind.
//!
//! Conditions live on the edge, not the node: the same rank reached from two
//! different predecessors can demand different things on each path.

use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::db::query::{self, EntityFilter, ProgressionEdgeRow};
use crate::db::with_transaction;
use crate::error::EngineError;
use crate::model::entity::format_timestamp;
use crate::model::{Condition, Entity, EntityType};
use crate::store::{hydrate_entity, require_entity};

use super::guard::{self, LinkPolicy};

// ---------------------------------------------------------------------------
// View types
// ---------------------------------------------------------------------------

/// One incoming `precedes` edge with its advancement conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredecessorLink {
    pub predecessor_id: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// An entity annotated with its progression neighborhood: predecessors with
/// conditions, successor ids, and group membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedEntity {
    #[serde(flatten)]
    pub entity: Entity,
    #[serde(default)]
    pub predecessors: Vec<PredecessorLink>,
    #[serde(default)]
    pub successors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

fn decode_conditions(raw: &str) -> Result<Vec<Condition>, EngineError> {
    let conditions =
        serde_json::from_str(raw).context("stored edge conditions are not valid JSON")?;
    Ok(conditions)
}

fn encode_conditions(conditions: &[Condition]) -> Result<String, EngineError> {
    if conditions.iter().any(|c| c.name.trim().is_empty()) {
        return Err(EngineError::validation("condition name must not be empty"));
    }
    let raw = serde_json::to_string(conditions).context("encode edge conditions")?;
    Ok(raw)
}

fn predecessor_link(row: &ProgressionEdgeRow) -> Result<PredecessorLink, EngineError> {
    Ok(PredecessorLink {
        predecessor_id: row.from_id.clone(),
        conditions: decode_conditions(&row.conditions)?,
    })
}

/// The policy for an entity, or `Validation` when its type never carries
/// progression edges.
fn policy_for(entity: &Entity) -> Result<LinkPolicy, EngineError> {
    LinkPolicy::for_entity_type(entity.entity_type).ok_or_else(|| {
        EngineError::validation(format!(
            "'{}' is a {} and does not participate in progression",
            entity.entity_id, entity.entity_type
        ))
    })
}

// ---------------------------------------------------------------------------
// Edge mutations
// ---------------------------------------------------------------------------

/// Record that `previous_id` precedes `current_id`, with the conditions to
/// advance along this edge.
///
/// Linking an already linked pair replaces its conditions in place (the edge
/// keeps its creation time). The policy comes from the entity type; the guard
/// enforces acyclicity and, for timelines, chain cardinality.
///
/// # Errors
///
/// `Validation` when the type carries no progression; otherwise the guard's
/// errors ([`guard::can_link`]) or `Storage`.
pub fn link(
    conn: &mut Connection,
    current_id: &str,
    previous_id: &str,
    conditions: &[Condition],
) -> Result<(), EngineError> {
    let encoded = encode_conditions(conditions)?;

    with_transaction(conn, |tx| {
        let current = require_entity(tx, current_id)?;
        let policy = policy_for(&current)?;
        guard::can_link(tx, previous_id, current_id, policy)?;

        let now = format_timestamp(Utc::now());
        tx.execute(
            "INSERT INTO progression_edges (from_id, to_id, conditions, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (from_id, to_id)
             DO UPDATE SET conditions = excluded.conditions, updated_at = excluded.updated_at",
            params![previous_id, current_id, encoded, now],
        )?;

        debug!(from = previous_id, to = current_id, "progression edge linked");
        Ok(())
    })
}

/// Remove the edge `previous_id -> current_id`. Idempotent: removing an
/// absent edge is not an error; returns `false` in that case.
///
/// # Errors
///
/// `Storage` for store failures.
pub fn unlink(
    conn: &mut Connection,
    current_id: &str,
    previous_id: &str,
) -> Result<bool, EngineError> {
    with_transaction(conn, |tx| {
        let removed = tx.execute(
            "DELETE FROM progression_edges WHERE from_id = ?1 AND to_id = ?2",
            params![previous_id, current_id],
        )?;

        if removed > 0 {
            debug!(from = previous_id, to = current_id, "progression edge unlinked");
        }
        Ok(removed > 0)
    })
}

/// Replace the condition list on an existing edge without touching topology.
///
/// # Errors
///
/// `EdgeNotFound` when the pair is not linked; `Storage` for store failures.
pub fn update_conditions(
    conn: &mut Connection,
    current_id: &str,
    previous_id: &str,
    conditions: &[Condition],
) -> Result<(), EngineError> {
    let encoded = encode_conditions(conditions)?;

    with_transaction(conn, |tx| {
        let now = format_timestamp(Utc::now());
        let changed = tx.execute(
            "UPDATE progression_edges SET conditions = ?3, updated_at = ?4
             WHERE from_id = ?1 AND to_id = ?2",
            params![previous_id, current_id, encoded, now],
        )?;
        if changed == 0 {
            return Err(EngineError::EdgeNotFound {
                from_id: previous_id.to_string(),
                to_id: current_id.to_string(),
            });
        }
        Ok(())
    })
}

/// Splice a timeline entry into a new chain position in one step: drop every
/// edge incident to `current_id`, then wire `previous -> current` and
/// `current -> next` as requested.
///
/// The whole splice is a single transaction. If any new edge fails the guard
/// the old neighborhood is restored by rollback, so the entry is never left
/// detached by a failed relink.
///
/// # Errors
///
/// `Validation` when `current_id` is not a strict-chain type (only timelines
/// relink); otherwise the guard's errors or `Storage`.
pub fn relink(
    conn: &mut Connection,
    current_id: &str,
    previous_id: Option<&str>,
    next_id: Option<&str>,
) -> Result<(), EngineError> {
    with_transaction(conn, |tx| {
        let current = require_entity(tx, current_id)?;
        if policy_for(&current)? != LinkPolicy::StrictChain {
            return Err(EngineError::validation(format!(
                "relink reorders chains; '{current_id}' is a {} which links as a DAG",
                current.entity_type
            )));
        }

        tx.execute(
            "DELETE FROM progression_edges WHERE from_id = ?1 OR to_id = ?1",
            params![current_id],
        )?;

        let now = format_timestamp(Utc::now());
        for (from, to) in [
            previous_id.map(|p| (p, current_id)),
            next_id.map(|n| (current_id, n)),
        ]
        .into_iter()
        .flatten()
        {
            guard::can_link(tx, from, to, LinkPolicy::StrictChain)?;
            tx.execute(
                "INSERT INTO progression_edges (from_id, to_id, conditions, created_at, updated_at)
                 VALUES (?1, ?2, '[]', ?3, ?3)",
                params![from, to, now],
            )?;
        }

        debug!(
            entity_id = current_id,
            previous = previous_id,
            next = next_id,
            "timeline entry relinked"
        );
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Group membership
// ---------------------------------------------------------------------------

/// Put a rank into a rank system. An entity belongs to at most one system;
/// attaching again moves it (last write wins).
///
/// # Errors
///
/// `EntityNotFound` for a missing side; `Validation` when `entity_id` is not
/// a rank or `group_id` not a rank system.
pub fn attach_to_group(
    conn: &mut Connection,
    entity_id: &str,
    group_id: &str,
) -> Result<(), EngineError> {
    with_transaction(conn, |tx| {
        let member = require_entity(tx, entity_id)?;
        if member.entity_type != EntityType::Rank {
            return Err(EngineError::validation(format!(
                "only ranks join rank systems; '{entity_id}' is a {}",
                member.entity_type
            )));
        }
        let group = require_entity(tx, group_id)?;
        if group.entity_type != EntityType::RankSystem {
            return Err(EngineError::validation(format!(
                "'{group_id}' is a {}, not a rank system",
                group.entity_type
            )));
        }

        let now = format_timestamp(Utc::now());
        tx.execute(
            "INSERT INTO group_edges (entity_id, group_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (entity_id)
             DO UPDATE SET group_id = excluded.group_id, updated_at = excluded.updated_at",
            params![entity_id, group_id, now],
        )?;

        debug!(entity_id, group_id, "rank attached to system");
        Ok(())
    })
}

/// Remove a rank from its system. Returns `false` when it had none.
///
/// # Errors
///
/// `Storage` for store failures.
pub fn detach_from_group(conn: &mut Connection, entity_id: &str) -> Result<bool, EngineError> {
    with_transaction(conn, |tx| {
        let removed = tx.execute(
            "DELETE FROM group_edges WHERE entity_id = ?1",
            params![entity_id],
        )?;
        Ok(removed > 0)
    })
}

// ---------------------------------------------------------------------------
// Annotated reads
// ---------------------------------------------------------------------------

fn annotate(conn: &Connection, entity: Entity) -> Result<LinkedEntity, EngineError> {
    let predecessors = query::incoming_edges(conn, &entity.entity_id)?
        .iter()
        .map(predecessor_link)
        .collect::<Result<Vec<_>, _>>()?;
    let successors = query::outgoing_edges(conn, &entity.entity_id)?
        .into_iter()
        .map(|row| row.to_id)
        .collect();
    let group_id = query::group_of(conn, &entity.entity_id)?;

    Ok(LinkedEntity {
        entity,
        predecessors,
        successors,
        group_id,
    })
}

/// Fetch one entity with its progression annotations.
///
/// # Errors
///
/// `EntityNotFound` when the id does not resolve; `Storage` for store
/// failures.
pub fn get_linked(conn: &mut Connection, entity_id: &str) -> Result<LinkedEntity, EngineError> {
    with_transaction(conn, |tx| {
        let entity = require_entity(tx, entity_id)?;
        annotate(tx, entity)
    })
}

/// List entities matching the filter, each annotated with predecessors (and
/// their conditions), successors, and group membership. One transaction, so
/// the annotations are consistent with the listing.
///
/// # Errors
///
/// `Storage` for store failures.
pub fn list_linked(
    conn: &mut Connection,
    filter: &EntityFilter,
    config: &EngineConfig,
) -> Result<Vec<LinkedEntity>, EngineError> {
    with_transaction(conn, |tx| {
        let rows = query::list_entities(tx, filter, &config.list)?;
        rows.iter()
            .map(|row| annotate(tx, hydrate_entity(tx, row)?))
            .collect()
    })
}
