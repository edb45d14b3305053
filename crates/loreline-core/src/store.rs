//! Entity Store: CRUD for the progression-relevant node types.
//!
//! Every public function here is one scoped store transaction. Deletion
//! detaches all incident edges before removing the node, so the graph never
//! holds an orphan edge. `updated_at` is refreshed on every mutation.

use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::debug;

use crate::config::EngineConfig;
use crate::db::query::{self, EntityFilter, EntityRow};
use crate::db::with_transaction;
use crate::error::EngineError;
use crate::model::entity::{format_timestamp, parse_timestamp};
use crate::model::{Entity, EntityDraft, EntityPatch, EntityType, LocationLevel};

/// Convert a raw row into the domain model, resolving structured tags.
pub(crate) fn hydrate_entity(
    conn: &Connection,
    row: &EntityRow,
) -> Result<Entity, EngineError> {
    let entity_type: EntityType = row
        .entity_type
        .parse()
        .context("stored entity_type is invalid")?;
    let level: Option<LocationLevel> = match row.level.as_deref() {
        Some(raw) => Some(raw.parse().context("stored level is invalid")?),
        None => None,
    };

    Ok(Entity {
        entity_id: row.entity_id.clone(),
        entity_type,
        name: row.name.clone(),
        description: row.description.clone(),
        category: row.category.clone(),
        level,
        tags: query::tags_of(conn, &row.entity_id)?,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

/// Look up an entity or fail with `EntityNotFound`.
pub(crate) fn require_entity(conn: &Connection, entity_id: &str) -> Result<Entity, EngineError> {
    let row = query::get_entity(conn, entity_id)?.ok_or_else(|| EngineError::EntityNotFound {
        entity_id: entity_id.to_string(),
    })?;
    hydrate_entity(conn, &row)
}

fn normalized_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn validate_draft(draft: &EntityDraft) -> Result<(), EngineError> {
    if draft.entity_id.trim().is_empty() {
        return Err(EngineError::validation("entity id must not be empty"));
    }
    if draft.name.trim().is_empty() {
        return Err(EngineError::validation("entity name must not be empty"));
    }
    if draft.level.is_some() && draft.entity_type != EntityType::Location {
        return Err(EngineError::validation(format!(
            "structural level only applies to locations, not {}",
            draft.entity_type
        )));
    }
    Ok(())
}

fn write_tags(
    conn: &Connection,
    entity_id: &str,
    tags: &[String],
    now: &str,
) -> Result<(), EngineError> {
    conn.execute(
        "DELETE FROM entity_tags WHERE entity_id = ?1",
        params![entity_id],
    )?;
    for tag in tags {
        conn.execute(
            "INSERT INTO entity_tags (entity_id, tag, created_at) VALUES (?1, ?2, ?3)",
            params![entity_id, tag, now],
        )?;
    }
    Ok(())
}

/// Create an entity from the draft. The id is caller-chosen and must be new.
///
/// # Errors
///
/// `Validation` for an empty id/name, a level on a non-location, or an id
/// that already exists; `Storage` for store failures.
pub fn create_entity(
    conn: &mut Connection,
    draft: &EntityDraft,
) -> Result<Entity, EngineError> {
    validate_draft(draft)?;
    let tags = normalized_tags(&draft.tags);

    with_transaction(conn, |tx| {
        if query::entity_exists(tx, &draft.entity_id)? {
            return Err(EngineError::validation(format!(
                "entity id '{}' already exists",
                draft.entity_id
            )));
        }

        let now = format_timestamp(Utc::now());
        tx.execute(
            "INSERT INTO entities (
                entity_id, entity_type, name, description, category, level,
                search_tags, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                draft.entity_id,
                draft.entity_type.as_str(),
                draft.name.trim(),
                draft.description,
                draft.category,
                draft.level.map(LocationLevel::as_str),
                tags.join(" "),
                now,
            ],
        )?;
        write_tags(tx, &draft.entity_id, &tags, &now)?;

        debug!(entity_id = %draft.entity_id, entity_type = %draft.entity_type, "entity created");
        require_entity(tx, &draft.entity_id)
    })
}

/// Apply a partial update. Fields left `None` in the patch are untouched.
///
/// # Errors
///
/// `EntityNotFound` if the id does not resolve; `Validation` for an empty
/// replacement name or a level set on a non-location.
pub fn update_entity(
    conn: &mut Connection,
    entity_id: &str,
    patch: &EntityPatch,
) -> Result<Entity, EngineError> {
    if let Some(ref name) = patch.name {
        if name.trim().is_empty() {
            return Err(EngineError::validation("entity name must not be empty"));
        }
    }

    with_transaction(conn, |tx| {
        let current = require_entity(tx, entity_id)?;

        if patch.level.is_some() && current.entity_type != EntityType::Location {
            return Err(EngineError::validation(format!(
                "structural level only applies to locations, not {}",
                current.entity_type
            )));
        }

        let name = patch.name.as_deref().map_or(current.name.as_str(), str::trim);
        let description = patch
            .description
            .as_deref()
            .or(current.description.as_deref());
        let category = patch.category.as_deref().or(current.category.as_deref());
        let level = patch.level.or(current.level);
        let tags = patch
            .tags
            .as_ref()
            .map_or_else(|| current.tags.clone(), |t| normalized_tags(t));

        let now = format_timestamp(Utc::now());
        tx.execute(
            "UPDATE entities
             SET name = ?2, description = ?3, category = ?4, level = ?5,
                 search_tags = ?6, updated_at = ?7
             WHERE entity_id = ?1",
            params![
                entity_id,
                name,
                description,
                category,
                level.map(LocationLevel::as_str),
                tags.join(" "),
                now,
            ],
        )?;
        write_tags(tx, entity_id, &tags, &now)?;

        debug!(entity_id, "entity updated");
        require_entity(tx, entity_id)
    })
}

/// Fetch one entity, `None` when absent.
///
/// # Errors
///
/// `Storage` for store failures.
pub fn get_entity(conn: &Connection, entity_id: &str) -> Result<Option<Entity>, EngineError> {
    match query::get_entity(conn, entity_id)? {
        Some(row) => Ok(Some(hydrate_entity(conn, &row)?)),
        None => Ok(None),
    }
}

/// `true` when the entity exists.
///
/// # Errors
///
/// `Storage` for store failures.
pub fn entity_exists(conn: &Connection, entity_id: &str) -> Result<bool, EngineError> {
    Ok(query::entity_exists(conn, entity_id)?)
}

/// Delete an entity and every incident edge. Returns `false` when the id was
/// already absent (idempotent).
///
/// # Errors
///
/// `Storage` for store failures.
pub fn delete_entity(conn: &mut Connection, entity_id: &str) -> Result<bool, EngineError> {
    with_transaction(conn, |tx| {
        // Detach first so no orphan edge survives even with FKs off.
        tx.execute(
            "DELETE FROM progression_edges WHERE from_id = ?1 OR to_id = ?1",
            params![entity_id],
        )?;
        tx.execute(
            "DELETE FROM containment_edges WHERE child_id = ?1 OR parent_id = ?1",
            params![entity_id],
        )?;
        tx.execute(
            "DELETE FROM group_edges WHERE entity_id = ?1 OR group_id = ?1",
            params![entity_id],
        )?;
        tx.execute(
            "DELETE FROM entity_tags WHERE entity_id = ?1",
            params![entity_id],
        )?;
        let removed = tx.execute(
            "DELETE FROM entities WHERE entity_id = ?1",
            params![entity_id],
        )?;

        if removed > 0 {
            debug!(entity_id, "entity deleted with incident edges");
        }
        Ok(removed > 0)
    })
}

/// List entities matching the filter, hydrated into the domain model.
///
/// # Errors
///
/// `Storage` for store failures (including malformed FTS5 filter text).
pub fn list_entities(
    conn: &mut Connection,
    filter: &EntityFilter,
    config: &EngineConfig,
) -> Result<Vec<Entity>, EngineError> {
    with_transaction(conn, |tx| {
        let rows = query::list_entities(tx, filter, &config.list)?;
        rows.iter().map(|row| hydrate_entity(tx, row)).collect()
    })
}
