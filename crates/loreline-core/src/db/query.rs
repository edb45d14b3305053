//! SQLite query helpers for the graph store.
//!
//! Typed row structs and composable query functions for the read paths:
//! get entity by id, list/filter entities, and resolve progression,
//! containment, and group edges one hop in each direction.
//!
//! All functions take a shared `&Connection` and return `anyhow::Result<T>`
//! with typed structs, never raw rows. Engine modules wrap these in scoped
//! transactions.

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};
use std::fmt::{self, Write as _};
use std::str::FromStr;

use crate::config::ListConfig;
use crate::model::EntityType;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A raw entity row. `search_tags` is the space-joined FTS mirror of the
/// `entity_tags` table; callers wanting structured tags use [`tags_of`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRow {
    pub entity_id: String,
    pub entity_type: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub search_tags: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A directed `precedes` edge. `conditions` is the raw JSON condition list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressionEdgeRow {
    pub from_id: String,
    pub to_id: String,
    pub conditions: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A `contains` edge resolved for one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainmentEdgeRow {
    pub child_id: String,
    pub parent_id: String,
    pub since_year: Option<i32>,
    pub until_year: Option<i32>,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// Sort order for entity listings.
///
/// When a full-text filter is active the listing switches to BM25 relevance
/// regardless of this setting, with created-at descending as the tiebreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Most recently created first (the default).
    #[default]
    CreatedDesc,
    /// Oldest first.
    CreatedAsc,
    /// Most recently updated first.
    UpdatedDesc,
    /// Alphabetical by display name.
    NameAsc,
}

impl SortOrder {
    const fn sql_clause(self) -> &'static str {
        match self {
            Self::CreatedDesc => "ORDER BY e.created_at DESC, e.entity_id ASC",
            Self::CreatedAsc => "ORDER BY e.created_at ASC, e.entity_id ASC",
            Self::UpdatedDesc => "ORDER BY e.updated_at DESC, e.entity_id ASC",
            Self::NameAsc => "ORDER BY e.name ASC, e.entity_id ASC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatedDesc => f.write_str("created_desc"),
            Self::CreatedAsc => f.write_str("created_asc"),
            Self::UpdatedDesc => f.write_str("updated_desc"),
            Self::NameAsc => f.write_str("name_asc"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created_desc" | "created-desc" | "newest" => Ok(Self::CreatedDesc),
            "created_asc" | "created-asc" | "oldest" => Ok(Self::CreatedAsc),
            "updated_desc" | "updated-desc" | "recent" => Ok(Self::UpdatedDesc),
            "name_asc" | "name-asc" | "name" => Ok(Self::NameAsc),
            other => bail!(
                "unknown sort order '{other}': expected one of created_desc, created_asc, updated_desc, name_asc"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Filter criteria for entity listings. All fields are optional and combine
/// with AND semantics.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    /// Filter by entity type (exact match).
    pub entity_type: Option<EntityType>,
    /// Filter by tag (entity must carry this tag).
    pub tag: Option<String>,
    /// Filter by category (exact match).
    pub category: Option<String>,
    /// Filter by containment parent (entity must be a child of this id).
    pub parent_id: Option<String>,
    /// Full-text filter (FTS5 query over name/description/tags). Activates
    /// relevance ordering.
    pub text: Option<String>,
    /// Maximum number of results; clamped to the configured page cap.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Sort order when no full-text filter is active.
    pub sort: SortOrder,
}

impl EntityFilter {
    /// The page size actually applied: the requested limit clamped to the
    /// configured maximum, or the configured default when unset.
    #[must_use]
    pub fn effective_limit(&self, list: &ListConfig) -> u32 {
        self.limit
            .unwrap_or(list.default_page_size)
            .min(list.max_page_size)
    }
}

// ---------------------------------------------------------------------------
// Entity reads
// ---------------------------------------------------------------------------

const ENTITY_COLUMNS: &str = "e.entity_id, e.entity_type, e.name, e.description, \
     e.category, e.level, e.search_tags, e.created_at, e.updated_at";

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityRow> {
    Ok(EntityRow {
        entity_id: row.get(0)?,
        entity_type: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        level: row.get(5)?,
        search_tags: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Fetch a single entity by exact id. Returns `None` when absent.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_entity(conn: &Connection, entity_id: &str) -> Result<Option<EntityRow>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.entity_id = ?1");
    let mut stmt = conn.prepare(&sql).context("prepare get_entity query")?;

    match stmt.query_row(params![entity_id], row_to_entity) {
        Ok(row) => Ok(Some(row)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context(format!("get_entity for '{entity_id}'")),
    }
}

/// `true` when an entity with this id exists.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn entity_exists(conn: &Connection, entity_id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM entities WHERE entity_id = ?1)",
        params![entity_id],
        |row| row.get(0),
    )
    .context(format!("entity_exists for '{entity_id}'"))
}

/// The structured tags of an entity, sorted for stable output.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn tags_of(conn: &Connection, entity_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT tag FROM entity_tags WHERE entity_id = ?1 ORDER BY tag ASC")
        .context("prepare tags_of query")?;
    let tags = stmt
        .query_map(params![entity_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()
        .context(format!("tags_of for '{entity_id}'"))?;
    Ok(tags)
}

/// List entities matching the filter.
///
/// With no text filter, results follow `filter.sort`. With a text filter the
/// listing joins `entities_fts` and orders by weighted BM25 relevance, then
/// created-at descending, then id, keeping pagination stable.
///
/// # Errors
///
/// Returns an error if the database query fails (including malformed FTS5
/// query syntax).
pub fn list_entities(
    conn: &Connection,
    filter: &EntityFilter,
    list: &ListConfig,
) -> Result<Vec<EntityRow>> {
    let mut conditions: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut joins = String::new();

    if let Some(entity_type) = filter.entity_type {
        param_values.push(Box::new(entity_type.as_str().to_string()));
        conditions.push(format!("e.entity_type = ?{}", param_values.len()));
    }

    if let Some(ref category) = filter.category {
        param_values.push(Box::new(category.clone()));
        conditions.push(format!("e.category = ?{}", param_values.len()));
    }

    if let Some(ref tag) = filter.tag {
        param_values.push(Box::new(tag.clone()));
        let _ = write!(
            joins,
            " INNER JOIN entity_tags t ON t.entity_id = e.entity_id AND t.tag = ?{}",
            param_values.len()
        );
    }

    if let Some(ref parent_id) = filter.parent_id {
        param_values.push(Box::new(parent_id.clone()));
        let _ = write!(
            joins,
            " INNER JOIN containment_edges c ON c.child_id = e.entity_id AND c.parent_id = ?{}",
            param_values.len()
        );
    }

    let order_clause: String;
    if let Some(ref text) = filter.text {
        param_values.push(Box::new(text.clone()));
        let _ = write!(
            joins,
            " INNER JOIN entities_fts f ON f.entity_id = e.entity_id"
        );
        conditions.push(format!("entities_fts MATCH ?{}", param_values.len()));
        order_clause = format!(
            "ORDER BY bm25(entities_fts, {}, {}, {}) ASC, e.created_at DESC, e.entity_id ASC",
            super::fts::BM25_WEIGHT_NAME,
            super::fts::BM25_WEIGHT_DESCRIPTION,
            super::fts::BM25_WEIGHT_TAGS,
        );
    } else {
        order_clause = filter.sort.sql_clause().to_string();
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    param_values.push(Box::new(filter.effective_limit(list)));
    let limit_idx = param_values.len();
    param_values.push(Box::new(filter.offset.unwrap_or(0)));
    let offset_idx = param_values.len();

    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM entities e{joins} {where_clause} {order_clause} \
         LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
    );

    let mut stmt = conn.prepare(&sql).context("prepare list_entities query")?;
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|boxed| boxed.as_ref()).collect();
    let rows = stmt
        .query_map(params_ref.as_slice(), row_to_entity)?
        .collect::<Result<Vec<_>, _>>()
        .context("collect list_entities rows")?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Progression edges
// ---------------------------------------------------------------------------

fn row_to_progression_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProgressionEdgeRow> {
    Ok(ProgressionEdgeRow {
        from_id: row.get(0)?,
        to_id: row.get(1)?,
        conditions: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

const PROGRESSION_COLUMNS: &str =
    "from_id, to_id, conditions, created_at, updated_at";

/// Fetch one `precedes` edge by its ordered pair. Returns `None` when absent.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_progression_edge(
    conn: &Connection,
    from_id: &str,
    to_id: &str,
) -> Result<Option<ProgressionEdgeRow>> {
    let sql = format!(
        "SELECT {PROGRESSION_COLUMNS} FROM progression_edges WHERE from_id = ?1 AND to_id = ?2"
    );
    match conn.query_row(&sql, params![from_id, to_id], row_to_progression_edge) {
        Ok(edge) => Ok(Some(edge)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context(format!("get_progression_edge '{from_id}' -> '{to_id}'")),
    }
}

/// All `precedes` edges arriving at `to_id`, ordered by creation time.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn incoming_edges(conn: &Connection, to_id: &str) -> Result<Vec<ProgressionEdgeRow>> {
    let sql = format!(
        "SELECT {PROGRESSION_COLUMNS} FROM progression_edges \
         WHERE to_id = ?1 ORDER BY created_at ASC, from_id ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare incoming_edges query")?;
    let rows = stmt
        .query_map(params![to_id], row_to_progression_edge)?
        .collect::<Result<Vec<_>, _>>()
        .context(format!("incoming_edges for '{to_id}'"))?;
    Ok(rows)
}

/// All `precedes` edges leaving `from_id`, ordered by creation time.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn outgoing_edges(conn: &Connection, from_id: &str) -> Result<Vec<ProgressionEdgeRow>> {
    let sql = format!(
        "SELECT {PROGRESSION_COLUMNS} FROM progression_edges \
         WHERE from_id = ?1 ORDER BY created_at ASC, to_id ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare outgoing_edges query")?;
    let rows = stmt
        .query_map(params![from_id], row_to_progression_edge)?
        .collect::<Result<Vec<_>, _>>()
        .context(format!("outgoing_edges for '{from_id}'"))?;
    Ok(rows)
}

/// Every `precedes` edge in the store as `(from_id, to_id)` pairs. Feeds the
/// guard's per-transaction adjacency index.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn all_progression_pairs(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn
        .prepare("SELECT from_id, to_id FROM progression_edges")
        .context("prepare all_progression_pairs query")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()
        .context("collect progression pairs")?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Containment and group edges
// ---------------------------------------------------------------------------

fn row_to_containment_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContainmentEdgeRow> {
    Ok(ContainmentEdgeRow {
        child_id: row.get(0)?,
        parent_id: row.get(1)?,
        since_year: row.get(2)?,
        until_year: row.get(3)?,
        note: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const CONTAINMENT_COLUMNS: &str =
    "child_id, parent_id, since_year, until_year, note, created_at, updated_at";

/// The containment edge whose child is `child_id`, if any. At most one by
/// the single-parent invariant.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn parent_edge_of(conn: &Connection, child_id: &str) -> Result<Option<ContainmentEdgeRow>> {
    let sql =
        format!("SELECT {CONTAINMENT_COLUMNS} FROM containment_edges WHERE child_id = ?1");
    match conn.query_row(&sql, params![child_id], row_to_containment_edge) {
        Ok(edge) => Ok(Some(edge)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context(format!("parent_edge_of '{child_id}'")),
    }
}

/// All containment edges whose parent is `parent_id`.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn child_edges_of(conn: &Connection, parent_id: &str) -> Result<Vec<ContainmentEdgeRow>> {
    let sql = format!(
        "SELECT {CONTAINMENT_COLUMNS} FROM containment_edges \
         WHERE parent_id = ?1 ORDER BY child_id ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare child_edges_of query")?;
    let rows = stmt
        .query_map(params![parent_id], row_to_containment_edge)?
        .collect::<Result<Vec<_>, _>>()
        .context(format!("child_edges_of for '{parent_id}'"))?;
    Ok(rows)
}

/// The group (RankSystem) id an entity belongs to, if any.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn group_of(conn: &Connection, entity_id: &str) -> Result<Option<String>> {
    match conn.query_row(
        "SELECT group_id FROM group_edges WHERE entity_id = ?1",
        params![entity_id],
        |row| row.get(0),
    ) {
        Ok(group_id) => Ok(Some(group_id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context(format!("group_of '{entity_id}'")),
    }
}
