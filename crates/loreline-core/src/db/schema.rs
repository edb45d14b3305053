//! Canonical SQLite schema for the loreline graph store.
//!
//! The schema is normalized around one node table and three edge tables:
//! - `entities` holds every progression-relevant node (rank, timeline,
//!   location, rank_system) with its attributes and lifecycle timestamps
//! - `progression_edges` stores directed `precedes` edges with a JSON
//!   condition list; the `(from_id, to_id)` primary key makes racing
//!   identical links an upsert rather than a duplicate
//! - `containment_edges` keys on `child_id` alone, so the single-parent
//!   invariant holds at the storage layer as well as in the engine
//! - `group_edges` keys on `entity_id`, giving single group membership
//! - `board_layouts` is presentational state, opaque JSON per board

/// Migration v1: node and edge tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    entity_id TEXT PRIMARY KEY CHECK (length(trim(entity_id)) > 0),
    entity_type TEXT NOT NULL CHECK (entity_type IN ('rank', 'timeline', 'location', 'rank_system')),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    description TEXT,
    category TEXT,
    level TEXT CHECK (level IS NULL OR level IN ('structure', 'complex', 'settlement', 'region', 'territory', 'world')),
    search_tags TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entity_tags (
    entity_id TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    tag TEXT NOT NULL CHECK (length(trim(tag)) > 0),
    created_at TEXT NOT NULL,
    PRIMARY KEY (entity_id, tag)
);

CREATE TABLE IF NOT EXISTS progression_edges (
    from_id TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    to_id TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    conditions TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (from_id, to_id),
    CHECK (from_id <> to_id)
);

CREATE TABLE IF NOT EXISTS containment_edges (
    child_id TEXT PRIMARY KEY REFERENCES entities(entity_id) ON DELETE CASCADE,
    parent_id TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    since_year INTEGER,
    until_year INTEGER,
    note TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (parent_id <> child_id),
    CHECK (since_year IS NULL OR until_year IS NULL OR until_year >= since_year)
);

CREATE TABLE IF NOT EXISTS group_edges (
    entity_id TEXT PRIMARY KEY REFERENCES entities(entity_id) ON DELETE CASCADE,
    group_id TEXT NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS board_layouts (
    board_id TEXT PRIMARY KEY CHECK (length(trim(board_id)) > 0),
    layout TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
"#;

/// Migration v2: read-path indexes and the FTS5 table/triggers.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_entities_type_created
    ON entities(entity_type, created_at DESC);

CREATE INDEX IF NOT EXISTS idx_entities_category
    ON entities(category, entity_id);

CREATE INDEX IF NOT EXISTS idx_entity_tags_tag
    ON entity_tags(tag, entity_id);

CREATE INDEX IF NOT EXISTS idx_progression_to
    ON progression_edges(to_id, from_id);

CREATE INDEX IF NOT EXISTS idx_containment_parent
    ON containment_edges(parent_id, child_id);

CREATE INDEX IF NOT EXISTS idx_group_edges_group
    ON group_edges(group_id, entity_id);

CREATE VIRTUAL TABLE IF NOT EXISTS entities_fts USING fts5(
    name,
    description,
    tags,
    entity_id UNINDEXED,
    tokenize='porter unicode61',
    prefix='2 3'
);

CREATE TRIGGER IF NOT EXISTS entities_ai
AFTER INSERT ON entities
BEGIN
    INSERT INTO entities_fts(rowid, name, description, tags, entity_id)
    VALUES (
        new.rowid,
        new.name,
        COALESCE(new.description, ''),
        COALESCE(new.search_tags, ''),
        new.entity_id
    );
END;

CREATE TRIGGER IF NOT EXISTS entities_au
AFTER UPDATE ON entities
BEGIN
    DELETE FROM entities_fts WHERE rowid = old.rowid;

    INSERT INTO entities_fts(rowid, name, description, tags, entity_id)
    VALUES (
        new.rowid,
        new.name,
        COALESCE(new.description, ''),
        COALESCE(new.search_tags, ''),
        new.entity_id
    );
END;

CREATE TRIGGER IF NOT EXISTS entities_ad
AFTER DELETE ON entities
BEGIN
    DELETE FROM entities_fts WHERE rowid = old.rowid;
END;

DELETE FROM entities_fts;
INSERT INTO entities_fts(rowid, name, description, tags, entity_id)
SELECT
    rowid,
    name,
    COALESCE(description, ''),
    COALESCE(search_tags, ''),
    entity_id
FROM entities;

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
"#;

/// Indexes expected by the list/filter/annotation query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_entities_type_created",
    "idx_entities_category",
    "idx_entity_tags_tag",
    "idx_progression_to",
    "idx_containment_parent",
    "idx_group_edges_group",
];
