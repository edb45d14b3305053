//! FTS5 full-text search over entities with BM25 ranking.
//!
//! The `entities_fts` virtual table defined in [`super::schema`] is kept in
//! sync with `entities` via INSERT/UPDATE/DELETE triggers, so the engine
//! never writes to it directly.
//!
//! Column weights: name 3x, description 2x, tags 1x. The tokenizer is the
//! porter stemmer over `unicode61` with prefix indexes on 2 and 3
//! characters, so "wardens" matches "warden" and "war*" matches "warden".

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

/// BM25 column weights: name is the strongest signal, tags the weakest.
pub const BM25_WEIGHT_NAME: f64 = 3.0;
pub const BM25_WEIGHT_DESCRIPTION: f64 = 2.0;
pub const BM25_WEIGHT_TAGS: f64 = 1.0;

/// A full-text search hit with its BM25 relevance score (lower is better).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub entity_id: String,
    pub name: String,
    pub rank: f64,
}

/// Search the FTS5 index with weighted BM25 ranking.
///
/// `query` is FTS5 syntax: bare words are stemmed, `*` suffixes do prefix
/// matching, and boolean operators pass through.
///
/// # Errors
///
/// Returns an error if the query is malformed FTS5 syntax or the store is
/// not migrated.
pub fn search_entities(conn: &Connection, query: &str, limit: u32) -> Result<Vec<SearchHit>> {
    let sql = "SELECT f.entity_id, e.name, bm25(entities_fts, ?1, ?2, ?3) AS rank \
               FROM entities_fts f \
               INNER JOIN entities e ON e.entity_id = f.entity_id \
               WHERE entities_fts MATCH ?4 \
               ORDER BY rank, e.created_at DESC, e.entity_id ASC \
               LIMIT ?5";

    let mut stmt = conn.prepare(sql).context("prepare FTS5 BM25 search query")?;

    let rows = stmt
        .query_map(
            params![
                BM25_WEIGHT_NAME,
                BM25_WEIGHT_DESCRIPTION,
                BM25_WEIGHT_TAGS,
                query,
                limit,
            ],
            |row| {
                Ok(SearchHit {
                    entity_id: row.get(0)?,
                    name: row.get(1)?,
                    rank: row.get(2)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()
        .context(format!("collect FTS5 hits for '{query}'"))?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_store;

    fn seed(conn: &Connection) {
        conn.execute(
            "INSERT INTO entities (entity_id, entity_type, name, description, search_tags, created_at, updated_at)
             VALUES ('warden', 'rank', 'Warden of the Wall', 'Highest guard rank', 'guard wall', '2024-01-01T00:00:01.000000Z', '2024-01-01T00:00:01.000000Z'),
                    ('guard', 'rank', 'Wall Guard', 'Watches the wall by night', 'guard', '2024-01-01T00:00:02.000000Z', '2024-01-01T00:00:02.000000Z'),
                    ('scribe', 'rank', 'Scribe', 'Keeps the records', 'archive', '2024-01-01T00:00:03.000000Z', '2024-01-01T00:00:03.000000Z')",
            [],
        )
        .expect("seed entities");
    }

    #[test]
    fn search_finds_stemmed_matches() {
        let conn = open_memory_store().expect("store");
        seed(&conn);

        let hits = search_entities(&conn, "wardens", 10).expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, "warden");
    }

    #[test]
    fn search_supports_prefix_queries() {
        let conn = open_memory_store().expect("store");
        seed(&conn);

        let hits = search_entities(&conn, "wa*", 10).expect("search");
        assert!(hits.iter().any(|h| h.entity_id == "warden"));
        assert!(hits.iter().any(|h| h.entity_id == "guard"), "description hit");
    }

    #[test]
    fn updates_keep_index_in_sync() {
        let conn = open_memory_store().expect("store");
        seed(&conn);

        conn.execute(
            "UPDATE entities SET name = 'Lorekeeper' WHERE entity_id = 'scribe'",
            [],
        )
        .expect("rename");

        assert!(search_entities(&conn, "scribe", 10).expect("search").is_empty());
        let hits = search_entities(&conn, "lorekeeper", 10).expect("search");
        assert_eq!(hits.len(), 1);

        conn.execute("DELETE FROM entities WHERE entity_id = 'scribe'", [])
            .expect("delete");
        assert!(search_entities(&conn, "lorekeeper", 10).expect("search").is_empty());
    }
}
