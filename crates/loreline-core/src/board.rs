//! Board Layout Store: persisted canvas geometry for the rank board.
//!
//! The layout is presentation state only, a singleton JSON document per
//! board. Saves replace the whole document; there is no partial merge, so
//! the last writer wins and the stored layout is always internally
//! consistent. A fixed entry cap keeps payloads bounded.

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::EngineConfig;
use crate::db::with_transaction;
use crate::error::EngineError;
use crate::model::entity::{format_timestamp, parse_timestamp};

/// The single rank-board layout document id.
pub const RANK_BOARD_ID: &str = "rank-board-layout";

/// A canvas coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// The full canvas geometry for a board. `BTreeMap` keeps the serialized
/// document stable across saves.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoardLayout {
    /// Entity id to node position.
    #[serde(default)]
    pub positions: BTreeMap<String, Point>,
    /// "from->to" edge key to manual bend points.
    #[serde(default)]
    pub link_points: BTreeMap<String, Vec<Point>>,
    /// "from->to" edge key to the position of its condition node.
    #[serde(default)]
    pub condition_positions: BTreeMap<String, Point>,
}

impl BoardLayout {
    /// Total stored entries: node positions, bend points, condition nodes.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.positions.len()
            + self.link_points.values().map(Vec::len).sum::<usize>()
            + self.condition_positions.len()
    }
}

/// A layout together with its last save time. `updated_at` is `None` for a
/// board that has never been saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedLayout {
    pub layout: BoardLayout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fetch a board's layout. An unsaved board yields an empty layout rather
/// than an error, so clients can render a blank canvas.
///
/// # Errors
///
/// `Storage` for store failures or a corrupt stored document.
pub fn get_layout(conn: &Connection, board_id: &str) -> Result<SavedLayout, EngineError> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT layout, updated_at FROM board_layouts WHERE board_id = ?1",
            params![board_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context(format!("load board layout '{board_id}'"))?;

    match row {
        Some((raw, updated_at)) => {
            let layout =
                serde_json::from_str(&raw).context("stored board layout is not valid JSON")?;
            Ok(SavedLayout {
                layout,
                updated_at: Some(parse_timestamp(&updated_at)?),
            })
        }
        None => Ok(SavedLayout {
            layout: BoardLayout::default(),
            updated_at: None,
        }),
    }
}

/// Replace a board's layout wholesale and return the saved state.
///
/// # Errors
///
/// `Validation` when the layout exceeds the configured entry cap; `Storage`
/// for store failures.
pub fn save_layout(
    conn: &mut Connection,
    board_id: &str,
    layout: &BoardLayout,
    config: &EngineConfig,
) -> Result<SavedLayout, EngineError> {
    let entries = layout.entry_count();
    if entries > config.board.max_entries {
        return Err(EngineError::validation(format!(
            "board layout holds {entries} entries, above the cap of {}",
            config.board.max_entries
        )));
    }

    let raw = serde_json::to_string(layout).context("encode board layout")?;
    let now = Utc::now();

    with_transaction(conn, |tx| {
        tx.execute(
            "INSERT INTO board_layouts (board_id, layout, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (board_id)
             DO UPDATE SET layout = excluded.layout, updated_at = excluded.updated_at",
            params![board_id, raw, format_timestamp(now)],
        )?;

        debug!(board_id, entries, "board layout saved");
        Ok(SavedLayout {
            layout: layout.clone(),
            updated_at: Some(now),
        })
    })
}
