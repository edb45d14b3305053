//! Edge Guard: decides whether a proposed progression edge is legal.
//!
//! # Overview
//!
//! Progression edges (`precedes`) form a directed graph. A cycle would make
//! an entity transitively precede itself, so the guard rejects any edge that
//! closes one. Two linkage policies share the same guard:
//!
//! - **Strict chain** (Timeline): each node keeps at most one successor and
//!   one predecessor, a doubly linked list.
//! - **Multi-parent DAG** (Rank): any number of predecessors, acyclicity is
//!   the only topological constraint.
//!
//! # Design
//!
//! - **Pure decision logic**: the guard never mutates. It loads a
//!   [`ProgressionIndex`] snapshot inside the caller's transaction and runs
//!   DFS over it.
//! - **Reject, don't warn**: a cycle here is a hard error carrying the cycle
//!   path, because committing it would corrupt the progression order.
//! - **O(V+E)**: each detection check visits each node and edge at most once.
//!   The graphs are tens to low hundreds of nodes, so exhaustive traversal
//!   per call is cheap.
//!
//! The cycle check also runs under the strict-chain policy: the cardinality
//! rules alone would admit closing a chain into a ring, since the two chain
//! ends have free slots.

use rusqlite::Connection;
use std::collections::{HashMap, HashSet};

use crate::db::query;
use crate::error::{ChainSlot, EngineError};
use crate::model::EntityType;

// ---------------------------------------------------------------------------
// LinkPolicy
// ---------------------------------------------------------------------------

/// The linkage policy governing a progression graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPolicy {
    /// At most one incoming and one outgoing edge per node.
    StrictChain,
    /// Any number of incoming edges; the graph must stay acyclic.
    MultiParentDag,
}

impl LinkPolicy {
    /// The policy for a given entity type, or `None` for types that do not
    /// participate in progression.
    #[must_use]
    pub const fn for_entity_type(entity_type: EntityType) -> Option<Self> {
        match entity_type {
            EntityType::Rank => Some(Self::MultiParentDag),
            EntityType::Timeline => Some(Self::StrictChain),
            EntityType::Location | EntityType::RankSystem => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ProgressionIndex
// ---------------------------------------------------------------------------

/// An adjacency snapshot of the progression graph, loaded once per
/// transaction. Immutable once built; reload after any mutation.
#[derive(Debug, Clone, Default)]
pub struct ProgressionIndex {
    /// from_id -> set of to_ids (the `precedes` direction).
    successors: HashMap<String, HashSet<String>>,
    /// to_id -> set of from_ids.
    predecessors: HashMap<String, HashSet<String>>,
}

impl ProgressionIndex {
    /// Load the full edge set from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn load(conn: &Connection) -> Result<Self, EngineError> {
        Ok(Self::from_pairs(query::all_progression_pairs(conn)?))
    }

    /// Build an index from `(from, to)` pairs. Used directly by tests.
    #[must_use]
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut successors: HashMap<String, HashSet<String>> = HashMap::new();
        let mut predecessors: HashMap<String, HashSet<String>> = HashMap::new();
        for (from, to) in pairs {
            successors.entry(from.clone()).or_default().insert(to.clone());
            predecessors.entry(to).or_default().insert(from);
        }
        Self {
            successors,
            predecessors,
        }
    }

    /// `true` when the exact edge is already present.
    #[must_use]
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.successors
            .get(from)
            .is_some_and(|set| set.contains(to))
    }

    fn successors_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.successors
            .get(id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    #[must_use]
    pub fn successor_count(&self, id: &str) -> usize {
        self.successors.get(id).map_or(0, HashSet::len)
    }

    #[must_use]
    pub fn predecessor_count(&self, id: &str) -> usize {
        self.predecessors.get(id).map_or(0, HashSet::len)
    }

    fn all_node_ids(&self) -> HashSet<&str> {
        self.successors
            .keys()
            .chain(self.predecessors.keys())
            .map(String::as_str)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Guard entry point
// ---------------------------------------------------------------------------

/// Decide whether creating `precedes(from -> to)` is legal.
///
/// Checks, in order: self-loop, existence of both endpoints, type match,
/// idempotent re-link (the exact edge already exists), strict-chain
/// cardinality, and cycle reachability (`to ->* from` in the current graph).
///
/// No mutation happens here; a rejection leaves the graph untouched.
///
/// # Errors
///
/// - [`EngineError::SelfLoop`] when `from == to`
/// - [`EngineError::EntityNotFound`] naming whichever side is missing
/// - [`EngineError::Validation`] when the endpoints have different types
/// - [`EngineError::CardinalityConflict`] under [`LinkPolicy::StrictChain`]
/// - [`EngineError::Cycle`] with the path the new edge would close
/// - [`EngineError::Storage`] for store failures
pub fn can_link(
    conn: &Connection,
    from_id: &str,
    to_id: &str,
    policy: LinkPolicy,
) -> Result<(), EngineError> {
    if from_id == to_id {
        return Err(EngineError::SelfLoop {
            entity_id: from_id.to_string(),
        });
    }

    let from = query::get_entity(conn, from_id)?.ok_or_else(|| EngineError::EntityNotFound {
        entity_id: from_id.to_string(),
    })?;
    let to = query::get_entity(conn, to_id)?.ok_or_else(|| EngineError::EntityNotFound {
        entity_id: to_id.to_string(),
    })?;
    if from.entity_type != to.entity_type {
        return Err(EngineError::validation(format!(
            "cannot link '{from_id}' ({}) to '{to_id}' ({}): progression edges stay within one entity type",
            from.entity_type, to.entity_type
        )));
    }

    let index = ProgressionIndex::load(conn)?;

    // Re-linking an existing pair replaces its conditions; always legal.
    if index.has_edge(from_id, to_id) {
        return Ok(());
    }

    if policy == LinkPolicy::StrictChain {
        if index.successor_count(from_id) > 0 {
            return Err(EngineError::CardinalityConflict {
                entity_id: from_id.to_string(),
                slot: ChainSlot::Successor,
            });
        }
        if index.predecessor_count(to_id) > 0 {
            return Err(EngineError::CardinalityConflict {
                entity_id: to_id.to_string(),
                slot: ChainSlot::Predecessor,
            });
        }
    }

    if let Some(cycle_path) = detect_cycle_on_add(&index, from_id, to_id) {
        return Err(EngineError::Cycle { cycle_path });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Core detection
// ---------------------------------------------------------------------------

/// Detect whether adding `precedes(from -> to)` would close a cycle.
///
/// The check is reachability: if a path `to ->* from` already exists, the
/// new edge completes the loop. Returns the full cycle path
/// `[from, to, ..., from]` for the error message, or `None` when safe.
#[must_use]
pub fn detect_cycle_on_add(
    index: &ProgressionIndex,
    from: &str,
    to: &str,
) -> Option<Vec<String>> {
    if from == to {
        return Some(vec![from.to_string(), from.to_string()]);
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut parent_map: HashMap<String, String> = HashMap::new();

    if dfs_find_path(index, to, from, &mut visited, &mut parent_map) {
        let mut path = vec![from.to_string()];
        reconstruct_path(&parent_map, to, from, &mut path);
        Some(path)
    } else {
        None
    }
}

/// Find every cycle currently stored, as closed paths. Consistency sweep for
/// diagnostics; a healthy store returns an empty vec.
#[must_use]
pub fn find_all_cycles(index: &ProgressionIndex) -> Vec<Vec<String>> {
    let mut cycles = Vec::new();
    let mut color: HashMap<String, Color> = HashMap::new();
    let mut parent_map: HashMap<String, String> = HashMap::new();

    for node in index.all_node_ids() {
        color.entry(node.to_string()).or_insert(Color::White);
    }

    let nodes: Vec<String> = color.keys().cloned().collect();
    for node in nodes {
        if color.get(&node) == Some(&Color::White) {
            dfs_all_cycles(index, &node, &mut color, &mut parent_map, &mut cycles);
        }
    }

    cycles
}

/// `true` when any cycle exists. Short-circuits on the first back edge.
#[must_use]
pub fn has_cycles(index: &ProgressionIndex) -> bool {
    let mut color: HashMap<String, Color> = HashMap::new();
    for node in index.all_node_ids() {
        color.insert(node.to_string(), Color::White);
    }

    let nodes: Vec<String> = color.keys().cloned().collect();
    for node in nodes {
        if color.get(&node) == Some(&Color::White) && dfs_has_cycle(index, &node, &mut color) {
            return true;
        }
    }

    false
}

// ---------------------------------------------------------------------------
// DFS internals
// ---------------------------------------------------------------------------

/// DFS colors for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Not yet visited.
    White,
    /// Currently on the DFS stack.
    Gray,
    /// Fully processed.
    Black,
}

/// DFS from `current` toward `target` following `precedes` edges, recording
/// the traversal in `parent_map` so the path can be reconstructed.
fn dfs_find_path(
    index: &ProgressionIndex,
    current: &str,
    target: &str,
    visited: &mut HashSet<String>,
    parent_map: &mut HashMap<String, String>,
) -> bool {
    if current == target {
        return true;
    }

    if !visited.insert(current.to_string()) {
        return false;
    }

    for neighbor in index.successors_of(current) {
        if !visited.contains(neighbor) {
            parent_map.insert(neighbor.to_string(), current.to_string());
            if dfs_find_path(index, neighbor, target, visited, parent_map) {
                return true;
            }
        }
    }

    false
}

/// Append the path from `start` to `end` (per `parent_map`) onto `path`.
fn reconstruct_path(
    parent_map: &HashMap<String, String>,
    start: &str,
    end: &str,
    path: &mut Vec<String>,
) {
    let mut chain = Vec::new();
    let mut current = end.to_string();

    while current != start {
        chain.push(current.clone());
        match parent_map.get(&current) {
            Some(parent) => current = parent.clone(),
            None => break,
        }
    }

    chain.push(start.to_string());
    chain.reverse();

    let skip = usize::from(path.last().map(String::as_str) == Some(start));
    for node in chain.into_iter().skip(skip) {
        path.push(node);
    }
}

fn dfs_all_cycles(
    index: &ProgressionIndex,
    node: &str,
    color: &mut HashMap<String, Color>,
    parent_map: &mut HashMap<String, String>,
    cycles: &mut Vec<Vec<String>>,
) {
    color.insert(node.to_string(), Color::Gray);

    let neighbors: Vec<String> = index.successors_of(node).map(str::to_string).collect();
    for neighbor in neighbors {
        match color.get(neighbor.as_str()) {
            Some(Color::White) => {
                parent_map.insert(neighbor.clone(), node.to_string());
                dfs_all_cycles(index, &neighbor, color, parent_map, cycles);
            }
            Some(Color::Gray) => {
                // Back edge: neighbor is on the stack, so a loop
                // neighbor -> ... -> node -> neighbor exists.
                let mut cycle = vec![neighbor.clone()];
                let mut cur = node.to_string();
                while cur != neighbor {
                    cycle.push(cur.clone());
                    match parent_map.get(&cur) {
                        Some(p) => cur = p.clone(),
                        None => break,
                    }
                }
                cycle.push(neighbor.clone());
                cycles.push(cycle);
            }
            _ => {} // Black: already fully processed.
        }
    }

    color.insert(node.to_string(), Color::Black);
}

fn dfs_has_cycle(
    index: &ProgressionIndex,
    node: &str,
    color: &mut HashMap<String, Color>,
) -> bool {
    color.insert(node.to_string(), Color::Gray);

    let neighbors: Vec<String> = index.successors_of(node).map(str::to_string).collect();
    for neighbor in neighbors {
        match color.get(neighbor.as_str()) {
            Some(Color::White) => {
                if dfs_has_cycle(index, &neighbor, color) {
                    return true;
                }
            }
            Some(Color::Gray) => return true,
            _ => {}
        }
    }

    color.insert(node.to_string(), Color::Black);
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
