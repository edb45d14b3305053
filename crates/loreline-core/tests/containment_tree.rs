//! Containment hierarchy flows against a real on-disk store.

use loreline_core::db::open_store;
use loreline_core::graph::containment::{
    ancestors, attach, detach, list_placements, subtree_ids,
};
use loreline_core::store::{create_entity, delete_entity};
use loreline_core::{EngineConfig, EntityDraft, EntityFilter, EntityType, ErrorCode, LocationLevel};
use rusqlite::Connection;
use tempfile::TempDir;

fn open_world(dir: &TempDir) -> Connection {
    open_store(dir.path(), "midgard").expect("open store")
}

fn seed_location(conn: &mut Connection, id: &str, level: LocationLevel) {
    create_entity(
        conn,
        &EntityDraft {
            entity_id: id.to_string(),
            entity_type: EntityType::Location,
            name: id.to_string(),
            level: Some(level),
            ..EntityDraft::default()
        },
    )
    .expect("create location");
}

/// Build world -> north -> wallton -> keep.
fn seed_tree(conn: &mut Connection) {
    seed_location(conn, "world", LocationLevel::World);
    seed_location(conn, "north", LocationLevel::Region);
    seed_location(conn, "wallton", LocationLevel::Settlement);
    seed_location(conn, "keep", LocationLevel::Structure);

    attach(conn, "world", "north", None, None, None).expect("attach north");
    attach(conn, "north", "wallton", Some(120), None, Some("after the thaw")).expect("attach wallton");
    attach(conn, "wallton", "keep", None, None, None).expect("attach keep");
}

#[test]
fn tree_builds_and_walks_in_both_directions() {
    let dir = TempDir::new().expect("temp dir");
    let mut conn = open_world(&dir);
    seed_tree(&mut conn);

    let chain = ancestors(&mut conn, "keep").expect("ancestors");
    let ids: Vec<&str> = chain.iter().map(|l| l.parent_id.as_str()).collect();
    assert_eq!(ids, vec!["wallton", "north", "world"]);

    let mut subtree = subtree_ids(&mut conn, "north").expect("subtree");
    subtree.sort();
    assert_eq!(subtree, vec!["keep", "north", "wallton"]);
}

#[test]
fn level_ordering_and_single_parent_hold() {
    let dir = TempDir::new().expect("temp dir");
    let mut conn = open_world(&dir);
    seed_tree(&mut conn);
    seed_location(&mut conn, "south", LocationLevel::Region);

    // A structure cannot contain a settlement.
    let err = attach(&mut conn, "keep", "wallton", None, None, None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::LevelViolation);

    // wallton is already inside north; a second parent needs a detach first.
    let err = attach(&mut conn, "south", "wallton", None, None, None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CardinalityConflict);

    assert!(detach(&mut conn, "wallton", None).expect("detach"));
    attach(&mut conn, "south", "wallton", None, None, None).expect("reattach");

    let chain = ancestors(&mut conn, "wallton").expect("ancestors");
    assert_eq!(chain[0].parent_id, "south");
}

#[test]
fn window_validation_and_missing_levels() {
    let dir = TempDir::new().expect("temp dir");
    let mut conn = open_world(&dir);
    seed_location(&mut conn, "north", LocationLevel::Region);
    create_entity(
        &mut conn,
        &EntityDraft {
            entity_id: "unmapped".into(),
            entity_type: EntityType::Location,
            name: "Unmapped".into(),
            ..EntityDraft::default()
        },
    )
    .expect("create unleveled location");

    let err = attach(&mut conn, "north", "unmapped", Some(500), Some(100), None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation, "backwards window");

    let err = attach(&mut conn, "north", "unmapped", None, None, None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound, "level unset");
}

#[test]
fn placement_listing_filters_by_parent() {
    let dir = TempDir::new().expect("temp dir");
    let mut conn = open_world(&dir);
    seed_tree(&mut conn);

    let filter = EntityFilter {
        parent_id: Some("north".into()),
        ..EntityFilter::default()
    };
    let children =
        list_placements(&mut conn, &filter, &EngineConfig::default()).expect("list");
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].entity.entity_id, "wallton");

    let parent = children[0].parent.as_ref().expect("parent resolved");
    assert_eq!(parent.parent_id, "north");
    assert_eq!(parent.since_year, Some(120));
    assert_eq!(parent.note.as_deref(), Some("after the thaw"));
}

#[test]
fn deleting_a_location_detaches_its_subtree_edge() {
    let dir = TempDir::new().expect("temp dir");
    let mut conn = open_world(&dir);
    seed_tree(&mut conn);

    assert!(delete_entity(&mut conn, "wallton").expect("delete"));

    // keep lost its parent and north lost a child, with no dangling edge.
    assert!(ancestors(&mut conn, "keep").expect("ancestors").is_empty());
    assert_eq!(subtree_ids(&mut conn, "north").expect("subtree"), vec!["north"]);
}
