//! End-to-end progression flows against a real on-disk store.

use loreline_core::db::{open_store, query};
use loreline_core::graph::progression::{
    attach_to_group, get_linked, link, list_linked, relink, unlink, update_conditions,
};
use loreline_core::store::create_entity;
use loreline_core::{
    Condition, EngineConfig, EntityDraft, EntityFilter, EntityType, ErrorCode,
};
use rusqlite::Connection;
use tempfile::TempDir;

fn open_world(dir: &TempDir) -> Connection {
    open_store(dir.path(), "midgard").expect("open store")
}

fn seed(conn: &mut Connection, id: &str, entity_type: EntityType) {
    create_entity(
        conn,
        &EntityDraft {
            entity_id: id.to_string(),
            entity_type,
            name: id.to_string(),
            ..EntityDraft::default()
        },
    )
    .expect("create entity");
}

#[test]
fn rank_ladder_grows_and_rejects_the_closing_edge() {
    let dir = TempDir::new().expect("temp dir");
    let mut conn = open_world(&dir);
    for id in ["novice", "adept", "master"] {
        seed(&mut conn, id, EntityType::Rank);
    }

    // novice precedes adept, with a trial on the edge.
    link(&mut conn, "adept", "novice", &[Condition::named("trial")]).expect("link adept");
    // novice also directly precedes master: a DAG, two successors for novice.
    link(&mut conn, "master", "novice", &[]).expect("link master");
    // adept precedes master too; still acyclic.
    link(&mut conn, "master", "adept", &[]).expect("link master after adept");

    // master preceding novice would close the loop.
    let err = link(&mut conn, "novice", "master", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CycleDetected);

    // And an entity never precedes itself.
    let err = link(&mut conn, "master", "master", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SelfLoop);

    let master = get_linked(&mut conn, "master").expect("get master");
    let mut predecessor_ids: Vec<&str> = master
        .predecessors
        .iter()
        .map(|p| p.predecessor_id.as_str())
        .collect();
    predecessor_ids.sort_unstable();
    assert_eq!(predecessor_ids, vec!["adept", "novice"]);
}

#[test]
fn link_unlink_roundtrip_leaves_no_edge() {
    let dir = TempDir::new().expect("temp dir");
    let mut conn = open_world(&dir);
    seed(&mut conn, "novice", EntityType::Rank);
    seed(&mut conn, "adept", EntityType::Rank);

    link(&mut conn, "adept", "novice", &[]).expect("link");
    assert!(unlink(&mut conn, "adept", "novice").expect("unlink"));

    let listed = list_linked(
        &mut conn,
        &EntityFilter::default(),
        &EngineConfig::default(),
    )
    .expect("list");
    assert!(
        listed
            .iter()
            .all(|l| l.predecessors.is_empty() && l.successors.is_empty()),
        "round-trip leaves the pair unlinked"
    );
}

#[test]
fn conditions_replace_rather_than_append() {
    let dir = TempDir::new().expect("temp dir");
    let mut conn = open_world(&dir);
    seed(&mut conn, "novice", EntityType::Rank);
    seed(&mut conn, "adept", EntityType::Rank);
    link(&mut conn, "adept", "novice", &[Condition::named("trial")]).expect("link");

    update_conditions(
        &mut conn,
        "adept",
        "novice",
        &[Condition::named("vigil"), Condition::named("oath")],
    )
    .expect("first replace");
    update_conditions(&mut conn, "adept", "novice", &[Condition::named("oath")])
        .expect("second replace");

    let adept = get_linked(&mut conn, "adept").expect("get");
    assert_eq!(
        adept.predecessors[0].conditions,
        vec![Condition::named("oath")],
        "only the last condition list survives"
    );

    let err = update_conditions(&mut conn, "novice", "adept", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn timeline_chain_enforces_slots_and_relinks_atomically() {
    let dir = TempDir::new().expect("temp dir");
    let mut conn = open_world(&dir);
    for id in ["dawn", "noon", "dusk"] {
        seed(&mut conn, id, EntityType::Timeline);
    }

    link(&mut conn, "noon", "dawn", &[]).expect("link noon");

    // dawn already has a successor, so it cannot precede dusk as well.
    let err = link(&mut conn, "dusk", "dawn", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CardinalityConflict);

    link(&mut conn, "dusk", "noon", &[]).expect("link dusk");

    // Move noon to the end of the chain in one step.
    relink(&mut conn, "noon", Some("dusk"), None).expect("relink");
    let noon = get_linked(&mut conn, "noon").expect("get");
    assert_eq!(noon.predecessors[0].predecessor_id, "dusk");
    assert!(noon.successors.is_empty());

    // A relink that fails the guard changes nothing.
    let before = query::all_progression_pairs(&conn).expect("pairs");
    let err = relink(&mut conn, "dusk", Some("noon"), Some("noon")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CycleDetected);
    let after = query::all_progression_pairs(&conn).expect("pairs");
    assert_eq!(before, after, "failed relink rolled back");
}

#[test]
fn list_annotations_follow_filters_and_groups() {
    let dir = TempDir::new().expect("temp dir");
    let mut conn = open_world(&dir);
    for id in ["novice", "adept"] {
        seed(&mut conn, id, EntityType::Rank);
    }
    seed(&mut conn, "guard-order", EntityType::RankSystem);
    seed(&mut conn, "era", EntityType::Timeline);

    link(&mut conn, "adept", "novice", &[Condition::named("trial")]).expect("link");
    attach_to_group(&mut conn, "novice", "guard-order").expect("attach");
    attach_to_group(&mut conn, "adept", "guard-order").expect("attach");

    let filter = EntityFilter {
        entity_type: Some(EntityType::Rank),
        ..EntityFilter::default()
    };
    let ranks = list_linked(&mut conn, &filter, &EngineConfig::default()).expect("list");
    assert_eq!(ranks.len(), 2, "timeline and system filtered out");
    assert!(ranks
        .iter()
        .all(|l| l.group_id.as_deref() == Some("guard-order")));

    let adept = ranks
        .iter()
        .find(|l| l.entity.entity_id == "adept")
        .expect("adept listed");
    assert_eq!(adept.predecessors[0].conditions, vec![Condition::named("trial")]);
}

#[test]
fn store_survives_reopen() {
    let dir = TempDir::new().expect("temp dir");
    {
        let mut conn = open_world(&dir);
        seed(&mut conn, "novice", EntityType::Rank);
        seed(&mut conn, "adept", EntityType::Rank);
        link(&mut conn, "adept", "novice", &[Condition::named("trial")]).expect("link");
    }

    let mut conn = open_world(&dir);
    let adept = get_linked(&mut conn, "adept").expect("get after reopen");
    assert_eq!(adept.predecessors[0].predecessor_id, "novice");
    assert_eq!(adept.predecessors[0].conditions, vec![Condition::named("trial")]);
}
