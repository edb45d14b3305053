//! Property tests: no sequence of engine operations, accepted or rejected,
//! may ever leave the progression graph cyclic or a strict chain branched.

use proptest::prelude::*;

use loreline_core::db::{open_memory_store, query};
use loreline_core::graph::guard::{ProgressionIndex, has_cycles};
use loreline_core::graph::progression::{link, relink, unlink};
use loreline_core::store::create_entity;
use loreline_core::{EntityDraft, EntityType};
use rusqlite::Connection;

const RANK_IDS: [&str; 5] = ["r0", "r1", "r2", "r3", "r4"];
const TIMELINE_IDS: [&str; 5] = ["t0", "t1", "t2", "t3", "t4"];

#[derive(Debug, Clone)]
enum Op {
    LinkRank { current: usize, previous: usize },
    LinkTimeline { current: usize, previous: usize },
    Unlink { current: usize, previous: usize },
    Relink { current: usize, previous: Option<usize>, next: Option<usize> },
}

fn arb_op() -> impl Strategy<Value = Op> {
    let idx = 0..RANK_IDS.len();
    prop_oneof![
        (idx.clone(), idx.clone()).prop_map(|(current, previous)| Op::LinkRank { current, previous }),
        (idx.clone(), idx.clone())
            .prop_map(|(current, previous)| Op::LinkTimeline { current, previous }),
        (idx.clone(), idx.clone()).prop_map(|(current, previous)| Op::Unlink { current, previous }),
        (idx.clone(), proptest::option::of(idx.clone()), proptest::option::of(idx))
            .prop_map(|(current, previous, next)| Op::Relink { current, previous, next }),
    ]
}

fn seeded_store() -> Connection {
    let mut conn = open_memory_store().expect("open store");
    for (ids, entity_type) in [
        (RANK_IDS, EntityType::Rank),
        (TIMELINE_IDS, EntityType::Timeline),
    ] {
        for id in ids {
            create_entity(
                &mut conn,
                &EntityDraft {
                    entity_id: id.to_string(),
                    entity_type,
                    name: id.to_string(),
                    ..EntityDraft::default()
                },
            )
            .expect("seed entity");
        }
    }
    conn
}

/// Apply one op, ignoring engine rejections; rejections must be no-ops.
fn apply(conn: &mut Connection, op: &Op) {
    match op {
        Op::LinkRank { current, previous } => {
            let _ = link(conn, RANK_IDS[*current], RANK_IDS[*previous], &[]);
        }
        Op::LinkTimeline { current, previous } => {
            let _ = link(conn, TIMELINE_IDS[*current], TIMELINE_IDS[*previous], &[]);
        }
        Op::Unlink { current, previous } => {
            // Alternate between the two families so both shrink.
            let _ = unlink(conn, RANK_IDS[*current], RANK_IDS[*previous]);
            let _ = unlink(conn, TIMELINE_IDS[*current], TIMELINE_IDS[*previous]);
        }
        Op::Relink { current, previous, next } => {
            let _ = relink(
                conn,
                TIMELINE_IDS[*current],
                previous.map(|i| TIMELINE_IDS[i]),
                next.map(|i| TIMELINE_IDS[i]),
            );
        }
    }
}

fn chain_slot_counts(conn: &Connection) -> Vec<(usize, usize)> {
    TIMELINE_IDS
        .iter()
        .map(|id| {
            let outgoing = query::outgoing_edges(conn, id).expect("outgoing").len();
            let incoming = query::incoming_edges(conn, id).expect("incoming").len();
            (outgoing, incoming)
        })
        .collect()
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    #[test]
    fn prop_graph_stays_acyclic(ops in proptest::collection::vec(arb_op(), 1..40)) {
        let mut conn = seeded_store();
        for op in &ops {
            apply(&mut conn, op);

            let index = ProgressionIndex::load(&conn).expect("load index");
            prop_assert!(!has_cycles(&index), "cycle after {op:?}");
        }
    }

    #[test]
    fn prop_strict_chains_never_branch(ops in proptest::collection::vec(arb_op(), 1..40)) {
        let mut conn = seeded_store();
        for op in &ops {
            apply(&mut conn, op);

            for (id, (outgoing, incoming)) in TIMELINE_IDS.iter().zip(chain_slot_counts(&conn)) {
                prop_assert!(outgoing <= 1, "'{id}' grew {outgoing} successors after {op:?}");
                prop_assert!(incoming <= 1, "'{id}' grew {incoming} predecessors after {op:?}");
            }
        }
    }

    #[test]
    fn prop_rank_and_timeline_families_never_mix(
        ops in proptest::collection::vec(arb_op(), 1..40),
    ) {
        let mut conn = seeded_store();
        for op in &ops {
            apply(&mut conn, op);
        }

        for (from, to) in query::all_progression_pairs(&conn).expect("pairs") {
            prop_assert_eq!(
                from.starts_with('r'),
                to.starts_with('r'),
                "cross-family edge {} -> {}",
                from,
                to
            );
        }
    }
}
