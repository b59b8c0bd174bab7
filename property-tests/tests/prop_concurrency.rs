//! Property tests for concurrent access
//!
//! Tests invariants under parallel threads:
//! - Owned nodes: aggregate counter matches the live nodes at quiescence
//! - Shared node: concurrent raises of distinct kinds lose no update
//! - Initialization: one winner among racing callers
//! - Observers: boundary == (counter > 0) in every snapshot taken mid-run

use emk::aggregate::Aggregate;
use emk::node::{EmergencyNode, SharedNode};
use emk::types::*;
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;

// ============================================================================
// Strategies
// ============================================================================

/// Per-thread op scripts: (raise?, kind, destroy?)
fn thread_scripts() -> impl Strategy<Value = Vec<Vec<(bool, EmergencyKind, bool)>>> {
    prop::collection::vec(
        prop::collection::vec((any::<bool>(), 0u8..64u8, prop::bool::weighted(0.05)), 0..200),
        1..8,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Threads with their own nodes, in any interleaving
    #[test]
    fn owned_nodes_counter_matches_at_quiescence(scripts in thread_scripts()) {
        let agg = Aggregate::new();
        agg.initialize().unwrap();
        let barrier = Barrier::new(scripts.len());

        let nodes: Vec<EmergencyNode<'_>> = std::thread::scope(|s| {
            let handles: Vec<_> = scripts
                .iter()
                .map(|script| {
                    let (agg, barrier) = (&agg, &barrier);
                    s.spawn(move || {
                        let mut node = EmergencyNode::new(agg);
                        barrier.wait();
                        for &(raise, kind, destroy) in script {
                            if destroy {
                                node.destroy();
                            } else if raise {
                                node.raise(kind).unwrap();
                            } else {
                                node.solve(kind).unwrap();
                            }
                        }
                        node
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let live = nodes.iter().filter(|n| n.has_local_emergency()).count() as u32;
        prop_assert_eq!(agg.read_counter(), live);
        prop_assert_eq!(agg.is_boundary_active(), live > 0);
        for node in &nodes {
            prop_assert_eq!(node.active_count(), node.bitmap().count_ones());
        }

        drop(nodes);
        prop_assert_eq!(agg.read_counter(), 0);
    }

    /// M threads raising M distinct kinds on one shared node
    #[test]
    fn shared_node_no_lost_updates(threads in 1usize..=16, repeat in 1usize..50) {
        let agg = Aggregate::new();
        agg.initialize().unwrap();
        let node = SharedNode::new(&agg);
        let barrier = Barrier::new(threads);

        std::thread::scope(|s| {
            for t in 0..threads {
                let (node, barrier) = (&node, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    for _ in 0..repeat {
                        node.raise(t as EmergencyKind).unwrap();
                    }
                });
            }
        });

        prop_assert_eq!(node.active_count(), threads as u32);
        prop_assert_eq!(agg.read_counter(), 1);
        prop_assert!(node.is_emergency_active());

        node.destroy();
        prop_assert_eq!(agg.read_counter(), 0);
    }
}

#[test]
fn concurrent_initialize_single_winner() {
    for _ in 0..50 {
        let agg = Aggregate::new();
        let barrier = Barrier::new(8);
        let wins = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let (agg, barrier) = (&agg, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        agg.initialize().is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&won| won)
                .count()
        });
        assert_eq!(wins, 1);
    }
}

#[test]
fn concurrent_raise_solve_on_distinct_nodes() {
    let agg = Aggregate::new();
    agg.initialize().unwrap();

    std::thread::scope(|s| {
        for t in 0..16u8 {
            let agg = &agg;
            s.spawn(move || {
                let mut node = EmergencyNode::new(agg);
                for i in 0..10_000u32 {
                    let kind = ((i + t as u32) % 64) as EmergencyKind;
                    node.raise(kind).unwrap();
                    assert!(agg.is_boundary_active());
                    node.solve(kind).unwrap();
                }
            });
        }
    });

    assert_eq!(agg.read_counter(), 0);
    assert!(!agg.is_boundary_active());
}

#[test]
fn concurrent_observer_never_sees_torn_state() {
    let agg = Aggregate::new();
    agg.initialize().unwrap();
    let writers_done = AtomicBool::new(false);
    let barrier = Barrier::new(9);

    let (snapshots, torn) = std::thread::scope(|s| {
        let writers: Vec<_> = (0..8u32)
            .map(|t| {
                let (agg, barrier) = (&agg, &barrier);
                s.spawn(move || {
                    let mut node = EmergencyNode::new(agg);
                    barrier.wait();
                    for i in 0..20_000u32 {
                        let kind = ((i * 7 + t) % 64) as EmergencyKind;
                        match i % 5 {
                            0 | 1 | 2 => node.raise(kind).unwrap(),
                            3 => node.solve(kind).unwrap(),
                            _ => node.destroy(),
                        }
                    }
                })
            })
            .collect();

        let reader = {
            let (agg, barrier, writers_done) = (&agg, &barrier, &writers_done);
            s.spawn(move || {
                barrier.wait();
                let (mut snapshots, mut torn) = (0u64, 0u64);
                loop {
                    let done = writers_done.load(Ordering::Acquire);
                    let snap = agg.snapshot();
                    snapshots += 1;
                    if snap.boundary_active != (snap.entities_in_emergency > 0) {
                        torn += 1;
                    }
                    if done {
                        break;
                    }
                }
                (snapshots, torn)
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        writers_done.store(true, Ordering::Release);
        reader.join().unwrap()
    });

    assert!(snapshots > 0);
    assert_eq!(torn, 0);
    assert_eq!(agg.read_counter(), 0);
    assert!(!agg.is_boundary_active());
}
