//! Multi-threaded stress runs
//!
//! Two modes:
//! - shared: every thread raises kinds `i % 64` on one mutex-guarded node,
//!   the node must end with all 64 kinds active and nothing lost
//! - owned: every thread owns its own node and runs a seeded random
//!   raise/solve/destroy workload; at quiescence the aggregate counter must
//!   equal the number of nodes still holding an emergency

use crate::workload::{WorkloadConfig, WorkloadGenerator};
use emk::{
    Aggregate, AggregateConfig, AggregateSnapshot, CountingOutput, EmergencyKind, EmergencyNode,
    EntityCount, SharedNode, EMERGENCY_KINDS,
};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Stress run configuration
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Worker threads
    pub threads: usize,
    /// Operations per thread
    pub iterations: u32,
    /// Share one node between all threads
    pub shared: bool,
    /// Workload seed (owned mode)
    pub seed: u64,
}

/// Boundary output activity during the run
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EdgeCounts {
    pub rising: u32,
    pub falling: u32,
    pub reassertions: u32,
}

impl EdgeCounts {
    fn read(output: &CountingOutput) -> Self {
        Self {
            rising: output.rising_edges(),
            falling: output.falling_edges(),
            reassertions: output.reassertions(),
        }
    }
}

/// Stress run outcome
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub mode: &'static str,
    pub threads: usize,
    pub iterations: u32,
    /// Nodes holding an emergency at quiescence
    pub nodes_in_emergency: EntityCount,
    /// Active kinds on the shared node (shared mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_active_count: Option<EntityCount>,
    pub aggregate: AggregateSnapshot,
    pub edges: EdgeCounts,
    pub elapsed_ms: u64,
    pub passed: bool,
}

/// Run a stress test
pub fn run(config: &StressConfig) -> StressReport {
    info!(
        threads = config.threads,
        iterations = config.iterations,
        shared = config.shared,
        "starting stress run"
    );

    let aggregate = Aggregate::with_config(
        AggregateConfig {
            max_entities: config.threads.max(1) as EntityCount,
        },
        CountingOutput::new(),
    );
    // Fresh instance, cannot already be initialized
    let _ = aggregate.initialize();

    let report = if config.shared {
        run_shared(&aggregate, config)
    } else {
        run_owned(&aggregate, config)
    };

    if report.passed {
        info!(elapsed_ms = report.elapsed_ms, "stress run passed");
    } else {
        warn!(?report, "stress run failed");
    }
    report
}

fn run_shared(aggregate: &Aggregate<CountingOutput>, config: &StressConfig) -> StressReport {
    let node = SharedNode::new(aggregate);
    let start = Instant::now();

    std::thread::scope(|s| {
        for t in 0..config.threads {
            let node = &node;
            s.spawn(move || {
                for i in 0..config.iterations {
                    let kind = (i % EMERGENCY_KINDS as u32) as EmergencyKind;
                    // In range by construction
                    let _ = node.raise(kind);
                    if i % 20_000 == 0 {
                        debug!(thread = t, iteration = i, "raising");
                    }
                }
                debug!(thread = t, "finished raising");
            });
        }
    });

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let active = node.active_count();
    let snapshot = aggregate.snapshot();

    let expected_active = if config.threads == 0 {
        0
    } else {
        config.iterations.min(EMERGENCY_KINDS as u32)
    };
    let nodes_in_emergency = EntityCount::from(active > 0);
    let passed = active == expected_active
        && active == node.bitmap().count_ones()
        && snapshot.entities_in_emergency == nodes_in_emergency
        && snapshot.boundary_active == (nodes_in_emergency > 0);

    StressReport {
        mode: "shared",
        threads: config.threads,
        iterations: config.iterations,
        nodes_in_emergency,
        shared_active_count: Some(active),
        aggregate: snapshot,
        edges: EdgeCounts::read(aggregate.output()),
        elapsed_ms,
        passed,
    }
}

fn run_owned(aggregate: &Aggregate<CountingOutput>, config: &StressConfig) -> StressReport {
    let start = Instant::now();

    let nodes: Vec<EmergencyNode<'_, CountingOutput>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..config.threads)
            .map(|t| {
                let seed = config.seed.wrapping_add(t as u64);
                s.spawn(move || {
                    let ops = WorkloadGenerator::new(WorkloadConfig::default(), seed)
                        .generate(config.iterations as usize);
                    let mut node = EmergencyNode::new(aggregate);
                    for op in ops {
                        // Generated kinds are always in range
                        let _ = op.apply(&mut node);
                    }
                    debug!(thread = t, active = node.active_count(), "worker done");
                    node
                })
            })
            .collect();

        handles
            .into_iter()
            .filter_map(|handle| handle.join().ok())
            .collect()
    });

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let snapshot = aggregate.snapshot();

    let nodes_in_emergency = nodes
        .iter()
        .filter(|n| n.has_local_emergency())
        .count() as EntityCount;
    let popcount_ok = nodes
        .iter()
        .all(|n| n.active_count() == n.bitmap().count_ones());
    let passed = nodes.len() == config.threads
        && popcount_ok
        && snapshot.entities_in_emergency == nodes_in_emergency
        && snapshot.boundary_active == (nodes_in_emergency > 0);

    let edges = EdgeCounts::read(aggregate.output());
    drop(nodes);

    StressReport {
        mode: "owned",
        threads: config.threads,
        iterations: config.iterations,
        nodes_in_emergency,
        shared_active_count: None,
        aggregate: snapshot,
        edges,
        elapsed_ms,
        passed: passed && aggregate.read_counter() == 0,
    }
}
