//! Workload generation for stress runs
//!
//! Generates raise, solve and destroy operations against a single node.

use emk::{AlarmOutput, EmergencyKind, EmergencyNode, EMERGENCY_KINDS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A single node operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Raise an emergency kind
    Raise(EmergencyKind),
    /// Solve an emergency kind
    Solve(EmergencyKind),
    /// Release the node's aggregate count and clear it
    Destroy,
}

impl Operation {
    /// Apply to `node`
    pub fn apply<O: AlarmOutput>(self, node: &mut EmergencyNode<'_, O>) -> emk::Result<()> {
        match self {
            Operation::Raise(kind) => node.raise(kind),
            Operation::Solve(kind) => node.solve(kind),
            Operation::Destroy => {
                node.destroy();
                Ok(())
            }
        }
    }
}

/// Workload configuration
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Ratio of raise operations (0.0-1.0)
    pub raise_ratio: f64,
    /// Ratio of destroy operations (0.0-1.0), taken from the solve share
    pub destroy_ratio: f64,
    /// Kinds drawn from `0..kinds`
    pub kinds: u8,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            raise_ratio: 0.5,
            destroy_ratio: 0.02,
            kinds: EMERGENCY_KINDS as u8,
        }
    }
}

/// Seeded workload generator
pub struct WorkloadGenerator {
    config: WorkloadConfig,
    rng: StdRng,
}

impl WorkloadGenerator {
    /// Create a new workload generator
    pub fn new(config: WorkloadConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate the next operation
    pub fn next(&mut self) -> Operation {
        let kind = self.rng.gen_range(0..self.config.kinds.max(1));
        let roll = self.rng.gen::<f64>();

        if roll < self.config.raise_ratio {
            Operation::Raise(kind)
        } else if roll < self.config.raise_ratio + self.config.destroy_ratio {
            Operation::Destroy
        } else {
            Operation::Solve(kind)
        }
    }

    /// Generate a batch of operations
    pub fn generate(&mut self, count: usize) -> Vec<Operation> {
        (0..count).map(|_| self.next()).collect()
    }
}
