//! EMK - Global Aggregate State
//!
//! Process-wide count of nodes with at least one active emergency, and the
//! boundary indicator derived from it.
//!
//! # Consistency
//!
//! The counter and the indicator live behind one lock and every operation
//! updates both in the same critical section. A 0 -> 1 increment raises the
//! indicator (and drives the output) before the lock is released, a 1 -> 0
//! decrement clears it the same way. No observer holding the lock can see
//! `boundary != (counter > 0)`.
//!
//! The one-time initialization gate is a separate atomic claimed with a
//! compare-and-swap while the counter lock is held, so exactly one concurrent
//! caller of [`Aggregate::initialize`] succeeds and its reset cannot
//! interleave with an increment.

use crate::hal::{AlarmOutput, SignalLine};
use crate::types::*;
use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Aggregate configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Simultaneously-active nodes the deployment supports
    ///
    /// Counting past this is a caller-contract violation. It is reported,
    /// not refused.
    pub max_entities: EntityCount,
}

impl AggregateConfig {
    /// Default configuration, usable in const context
    pub const DEFAULT: Self = Self {
        max_entities: DEFAULT_MAX_ENTITIES,
    };
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Aggregate state read in a single critical section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    /// Nodes currently reporting at least one emergency
    pub entities_in_emergency: EntityCount,
    /// Boundary indicator level
    pub boundary_active: bool,
    /// Whether `initialize` has succeeded
    pub initialized: bool,
}

// ============================================================================
// Aggregate
// ============================================================================

#[derive(Debug, Default)]
struct Counter {
    entities_in_emergency: EntityCount,
    boundary: bool,
}

/// Global aggregate state shared by every node
#[derive(Debug)]
pub struct Aggregate<O: AlarmOutput = SignalLine> {
    initialized: AtomicBool,
    state: Mutex<Counter>,
    config: AggregateConfig,
    output: O,
}

impl Aggregate<SignalLine> {
    /// Create an aggregate with default config and a plain signal line
    pub const fn new() -> Self {
        Self::with_config(AggregateConfig::DEFAULT, SignalLine::new())
    }
}

impl Default for Aggregate<SignalLine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: AlarmOutput> Aggregate<O> {
    /// Create an aggregate driving `output`
    pub const fn with_config(config: AggregateConfig, output: O) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            state: parking_lot::const_mutex(Counter {
                entities_in_emergency: 0,
                boundary: false,
            }),
            config,
            output,
        }
    }

    /// Claim one-time initialization
    ///
    /// Resets the counter to 0 and drives the output off. Every call after
    /// the first successful one fails with [`Error::AlreadyInitialized`].
    pub fn initialize(&self) -> Result<()> {
        let claimed = {
            // Claim and reset under one lock so no increment lands in between
            let mut state = self.state.lock();
            let claimed = self
                .initialized
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
            if claimed {
                *state = Counter::default();
                self.output.drive(false);
            }
            claimed
        };

        if !claimed {
            warn!("emergency aggregate already initialized");
            return Err(Error::AlreadyInitialized);
        }

        info!(
            max_entities = self.config.max_entities,
            output = self.output.platform_name(),
            "emergency aggregate initialized"
        );
        Ok(())
    }

    /// Whether `initialize` has succeeded
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Count one more node in emergency
    ///
    /// Always drives the output active, so a raise that crosses 0 -> 1 needs
    /// no separate reassertion.
    pub fn increment(&self) {
        let count = {
            let mut state = self.state.lock();
            state.entities_in_emergency = state.entities_in_emergency.saturating_add(1);
            state.boundary = true;
            self.output.drive(true);
            state.entities_in_emergency
        };

        if count == 1 {
            debug!("emergency boundary raised");
        }
        if count == self.config.max_entities.saturating_add(1) {
            warn!(
                count,
                max_entities = self.config.max_entities,
                "nodes in emergency exceed configured capacity"
            );
        }
    }

    /// Count one node fewer in emergency
    ///
    /// Clears the boundary when the counter reaches 0. Decrementing a zero
    /// counter leaves it at 0 and returns [`Error::LogicViolation`].
    pub fn decrement(&self) -> Result<()> {
        let cleared = {
            let mut state = self.state.lock();
            match state.entities_in_emergency {
                0 => None,
                n => {
                    state.entities_in_emergency = n - 1;
                    if n == 1 {
                        state.boundary = false;
                        self.output.drive(false);
                    }
                    Some(n == 1)
                }
            }
        };

        match cleared {
            None => {
                warn!("aggregate decrement with no node in emergency");
                Err(Error::LogicViolation)
            }
            Some(true) => {
                debug!("emergency boundary cleared");
                Ok(())
            }
            Some(false) => Ok(()),
        }
    }

    /// Re-drive the boundary output active
    ///
    /// Level-triggered reassertion used after every raise. Returns `false`
    /// and leaves the indicator off when no node is counted, which only
    /// happens when a caller breaks the node contract.
    pub fn reassert_boundary(&self) -> bool {
        let asserted = {
            let mut state = self.state.lock();
            if state.entities_in_emergency > 0 {
                state.boundary = true;
                self.output.drive(true);
                true
            } else {
                false
            }
        };

        if !asserted {
            warn!("boundary reassertion with no node in emergency");
        }
        asserted
    }

    /// Current number of nodes in emergency
    pub fn read_counter(&self) -> EntityCount {
        self.state.lock().entities_in_emergency
    }

    /// Boundary indicator level
    pub fn is_boundary_active(&self) -> bool {
        self.state.lock().boundary
    }

    /// Read counter, boundary and init gate together
    pub fn snapshot(&self) -> AggregateSnapshot {
        let state = self.state.lock();
        AggregateSnapshot {
            entities_in_emergency: state.entities_in_emergency,
            boundary_active: state.boundary,
            initialized: self.is_initialized(),
        }
    }

    /// Configuration
    pub fn config(&self) -> &AggregateConfig {
        &self.config
    }

    /// Output driven by the boundary indicator
    pub fn output(&self) -> &O {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::CountingOutput;

    #[test]
    fn test_initialize_once() {
        let agg = Aggregate::new();
        assert!(!agg.is_initialized());
        assert_eq!(agg.initialize(), Ok(()));
        assert!(agg.is_initialized());
        assert_eq!(agg.initialize(), Err(Error::AlreadyInitialized));
        assert_eq!(agg.read_counter(), 0);
        assert!(!agg.is_boundary_active());
    }

    #[test]
    fn test_initialize_concurrent_single_winner() {
        let agg = Aggregate::new();
        let winners = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| agg.initialize())).collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|r| r.is_ok())
                .count()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_increment_after_observed_init_survives_reset() {
        for _ in 0..200 {
            let agg = Aggregate::new();
            std::thread::scope(|s| {
                s.spawn(|| {
                    while !agg.is_initialized() {
                        std::hint::spin_loop();
                    }
                    agg.increment();
                });
                s.spawn(|| agg.initialize().unwrap());
            });
            assert_eq!(agg.read_counter(), 1);
            assert!(agg.is_boundary_active());
        }
    }

    #[test]
    fn test_increment_decrement_boundary() {
        let agg = Aggregate::with_config(AggregateConfig::default(), CountingOutput::new());
        agg.initialize().unwrap();

        agg.increment();
        assert_eq!(agg.read_counter(), 1);
        assert!(agg.is_boundary_active());
        assert!(agg.output().is_driven());

        agg.increment();
        assert_eq!(agg.read_counter(), 2);

        agg.decrement().unwrap();
        assert!(agg.is_boundary_active());
        agg.decrement().unwrap();
        assert_eq!(agg.read_counter(), 0);
        assert!(!agg.is_boundary_active());
        assert!(!agg.output().is_driven());

        assert_eq!(agg.output().rising_edges(), 1);
        assert_eq!(agg.output().falling_edges(), 1);
    }

    #[test]
    fn test_decrement_at_zero_saturates() {
        let agg = Aggregate::new();
        agg.initialize().unwrap();
        assert_eq!(agg.decrement(), Err(Error::LogicViolation));
        assert_eq!(agg.read_counter(), 0);
        assert!(!agg.is_boundary_active());
    }

    #[test]
    fn test_reassert_requires_counted_node() {
        let agg = Aggregate::with_config(AggregateConfig::default(), CountingOutput::new());
        agg.initialize().unwrap();
        assert!(!agg.reassert_boundary());
        assert!(!agg.is_boundary_active());

        agg.increment();
        assert!(agg.reassert_boundary());
        assert_eq!(agg.output().rising_edges(), 1);
        assert_eq!(agg.output().reassertions(), 1);
    }

    #[test]
    fn test_capacity_overrun_still_counts() {
        let config = AggregateConfig { max_entities: 2 };
        let agg = Aggregate::with_config(config, SignalLine::new());
        agg.initialize().unwrap();
        for _ in 0..3 {
            agg.increment();
        }
        assert_eq!(agg.read_counter(), 3);
    }

    #[test]
    fn test_snapshot() {
        let agg = Aggregate::new();
        assert_eq!(agg.snapshot(), AggregateSnapshot::default());
        agg.initialize().unwrap();
        agg.increment();
        assert_eq!(
            agg.snapshot(),
            AggregateSnapshot {
                entities_in_emergency: 1,
                boundary_active: true,
                initialized: true,
            }
        );
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: AggregateConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AggregateConfig::DEFAULT);
        let config: AggregateConfig = serde_json::from_str(r#"{"max_entities": 16}"#).unwrap();
        assert_eq!(config.max_entities, 16);
    }
}
