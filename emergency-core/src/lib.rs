//! # EMK: Emergency Aggregation Kernel
//!
//! Tracks active emergency (fault) conditions across independent nodes of a
//! control system and exposes one shared boundary indicator that is active
//! whenever any node has an unresolved emergency.
//!
//! ## Components
//!
//! ### 1. Emergency Node
//!
//! Each node owns a 64-bit bitmap of emergency kinds and a count of set bits.
//! Raising the first kind enters the node into the aggregate; solving the last
//! one (or destroying the node) takes it out again.
//!
//! ### 2. Global Aggregate State
//!
//! Counts nodes with at least one active emergency and derives the boundary
//! indicator from that count. Counter and indicator change together in one
//! critical section.
//!
//! ## Quick Start
//!
//! ```ignore
//! use emk::prelude::*;
//!
//! emk::init()?;
//!
//! let mut node = EmergencyNode::new(emk::aggregate());
//! node.raise(3)?;
//! assert!(emk::aggregate().is_boundary_active());
//! node.solve(3)?;
//! ```
//!
//! Tests and simulations that need isolation construct their own
//! [`Aggregate`] instead of using the process-wide one.

#![warn(missing_docs)]

// Core modules
pub mod types;
pub mod hal;
pub mod aggregate;
pub mod node;

// Re-exports for convenience
pub use types::*;
pub use hal::{AlarmOutput, CountingOutput, SignalLine};
pub use aggregate::{Aggregate, AggregateConfig, AggregateSnapshot};
pub use node::{EmergencyNode, SharedNode};

/// Prelude - commonly used items
pub mod prelude {
    pub use crate::types::*;
    pub use crate::hal::AlarmOutput;
    pub use crate::aggregate::Aggregate;
    pub use crate::node::{EmergencyNode, SharedNode};
}

// ============================================================================
// Version
// ============================================================================

/// Major version
pub const VERSION_MAJOR: u32 = 0;
/// Minor version
pub const VERSION_MINOR: u32 = 1;
/// Patch version
pub const VERSION_PATCH: u32 = 0;
/// Version string
pub const VERSION_STRING: &str = "0.1.0";

/// Get version as packed integer (major << 16 | minor << 8 | patch)
pub const fn version() -> u32 {
    (VERSION_MAJOR << 16) | (VERSION_MINOR << 8) | VERSION_PATCH
}

// ============================================================================
// Process-wide Aggregate
// ============================================================================

/// Process-wide aggregate
///
/// Lives for the whole process and is never torn down. Nodes created before
/// [`init`] see a zero counter, and `init` resets it, so call it once at
/// startup before creating nodes.
static AGGREGATE: Aggregate = Aggregate::new();

/// Initialize the process-wide aggregate
///
/// Succeeds for exactly one caller per process. The reset discards every
/// count taken before it: a node that raised before `init` is no longer
/// counted, its later raises do not light the boundary until it solves back
/// to zero, and its eventual release is reported as a logic violation.
/// Call this before any node raises.
pub fn init() -> Result<()> {
    AGGREGATE.initialize()
}

/// Get the process-wide aggregate
pub fn aggregate() -> &'static Aggregate {
    &AGGREGATE
}
