//! EMK Property-Based Tests
//!
//! Proptest suite for the node and aggregate invariants.
//!
//! # Usage
//!
//! ```bash
//! cargo test -p emk-property-tests                  # Run all property tests
//! cargo test -p emk-property-tests node             # Run only node tests
//! PROPTEST_CASES=1000 cargo test -p emk-property-tests  # More test cases
//! ```
//!
//! # Test Modules
//!
//! - `node`: popcount, idempotence, round trip, range checks
//! - `aggregate`: counter == nodes in emergency, boundary == counter > 0
//! - `concurrency`: owned nodes across threads, shared node lost updates

// Re-export for convenience in tests
pub use emk::*;
