//! EMK - Emergency Node
//!
//! A node tracks up to [`EMERGENCY_KINDS`] emergency kinds as a bitmap and
//! keeps a local count of set bits. It is counted in the aggregate while that
//! count is nonzero, and it is the only party that reports its own
//! 0 <-> nonzero transitions.
//!
//! # Access model
//!
//! `EmergencyNode` is a plain owned value with no internal locking: mutation
//! goes through `&mut self`, so the borrow checker enforces single-owner
//! access. Wrap it in [`SharedNode`] when several threads must raise or solve
//! on the same node.
//!
//! ```ignore
//! let aggregate = Aggregate::new();
//! aggregate.initialize()?;
//!
//! let mut node = EmergencyNode::new(&aggregate);
//! node.raise(3)?;
//! assert!(node.is_emergency_active());
//! node.solve(3)?;
//! ```

use crate::aggregate::Aggregate;
use crate::hal::{AlarmOutput, SignalLine};
use crate::types::*;
use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

// ============================================================================
// Emergency Node
// ============================================================================

/// Per-entity emergency state
///
/// Dropping a node releases its aggregate count, exactly like
/// [`EmergencyNode::destroy`].
#[derive(Debug)]
pub struct EmergencyNode<'a, O: AlarmOutput = SignalLine> {
    aggregate: &'a Aggregate<O>,
    bitmap: EmergencyMask,
    active_count: EntityCount,
}

impl<'a, O: AlarmOutput> EmergencyNode<'a, O> {
    /// Create an all-clear node attached to `aggregate`
    pub fn new(aggregate: &'a Aggregate<O>) -> Self {
        Self {
            aggregate,
            bitmap: 0,
            active_count: 0,
        }
    }

    /// Reset to the all-clear state
    ///
    /// A node that was still counted hands its count back first, so
    /// reinitializing a live node cannot leave a stale entry behind.
    pub fn init(&mut self) {
        self.destroy();
    }

    /// Mark emergency `kind` active
    ///
    /// Raising an already-active kind leaves the counters untouched. Either
    /// way the boundary output is reasserted.
    pub fn raise(&mut self, kind: EmergencyKind) -> Result<()> {
        let bit = check_kind(kind)?;

        if self.bitmap & bit != 0 {
            self.aggregate.reassert_boundary();
            return Ok(());
        }

        self.bitmap |= bit;
        self.active_count += 1;
        trace!(kind, active = self.active_count, "emergency raised");

        if self.active_count == 1 {
            // First emergency on this node, increment drives the boundary
            self.aggregate.increment();
        } else {
            self.aggregate.reassert_boundary();
        }
        Ok(())
    }

    /// Mark emergency `kind` resolved
    ///
    /// Solving an inactive kind is a no-op.
    pub fn solve(&mut self, kind: EmergencyKind) -> Result<()> {
        let bit = check_kind(kind)?;

        if self.bitmap & bit == 0 {
            return Ok(());
        }

        self.bitmap &= !bit;
        self.active_count -= 1;
        trace!(kind, active = self.active_count, "emergency solved");

        if self.active_count == 0 {
            self.release();
        }
        Ok(())
    }

    /// Emergency active on this node or anywhere else in the system
    ///
    /// A node with no local emergency still answers `true` while any other
    /// node holds the boundary up.
    pub fn is_emergency_active(&self) -> bool {
        self.active_count > 0 || self.aggregate.is_boundary_active()
    }

    /// Release the aggregate count (once, regardless of how many kinds are
    /// set) and clear the node
    pub fn destroy(&mut self) {
        if self.active_count > 0 {
            self.release();
        }
        self.bitmap = 0;
        self.active_count = 0;
    }

    /// Raw bitmap
    pub fn bitmap(&self) -> EmergencyMask {
        self.bitmap
    }

    /// Number of active kinds
    pub fn active_count(&self) -> EntityCount {
        self.active_count
    }

    /// Whether this node itself has an active emergency
    pub fn has_local_emergency(&self) -> bool {
        self.active_count > 0
    }

    /// Whether `kind` is active on this node
    pub fn is_raised(&self, kind: EmergencyKind) -> Result<bool> {
        Ok(self.bitmap & check_kind(kind)? != 0)
    }

    /// Active kinds in ascending order
    pub fn active_kinds(&self) -> impl Iterator<Item = EmergencyKind> + '_ {
        (0..EMERGENCY_KINDS as EmergencyKind).filter(move |&k| (self.bitmap >> k) & 1 != 0)
    }

    /// Aggregate this node reports to
    pub fn aggregate(&self) -> &'a Aggregate<O> {
        self.aggregate
    }

    fn release(&mut self) {
        // A failed decrement is reported by the aggregate and leaves its
        // counter at 0; the node is consistent either way.
        let _ = self.aggregate.decrement();
    }
}

impl<O: AlarmOutput> Drop for EmergencyNode<'_, O> {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ============================================================================
// Shared Node
// ============================================================================

/// Mutex-guarded node for multi-thread access to one entity
///
/// Each operation holds the node lock for its full duration, so concurrent
/// raises of distinct kinds never lose an update.
#[derive(Debug)]
pub struct SharedNode<'a, O: AlarmOutput = SignalLine> {
    inner: Mutex<EmergencyNode<'a, O>>,
}

impl<'a, O: AlarmOutput> SharedNode<'a, O> {
    /// Create an all-clear shared node attached to `aggregate`
    pub fn new(aggregate: &'a Aggregate<O>) -> Self {
        Self::from_node(EmergencyNode::new(aggregate))
    }

    /// Wrap an existing node
    pub fn from_node(node: EmergencyNode<'a, O>) -> Self {
        Self {
            inner: Mutex::new(node),
        }
    }

    /// See [`EmergencyNode::raise`]
    pub fn raise(&self, kind: EmergencyKind) -> Result<()> {
        self.inner.lock().raise(kind)
    }

    /// See [`EmergencyNode::solve`]
    pub fn solve(&self, kind: EmergencyKind) -> Result<()> {
        self.inner.lock().solve(kind)
    }

    /// See [`EmergencyNode::is_emergency_active`]
    pub fn is_emergency_active(&self) -> bool {
        self.inner.lock().is_emergency_active()
    }

    /// See [`EmergencyNode::destroy`]
    pub fn destroy(&self) {
        self.inner.lock().destroy()
    }

    /// Number of active kinds
    pub fn active_count(&self) -> EntityCount {
        self.inner.lock().active_count()
    }

    /// Raw bitmap
    pub fn bitmap(&self) -> EmergencyMask {
        self.inner.lock().bitmap()
    }

    /// Lock the node for a compound operation
    pub fn lock(&self) -> MutexGuard<'_, EmergencyNode<'a, O>> {
        self.inner.lock()
    }

    /// Unwrap the inner node
    pub fn into_inner(self) -> EmergencyNode<'a, O> {
        self.inner.into_inner()
    }
}
