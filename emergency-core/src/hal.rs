//! EMK - Alarm Output Abstraction
//!
//! The boundary indicator is the only output of the system. On hardware it
//! drives a shared alarm line (GPIO, relay, LED); here it is a trait so the
//! aggregate can be tested and simulated without a peripheral.
//!
//! The aggregate calls [`AlarmOutput::drive`] while holding its lock, so the
//! line level always matches the counter it was derived from.
//!
//! # Implementing an output
//!
//! ```ignore
//! struct RelayOutput { /* peripheral handle */ }
//!
//! impl AlarmOutput for RelayOutput {
//!     fn drive(&self, active: bool) {
//!         // Write relay pin
//!     }
//!
//!     fn is_driven(&self) -> bool {
//!         // Read back relay pin
//!     }
//! }
//! ```

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

// ============================================================================
// Output Trait
// ============================================================================

/// Level-triggered alarm output
///
/// `drive` must be short and non-blocking: it runs inside the aggregate's
/// critical section. Driving the same level twice is a reassertion and must
/// be harmless.
pub trait AlarmOutput: Send + Sync {
    /// Set the line level
    fn drive(&self, active: bool);

    /// Read back the current line level
    fn is_driven(&self) -> bool;

    /// Get platform name
    fn platform_name(&self) -> &'static str {
        "generic"
    }
}

// ============================================================================
// Shared Signal Line
// ============================================================================

/// Plain shared signal, readable lock-free by a polling collaborator
#[derive(Debug, Default)]
pub struct SignalLine {
    level: AtomicBool,
}

impl SignalLine {
    /// Create a line in the off state
    pub const fn new() -> Self {
        Self {
            level: AtomicBool::new(false),
        }
    }
}

impl AlarmOutput for SignalLine {
    fn drive(&self, active: bool) {
        self.level.store(active, Ordering::Release);
    }

    fn is_driven(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }

    fn platform_name(&self) -> &'static str {
        "signal-line"
    }
}

// ============================================================================
// Counting Output (for testing and simulation)
// ============================================================================

/// Output that records every edge and reassertion
#[derive(Debug, Default)]
pub struct CountingOutput {
    line: SignalLine,
    rising: AtomicU32,
    falling: AtomicU32,
    reasserted: AtomicU32,
}

impl CountingOutput {
    /// Create new counting output
    pub const fn new() -> Self {
        Self {
            line: SignalLine::new(),
            rising: AtomicU32::new(0),
            falling: AtomicU32::new(0),
            reasserted: AtomicU32::new(0),
        }
    }

    /// Number of off -> on transitions
    pub fn rising_edges(&self) -> u32 {
        self.rising.load(Ordering::Relaxed)
    }

    /// Number of on -> off transitions
    pub fn falling_edges(&self) -> u32 {
        self.falling.load(Ordering::Relaxed)
    }

    /// Number of active drives while already active
    pub fn reassertions(&self) -> u32 {
        self.reasserted.load(Ordering::Relaxed)
    }
}

impl AlarmOutput for CountingOutput {
    fn drive(&self, active: bool) {
        let was = self.line.is_driven();
        self.line.drive(active);

        let counter = match (was, active) {
            (false, true) => &self.rising,
            (true, false) => &self.falling,
            (true, true) => &self.reasserted,
            (false, false) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn is_driven(&self) -> bool {
        self.line.is_driven()
    }

    fn platform_name(&self) -> &'static str {
        "counting"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_line_levels() {
        let line = SignalLine::new();
        assert!(!line.is_driven());
        line.drive(true);
        assert!(line.is_driven());
        line.drive(false);
        assert!(!line.is_driven());
    }

    #[test]
    fn test_counting_output_edges() {
        let out = CountingOutput::new();
        out.drive(true);
        out.drive(true);
        out.drive(false);
        out.drive(false);
        out.drive(true);

        assert_eq!(out.rising_edges(), 2);
        assert_eq!(out.falling_edges(), 1);
        assert_eq!(out.reassertions(), 1);
        assert!(out.is_driven());
    }
}
