//! EMK - Base types and configuration constants

use thiserror::Error;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Number of distinct emergency kinds a node can track (one bit each)
pub const EMERGENCY_KINDS: usize = 64;

/// Default number of simultaneously-active nodes a deployment supports
pub const DEFAULT_MAX_ENTITIES: EntityCount = 255;

// ============================================================================
// Basic Types
// ============================================================================

/// Emergency kind identifier (bit position in a node's bitmap)
pub type EmergencyKind = u8;

/// Emergency bitmap, bit `i` set means kind `i` is active
pub type EmergencyMask = u64;

/// Count of nodes (aggregate) or of active kinds (node)
pub type EntityCount = u32;

/// Check that `kind` addresses a bit inside the node bitmap
#[inline]
pub fn check_kind(kind: EmergencyKind) -> Result<EmergencyMask> {
    if (kind as usize) < EMERGENCY_KINDS {
        Ok(1 << kind)
    } else {
        Err(Error::OutOfRange { kind })
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Result type for EMK operations
pub type Result<T> = core::result::Result<T, Error>;

/// Error codes
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Emergency kind outside `[0, EMERGENCY_KINDS)`
    #[error("emergency kind {kind} out of range (max {max})", max = EMERGENCY_KINDS - 1)]
    OutOfRange {
        /// Offending kind
        kind: EmergencyKind,
    },

    /// Aggregate was already initialized
    #[error("emergency aggregate already initialized")]
    AlreadyInitialized,

    /// Aggregate decremented while its counter was already zero
    #[error("aggregate decremented below zero")]
    LogicViolation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_kind_bounds() {
        assert_eq!(check_kind(0), Ok(1));
        assert_eq!(check_kind(63), Ok(1 << 63));
        assert_eq!(check_kind(64), Err(Error::OutOfRange { kind: 64 }));
        assert_eq!(check_kind(255), Err(Error::OutOfRange { kind: 255 }));
    }

    #[test]
    fn test_error_display() {
        let err = Error::OutOfRange { kind: 100 };
        assert_eq!(err.to_string(), "emergency kind 100 out of range (max 63)");
        assert_eq!(
            Error::AlreadyInitialized.to_string(),
            "emergency aggregate already initialized"
        );
    }
}
