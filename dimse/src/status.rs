//! DIMSE status values and their classification.

use std::fmt;

/// A DIMSE status value, as carried in the Status (0000,0900)
/// element of a response command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Status(pub u16);

/// The broad classes a status value can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// The operation completed successfully.
    Success,
    /// The operation is still in progress; more responses follow.
    Pending,
    /// The operation was terminated by a cancel request.
    Cancel,
    /// The operation completed with warnings.
    Warning,
    /// The operation failed.
    Failure,
}

/// The status classification table.
/// Ranges are inclusive; the first matching row wins
/// and values matching no row classify as failures.
const STATUS_CLASSES: &[(u16, u16, StatusKind)] = &[
    (0x0000, 0x0000, StatusKind::Success),
    (0xFF00, 0xFF01, StatusKind::Pending),
    (0xFE00, 0xFE00, StatusKind::Cancel),
    // warning: attribute list / coercion warnings plus the B range
    (0x0001, 0x0001, StatusKind::Warning),
    (0x0107, 0x0107, StatusKind::Warning),
    (0x0116, 0x0116, StatusKind::Warning),
    (0xB000, 0xBFFF, StatusKind::Warning),
    (0xA000, 0xAFFF, StatusKind::Failure),
    (0xC000, 0xCFFF, StatusKind::Failure),
];

impl Status {
    /// The success status.
    pub const SUCCESS: Status = Status(0x0000);
    /// The ordinary pending status.
    pub const PENDING: Status = Status(0xFF00);
    /// Pending with optional keys not supported.
    pub const PENDING_WARNING: Status = Status(0xFF01);
    /// The operation was canceled on request.
    pub const CANCEL: Status = Status(0xFE00);
    /// Refused: out of resources.
    pub const OUT_OF_RESOURCES: Status = Status(0xA700);
    /// Error: cannot understand.
    pub const CANNOT_UNDERSTAND: Status = Status(0xC000);
    /// Refused: SOP class not supported.
    pub const SOP_CLASS_NOT_SUPPORTED: Status = Status(0x0122);

    /// Classify this status value.
    pub fn kind(self) -> StatusKind {
        STATUS_CLASSES
            .iter()
            .find(|(lo, hi, _)| (*lo..=*hi).contains(&self.0))
            .map(|(_, _, kind)| *kind)
            .unwrap_or(StatusKind::Failure)
    }

    /// Whether this is a final status (not pending).
    pub fn is_final(self) -> bool {
        self.kind() != StatusKind::Pending
    }

    /// Whether this status reports success.
    pub fn is_success(self) -> bool {
        self.kind() == StatusKind::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06X} ({:?})", self.0, self.kind())
    }
}

impl From<u16> for Status {
    fn from(value: u16) -> Self {
        Status(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_table() {
        assert_eq!(Status(0x0000).kind(), StatusKind::Success);
        assert_eq!(Status(0xFF00).kind(), StatusKind::Pending);
        assert_eq!(Status(0xFF01).kind(), StatusKind::Pending);
        assert_eq!(Status(0xFE00).kind(), StatusKind::Cancel);
        assert_eq!(Status(0xB000).kind(), StatusKind::Warning);
        assert_eq!(Status(0xB007).kind(), StatusKind::Warning);
        assert_eq!(Status(0xA700).kind(), StatusKind::Failure);
        assert_eq!(Status(0xC123).kind(), StatusKind::Failure);
        // unknown values classify as failures
        assert_eq!(Status(0x1234).kind(), StatusKind::Failure);
    }

    #[test]
    fn pending_is_not_final() {
        assert!(!Status::PENDING.is_final());
        assert!(Status::SUCCESS.is_final());
        assert!(Status::CANCEL.is_final());
    }
}
