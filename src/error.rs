//! Error types for the object resource registry.
//!
//! This module defines `RsrcError`, the single error type returned by the factory,
//! the registry and the entities it hands out. Every failure is a result value:
//! the registry never panics and never aborts a test on a request it cannot
//! satisfy, it reports the reason and lets the caller decide.
//!
//! ## Error Taxonomy
//!
//! - **`InvalidName`**: `allocate` was called with an empty lookup name.
//! - **`UnknownKind`**: a raw kind tag outside the closed enumeration.
//! - **`AllocationFailed`**: the factory knows the kind but could not build it
//!   (e.g. the kind needs a live device and the registry has none).
//! - **`NameCollision`**: the lookup name is already taken within the group.
//! - **`NotFound`**: lookup or release of a name that is not registered. This is
//!   an expected outcome when checking for an optional entity.
//!
//! The remaining variants are raised by typed lookups, group configuration and
//! the entities themselves.

use crate::entity::EntityKind;
use thiserror::Error;

/// Convenience alias for results using the registry error type.
pub type RsrcResult<T> = std::result::Result<T, RsrcError>;

/// Every failure the factory, the registry or an entity can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RsrcError {
    /// `allocate` was given an empty lookup name.
    #[error("Lookup name must not be empty")]
    InvalidName,

    /// Raw kind tag outside the known set.
    #[error("Unknown object kind tag: 0x{0:02X}")]
    UnknownKind(u8),

    /// Kind name from configuration that matches no kind.
    #[error("Unknown object kind name: '{0}'")]
    UnknownKindName(String),

    /// The factory could not build an entity of a known kind.
    #[error("Unable to create {kind}: {reason}")]
    AllocationFailed {
        /// Kind that was requested
        kind: EntityKind,
        /// Why construction failed
        reason: String,
    },

    /// The lookup name is already registered in this group.
    #[error("Lookup name '{0}' is already in use within the group")]
    NameCollision(String),

    /// No entity is registered under the lookup name.
    #[error("Lookup name '{0}' was not found")]
    NotFound(String),

    /// Typed lookup found an entity of a different kind.
    #[error("Object '{name}' is a {actual}, expected {expected}")]
    KindMismatch {
        /// Lookup name that was resolved
        name: String,
        /// Kind the caller asked for
        expected: EntityKind,
        /// Kind actually registered under `name`
        actual: EntityKind,
    },

    /// Metadata buffer size of zero or not dword aligned.
    #[error("Invalid metadata allocation size {0}: must be a non-zero multiple of 4")]
    InvalidMetaSize(u32),

    /// Protected-kind list names the same kind more than once.
    #[error("Protected kind {0} is listed more than once")]
    DuplicateProtectedKind(EntityKind),

    /// Queue parameters out of range for the queue's role.
    #[error("Invalid queue configuration: {0}")]
    InvalidQueueConfig(String),

    /// The command kind has no such field.
    #[error("{kind} does not support field '{field}'")]
    UnsupportedField {
        /// Command kind that was written to
        kind: EntityKind,
        /// Field name
        field: &'static str,
    },
}

impl RsrcError {
    /// Whether a test can reasonably continue after this error.
    ///
    /// Absent names, collisions and kind mismatches are outcomes a test may check
    /// for on purpose. Everything else points at harness misuse.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RsrcError::NotFound(_) | RsrcError::NameCollision(_) | RsrcError::KindMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_formats_as_hex() {
        let err = RsrcError::UnknownKind(0x2A);
        assert_eq!(err.to_string(), "Unknown object kind tag: 0x2A");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn expected_outcomes_are_recoverable() {
        assert!(RsrcError::NotFound("iosq".into()).is_recoverable());
        assert!(RsrcError::NameCollision("iosq".into()).is_recoverable());
        assert!(RsrcError::KindMismatch {
            name: "iosq".into(),
            expected: EntityKind::Iosq,
            actual: EntityKind::Iocq,
        }
        .is_recoverable());
        assert!(!RsrcError::InvalidName.is_recoverable());
        assert!(!RsrcError::DuplicateProtectedKind(EntityKind::Asq).is_recoverable());
    }

    #[test]
    fn allocation_failure_names_the_kind() {
        let err = RsrcError::AllocationFailed {
            kind: EntityKind::Read,
            reason: "no device context".into(),
        };
        assert_eq!(err.to_string(), "Unable to create Read: no device context");
    }
}
