//! Engine error taxonomy.
//!
//! Every public operation returns [`EngineError`]. Variants are grouped into
//! a small set of kinds that the HTTP layer maps onto status codes: not-found
//! is a 404, validation/self-loop/cycle are 400s, cardinality and level
//! conflicts are 409s. Guard rejections are raised before any mutation, so a
//! failed call leaves the graph unchanged.

use std::fmt;

use thiserror::Error;

use crate::model::LocationLevel;

/// Machine-readable error codes for client-side decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Validation,
    NotFound,
    SelfLoop,
    CycleDetected,
    CardinalityConflict,
    LevelViolation,
    StorageFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "E1001",
            Self::NotFound => "E2001",
            Self::SelfLoop => "E2002",
            Self::CycleDetected => "E2003",
            Self::CardinalityConflict => "E2004",
            Self::LevelViolation => "E2005",
            Self::StorageFailure => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Validation => "Malformed input",
            Self::NotFound => "Entity or edge not found",
            Self::SelfLoop => "Self-loop rejected",
            Self::CycleDetected => "Cycle would be created",
            Self::CardinalityConflict => "Chain or parent slot already occupied",
            Self::LevelViolation => "Containment level ordering broken",
            Self::StorageFailure => "Graph store failure",
        }
    }

    /// Optional remediation hint that can be surfaced to callers.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::Validation => Some("Check required fields and value ranges, then retry."),
            Self::NotFound => None,
            Self::SelfLoop => Some("An entity cannot precede or contain itself."),
            Self::CycleDetected => {
                Some("Remove or redirect progression edges to keep the graph acyclic.")
            }
            Self::CardinalityConflict => {
                Some("Unlink the existing edge before creating a new one.")
            }
            Self::LevelViolation => {
                Some("A container's structural level must be at or above its child's.")
            }
            Self::StorageFailure => Some("Retry once. If persistent, check the store file."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Which slot of a strict chain is already occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainSlot {
    /// The node already has an outgoing progression edge.
    Successor,
    /// The node already has an incoming progression edge.
    Predecessor,
}

impl fmt::Display for ChainSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Successor => f.write_str("successor"),
            Self::Predecessor => f.write_str("predecessor"),
        }
    }
}

/// Error returned by every public engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input: missing id, empty condition name, bad time window.
    #[error("invalid input: {reason}")]
    Validation { reason: String },

    /// A referenced entity does not exist.
    #[error("entity not found: '{entity_id}'")]
    EntityNotFound { entity_id: String },

    /// A referenced progression edge does not exist.
    #[error("progression edge not found: '{from_id}' -> '{to_id}'")]
    EdgeNotFound { from_id: String, to_id: String },

    /// A location exists but carries no structural level, so containment
    /// ordering cannot be evaluated.
    #[error("structural level not set on '{entity_id}'")]
    LevelNotSet { entity_id: String },

    /// An edge from an entity to itself was requested.
    #[error("self-loop rejected on '{entity_id}'")]
    SelfLoop { entity_id: String },

    /// The requested edge would close a directed cycle. The path starts and
    /// ends at the source of the rejected edge.
    #[error("cycle detected: {}", cycle_path.join(" -> "))]
    Cycle { cycle_path: Vec<String> },

    /// A strict-chain node already has an edge in the requested slot.
    #[error("'{entity_id}' already has a {slot} in its chain")]
    CardinalityConflict { entity_id: String, slot: ChainSlot },

    /// The child is already contained by a different parent.
    #[error("'{child_id}' is already contained by '{parent_id}'")]
    AlreadyHasParent { child_id: String, parent_id: String },

    /// Parent's structural level is strictly below the child's.
    #[error(
        "level violation: '{parent_id}' ({parent_level}) cannot contain '{child_id}' ({child_level})"
    )]
    LevelViolation {
        parent_id: String,
        parent_level: LocationLevel,
        child_id: String,
        child_level: LocationLevel,
    },

    /// An underlying store failure.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// Build a validation error from any displayable reason.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// The machine code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::EntityNotFound { .. } | Self::EdgeNotFound { .. } | Self::LevelNotSet { .. } => {
                ErrorCode::NotFound
            }
            Self::SelfLoop { .. } => ErrorCode::SelfLoop,
            Self::Cycle { .. } => ErrorCode::CycleDetected,
            Self::CardinalityConflict { .. } | Self::AlreadyHasParent { .. } => {
                ErrorCode::CardinalityConflict
            }
            Self::LevelViolation { .. } => ErrorCode::LevelViolation,
            Self::Storage(_) => ErrorCode::StorageFailure,
        }
    }

    /// `true` when the error means a referenced entity or edge is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.code(), ErrorCode::NotFound)
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(anyhow::Error::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::{ChainSlot, EngineError, ErrorCode};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::Validation,
            ErrorCode::NotFound,
            ErrorCode::SelfLoop,
            ErrorCode::CycleDetected,
            ErrorCode::CardinalityConflict,
            ErrorCode::LevelViolation,
            ErrorCode::StorageFailure,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::CycleDetected.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn cycle_display_joins_path() {
        let e = EngineError::Cycle {
            cycle_path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(e.to_string(), "cycle detected: a -> b -> a");
        assert_eq!(e.code(), ErrorCode::CycleDetected);
    }

    #[test]
    fn not_found_kinds_share_a_code() {
        let entity = EngineError::EntityNotFound {
            entity_id: "novice".into(),
        };
        let edge = EngineError::EdgeNotFound {
            from_id: "novice".into(),
            to_id: "adept".into(),
        };
        let level = EngineError::LevelNotSet {
            entity_id: "keep".into(),
        };
        assert!(entity.is_not_found());
        assert!(edge.is_not_found());
        assert!(level.is_not_found());
    }

    #[test]
    fn cardinality_display_names_the_slot() {
        let e = EngineError::CardinalityConflict {
            entity_id: "year-100".into(),
            slot: ChainSlot::Successor,
        };
        let s = e.to_string();
        assert!(s.contains("year-100"), "display: {s}");
        assert!(s.contains("successor"), "display: {s}");
    }
}
