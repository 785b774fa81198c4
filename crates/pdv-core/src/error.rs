//! # Error Types
//!
//! Domain-specific error types for pdv-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pdv-core errors (this file)                                           │
//! │  ├── CoreError        - Domain model errors                            │
//! │  └── ValidationError  - Record validation failures                     │
//! │                                                                         │
//! │  pdv-db errors (separate crate)                                        │
//! │  └── DbError          - Local store failures                           │
//! │                                                                         │
//! │  pdv-sync errors (separate crate)                                      │
//! │  └── SyncError        - Gateway / push / pull failures                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → caller                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain model errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An entity name that is not one of the six synced entities.
    ///
    /// ## When This Occurs
    /// - Parsing `--entity` arguments or config values
    /// - A corrupted `sync_status`/entity label read back from storage
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// A sync status string outside the four known states.
    #[error("Invalid sync status: {0}")]
    InvalidSyncStatus(String),

    /// A timestamp that could not be parsed.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Record validation errors.
///
/// Raised before a foreground mutation reaches the local store, so an invalid
/// record never becomes `pending-*`.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Value must be a finite number.
    #[error("{field} must be a finite number")]
    NotFinite { field: String },

    /// Invalid format (e.g., barcode with spaces).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// The record to edit is not in the local store.
    #[error("{entity} {id} does not exist")]
    NotFound { entity: String, id: String },

    /// The record is waiting for its deletion to reach the server.
    #[error("{entity} {id} is being deleted")]
    BeingDeleted { entity: String, id: String },

    /// Two fields disagree (e.g., change value vs paid - total).
    #[error("{field} is inconsistent: {reason}")]
    Inconsistent { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::UnknownEntity("supplier".to_string());
        assert_eq!(err.to_string(), "Unknown entity: supplier");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "description".to_string(),
        };
        assert_eq!(err.to_string(), "description is required");

        let err = ValidationError::Negative {
            field: "price".to_string(),
        };
        assert_eq!(err.to_string(), "price must not be negative");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
