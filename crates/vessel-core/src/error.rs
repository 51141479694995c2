//! # Error Types
//!
//! Domain-specific error types for vessel-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  vessel-core errors (this file)                                        │
//! │  ├── CoreError        - Configuration / not-found failures             │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  vessel-db errors (separate crate)                                     │
//! │  └── DbError          - Database, concurrency and deadline failures    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## What Is NOT An Error
//! Selling more than is on the shelf. An oversold container is represented
//! as data (`ContainerStatus::Oversold`, negative `remaining`), never as an
//! `Err`. A sale must never be blocked by stock state.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Every variant is fatal to the single operation that raised it and is
/// reported to the immediate caller. None of them are retried.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The item cannot host containers as requested.
    ///
    /// ## When This Occurs
    /// - Creating containers for an item whose `container_capacity` is 0 and
    ///   no capacity override was supplied
    /// - Consuming by container policy on an item that is not container-tracked
    #[error("Invalid configuration for item {item_id}: {reason}")]
    InvalidConfiguration { item_id: String, reason: String },

    /// Stock item cannot be found.
    #[error("Stock item not found: {0}")]
    ItemNotFound(String),

    /// Container unit cannot be found (never existed or was physically archived).
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidConfiguration error.
    pub fn invalid_configuration(item_id: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidConfiguration {
            item_id: item_id.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur before any stock state is read, so they never leave a
/// partially applied operation behind.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
