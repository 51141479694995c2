//! # Validation Module
//!
//! Input checks run before any stock state is read.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: InventoryService (vessel-db)                                 │
//! │  └── THIS MODULE: quantities, references, actors, capacities          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── UNIQUE constraints                                                │
//! │  └── Append-only triggers on the movement ledger                       │
//! │                                                                         │
//! │  Stock levels are NEVER validated: a sale is never refused because     │
//! │  the shelf is empty.                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use vessel_core::validation::{validate_quantity, validate_reference};
//!
//! assert!(validate_quantity(3).is_ok());
//! assert!(validate_reference("TXN-1").is_ok());
//! assert!(validate_reference("  ").is_err());
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Upper bound for references, actors and SKUs.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Upper bound on containers created by one restock.
pub const MAX_CONTAINERS_PER_RESTOCK: i64 = 10_000;

// =============================================================================
// String Validators
// =============================================================================

fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_IDENTIFIER_LEN,
        });
    }

    Ok(())
}

/// Validates a SKU: non-empty, bounded, alphanumerics plus `-` and `_`.
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    validate_identifier("sku", sku)?;

    if !sku
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::NotAllowed {
            field: "sku".to_string(),
            allowed: vec!["letters".into(), "digits".into(), "-".into(), "_".into()],
        });
    }

    Ok(())
}

/// Validates an external correlation key (transaction id, restock reference).
pub fn validate_reference(reference: &str) -> ValidationResult<()> {
    validate_identifier("reference", reference)
}

/// Validates an actor string. The identity itself is opaque here.
pub fn validate_actor(actor: &str) -> ValidationResult<()> {
    validate_identifier("actor", actor)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a consumed / moved quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - No upper bound: the quantity is never compared to stock on hand
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

pub fn validate_capacity(capacity: i64) -> ValidationResult<()> {
    if capacity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "container_capacity".to_string(),
        });
    }

    Ok(())
}

/// Validates how many containers one restock creates.
pub fn validate_container_count(count: i64) -> ValidationResult<()> {
    if !(1..=MAX_CONTAINERS_PER_RESTOCK).contains(&count) {
        return Err(ValidationError::OutOfRange {
            field: "count".to_string(),
            min: 1,
            max: MAX_CONTAINERS_PER_RESTOCK,
        });
    }

    Ok(())
}

/// Validates a unit cost in cents. Zero is allowed (donated stock).
pub fn validate_cost_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "cost".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
