//! # vessel-core: Pure Inventory Logic for the Vessel Ledger
//!
//! The container-based partial-unit inventory model as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vessel Ledger Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Collaborators (checkout, restock, dashboards)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    vessel-db (Database Layer)                   │   │
//! │  │   InventoryService • Auditor • Detector • repositories • locks │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ vessel-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   stock   │  │ container │  │   audit   │  │ validation│  │   │
//! │  │   │ available │  │ ContainerU│  │ LedgerTot │  │   rules   │  │   │
//! │  │   │  restock  │  │ selection │  │ duplicates│  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Stock items, ledger entries, sale records, operation results
//! - [`stock`] - Stock arithmetic (available stock, restock suggestions)
//! - [`container`] - Container state machine, selection policy, listing
//! - [`audit`] - Ledger bucketing, discrepancies, duplicate-sale grouping
//! - [`money`] - Integer money
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use vessel_core::container::{ContainerProvenance, ContainerStatus, ContainerUnit};
//!
//! let mut bottle = ContainerUnit::new_sealed("item-1", 10, &ContainerProvenance::default(), Utc::now());
//! bottle.consume(11, "TXN-1", "nurse", Utc::now()).unwrap();
//!
//! // Overselling is data, not an error.
//! assert_eq!(bottle.remaining, -1);
//! assert_eq!(bottle.status, ContainerStatus::Oversold);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod container;
pub mod error;
pub mod money;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use container::{ContainerStatus, ContainerUnit, ContainerView, SaleHistoryEntry};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default reconciliation tolerance.
pub const DEFAULT_RECONCILIATION_TOLERANCE: f64 = 0.01;

/// Two same-customer, same-total sales at most this many seconds apart are a
/// rapid duplicate.
pub const RAPID_DUPLICATE_WINDOW_SECS: i64 = 60;

/// Items checked by a sampled reconciliation run when no size is given.
pub const DEFAULT_RECONCILIATION_SAMPLE: u32 = 100;
