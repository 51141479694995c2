//! # Auditors
//!
//! Read-only checks run on demand or on a schedule. Neither takes item locks;
//! each reads inside one transaction, which under WAL is a point-in-time
//! snapshot, and only reports. Nothing here corrects stock.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ReconciliationAuditor   stock_items ⇄ stock_movements totals          │
//! │                          ─► Vec<DiscrepancyReport>                     │
//! │                                                                         │
//! │  DuplicateDetector       stock_movements by (reference, item, type)    │
//! │                          sales by (customer, total, day)               │
//! │                          sales by (customer, total) within N seconds   │
//! │                          ─► DuplicateScanReport                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod duplicates;
pub mod reconcile;

pub use duplicates::DuplicateDetector;
pub use reconcile::ReconciliationAuditor;
