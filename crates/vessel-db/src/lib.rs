//! # vessel-db: Persistence and Operations for the Vessel Ledger
//!
//! SQLite storage for stock items, container units, the movement ledger and
//! sale records, plus the operations that keep them consistent.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vessel Data Flow                                 │
//! │                                                                         │
//! │  Checkout / restock / dashboard workflows                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     vessel-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────────┐  ┌────────────────┐  ┌────────────────┐   │   │
//! │  │   │InventoryService│  │ Reconciliation │  │   Duplicate    │   │   │
//! │  │   │  (service.rs)  │  │    Auditor     │  │   Detector     │   │   │
//! │  │   │ locks + CAS    │  │  (read-only)   │  │  (read-only)   │   │   │
//! │  │   └───────┬────────┘  └───────┬────────┘  └───────┬────────┘   │   │
//! │  │           └───────────┬───────┴───────────────────┘            │   │
//! │  │                       ▼                                         │   │
//! │  │   ┌───────────────┐  ┌───────────────┐  ┌──────────────────┐   │   │
//! │  │   │   Database    │  │ Repositories  │  │   Migrations     │   │   │
//! │  │   │   (pool.rs)   │◄─│ item/container│  │   (embedded)     │   │   │
//! │  │   │               │  │ ledger/sale   │  │                  │   │   │
//! │  │   └───────────────┘  └───────────────┘  └──────────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and service accessors
//! - [`config`] - TOML + environment configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//! - [`locks`] - Per-item async locks
//! - [`service`] - Stock operations
//! - [`audit`] - Reconciliation and duplicate detection
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vessel_db::{Database, LedgerConfig};
//!
//! let config = LedgerConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let inventory = db.inventory_with(config.concurrency.clone());
//! let sold = inventory.consume_stock(&item_id, 30, "TXN-1042", "till-2").await?;
//! if sold.oversold {
//!     // backorder
//! }
//!
//! let drift = db.auditor(config.audit.clone()).run_sample().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod config;
pub mod error;
pub mod locks;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{AuditSettings, ConcurrencySettings, DatabaseSettings, LedgerConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use audit::{DuplicateDetector, ReconciliationAuditor};
pub use service::{CreateContainers, InventoryService, NewStockItem, RestockPolicy, RestockRequest};

// Repository re-exports for convenience
pub use repository::container::ContainerRepository;
pub use repository::item::ItemRepository;
pub use repository::ledger::LedgerRepository;
pub use repository::sale::SaleRepository;
