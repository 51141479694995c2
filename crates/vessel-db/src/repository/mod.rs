//! # Repository Module
//!
//! Database repository implementations for the Vessel ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways In                                          │
//! │                                                                         │
//! │  Plain reads / standalone writes                                        │
//! │       db.items().get_by_id(id)                                          │
//! │       db.ledger().append(&entry)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  XxxRepository (holds the pool)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  executor-generic functions  ◄──── InventoryService / auditors          │
//! │  fetch_item, append, ...           run them on ONE transaction          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ItemRepository`](item::ItemRepository) - Stock item reads and inserts
//! - [`ContainerRepository`](container::ContainerRepository) - Container units and history
//! - [`LedgerRepository`](ledger::LedgerRepository) - Append-only movement ledger
//! - [`SaleRepository`](sale::SaleRepository) - Sale headers

pub mod container;
pub mod item;
pub mod ledger;
pub mod sale;
