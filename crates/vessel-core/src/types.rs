//! # Domain Types
//!
//! Core domain types shared by the container manager, the movement ledger and
//! the read-only auditors.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   StockItem     │   │  MovementEntry  │   │   SaleRecord    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  current_stock  │   │  item_id        │   │  customer_id    │       │
//! │  │  (signed!)      │   │  movement_type  │   │  total_cents    │       │
//! │  │  full pool      │   │  quantity (≥0)  │   │  completed_at   │       │
//! │  │  version (CAS)  │   │  reference      │   │                 │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  Container units and their sale history live in [`crate::container`]. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Signed Stock
//! `current_stock` and container `remaining` are plain signed integers
//! everywhere. The only clamp to zero is [`StockItem::available_stock`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::container::ContainerStatus;
use crate::error::ValidationError;
use crate::money::Money;
use crate::stock;

// =============================================================================
// Stock Item
// =============================================================================

/// One sellable item and its physical stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockItem {
    /// Unique identifier (UUID v4 unless supplied by the catalog).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Signed on-hand quantity. Negative means oversold / backordered.
    pub current_stock: i64,

    /// Quantity earmarked but not yet consumed. Never negative.
    pub reserved_stock: i64,

    /// Stock threshold below which restocking is recommended.
    pub reorder_point: i64,

    pub auto_reorder_enabled: bool,

    /// Days between automatic reorders.
    pub restock_frequency_days: i64,

    /// Incremental mean of past restock quantities, if any restock happened.
    pub average_restock_quantity: Option<f64>,

    pub restock_count: i64,

    #[ts(as = "Option<String>")]
    pub last_restock_date: Option<DateTime<Utc>>,

    /// Nominal units per sealed container (e.g. ml per bottle).
    /// 0 means the item is not container-tracked.
    pub container_capacity: i64,

    /// Anonymous pool of unopened containers.
    pub full_containers: i64,

    /// Optimistic concurrency version, bumped by every committed mutation.
    pub version: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StockItem {
    /// Creates a fresh item with zero stock.
    pub fn new(sku: impl Into<String>, name: impl Into<String>, container_capacity: i64) -> Self {
        let now = Utc::now();
        StockItem {
            id: Uuid::new_v4().to_string(),
            sku: sku.into(),
            name: name.into(),
            current_stock: 0,
            reserved_stock: 0,
            reorder_point: 0,
            auto_reorder_enabled: false,
            restock_frequency_days: 0,
            average_restock_quantity: None,
            restock_count: 0,
            last_restock_date: None,
            container_capacity: container_capacity.max(0),
            full_containers: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether stock is held as containers of `container_capacity` units.
    #[inline]
    pub fn is_container_tracked(&self) -> bool {
        self.container_capacity > 0
    }

    /// The only stock figure shown to storefront / checkout callers.
    #[inline]
    pub fn available_stock(&self) -> i64 {
        stock::get_available_stock(self)
    }

    /// Applies a restock analytics patch produced by
    /// [`stock::calculate_restock_analytics`].
    pub fn apply_restock_analytics(&mut self, patch: &stock::RestockAnalytics) {
        self.last_restock_date = Some(patch.last_restock_date);
        self.restock_count = patch.restock_count;
        self.average_restock_quantity = Some(patch.average_restock_quantity);
    }
}

// =============================================================================
// Movement Type
// =============================================================================

/// Kind of stock-affecting event recorded in the movement ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Sale,
    Purchase,
    Return,
    AdjustmentIn,
    AdjustmentOut,
    Damage,
    Expired,
    CancellationReversal,
    BundleSale,
    Transfer,
}

/// Which side of the in/out reconciliation a movement counts towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementType {
    pub const ALL: [MovementType; 10] = [
        MovementType::Sale,
        MovementType::Purchase,
        MovementType::Return,
        MovementType::AdjustmentIn,
        MovementType::AdjustmentOut,
        MovementType::Damage,
        MovementType::Expired,
        MovementType::CancellationReversal,
        MovementType::BundleSale,
        MovementType::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Sale => "sale",
            MovementType::Purchase => "purchase",
            MovementType::Return => "return",
            MovementType::AdjustmentIn => "adjustment_in",
            MovementType::AdjustmentOut => "adjustment_out",
            MovementType::Damage => "damage",
            MovementType::Expired => "expired",
            MovementType::CancellationReversal => "cancellation_reversal",
            MovementType::BundleSale => "bundle_sale",
            MovementType::Transfer => "transfer",
        }
    }

    /// Bucket used by ledger reconciliation.
    ///
    /// `Transfer` and `BundleSale` return `None`: they need pairing logic
    /// the simple in/out totals do not have, and are excluded on purpose.
    pub fn reconciliation_direction(&self) -> Option<MovementDirection> {
        match self {
            MovementType::Purchase
            | MovementType::AdjustmentIn
            | MovementType::Return
            | MovementType::CancellationReversal => Some(MovementDirection::In),
            MovementType::Sale
            | MovementType::AdjustmentOut
            | MovementType::Damage
            | MovementType::Expired => Some(MovementDirection::Out),
            MovementType::BundleSale | MovementType::Transfer => None,
        }
    }

    /// Sign applied to `current_stock` when this movement is recorded at
    /// item level.
    ///
    /// Follows [`reconciliation_direction`](Self::reconciliation_direction):
    /// a movement the auditor cannot count has no sign, so recording it
    /// alone would show up as drift.
    pub fn stock_sign(&self) -> Option<i64> {
        self.reconciliation_direction().map(|d| match d {
            MovementDirection::In => 1,
            MovementDirection::Out => -1,
        })
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "movement_type".to_string(),
                allowed: MovementType::ALL.iter().map(|t| t.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Movement Entry
// =============================================================================

/// One row of the append-only movement ledger.
///
/// `quantity` is a non-negative magnitude; direction is implied by
/// `movement_type`. Corrections are new offsetting entries, never edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MovementEntry {
    pub id: String,
    pub item_id: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    /// External correlation key (transaction id, restock reference, ...).
    pub reference: String,
    /// Unit cost in cents, recorded on purchases when known.
    pub unit_cost_cents: Option<i64>,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl MovementEntry {
    /// Builds a new entry stamped now. `quantity` is stored as its magnitude.
    pub fn new(
        item_id: impl Into<String>,
        movement_type: MovementType,
        quantity: i64,
        reference: impl Into<String>,
    ) -> Self {
        MovementEntry {
            id: Uuid::new_v4().to_string(),
            item_id: item_id.into(),
            movement_type,
            quantity: quantity.abs(),
            reference: reference.into(),
            unit_cost_cents: None,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.created_by = Some(actor.into());
        self
    }

    pub fn with_unit_cost(mut self, cost: Option<Money>) -> Self {
        self.unit_cost_cents = cost.map(|c| c.cents());
        self
    }
}

// =============================================================================
// Sale Records
// =============================================================================

/// The status of a sale transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Sale is in progress.
    #[default]
    Draft,
    /// Sale has been paid and finalized.
    Completed,
    /// Sale was cancelled/refunded.
    Voided,
}

/// Higher-level sale record, input of the duplicate-sale detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleRecord {
    pub id: String,
    pub receipt_number: String,
    /// Customer / patient reference. Walk-in sales have none.
    pub customer_id: Option<String>,
    pub total_cents: i64,
    pub status: SaleStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SaleRecord {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Timestamp used for duplicate analysis: completion time, else creation.
    #[inline]
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.created_at)
    }
}

// =============================================================================
// Operation Results
// =============================================================================

/// Outcome of consuming stock for a sale. Overselling is reported here,
/// never raised as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConsumptionResult {
    pub item_id: String,
    /// Container the quantity was drawn from; `None` for items that are not
    /// container-tracked or have no container at all.
    pub container_id: Option<String>,
    pub quantity: i64,
    /// Container `remaining` after the sale, or the item's `current_stock`
    /// when no container was involved.
    pub remaining_after: i64,
    pub status: Option<ContainerStatus>,
    pub oversold: bool,
    pub current_stock: i64,
    pub available_stock: i64,
}

/// Outcome of a restock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestockResult {
    pub item_id: String,
    pub new_current_stock: i64,
    /// Containers added (0 for items that are not container-tracked).
    pub containers_added: i64,
    /// Ids of individually tracked units created (batch/expiry restocks).
    pub tracked_container_ids: Vec<String>,
    /// Units added to `current_stock`.
    pub quantity_added: i64,
}

/// Outcome of a manual container correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdjustmentResult {
    pub item_id: String,
    pub container_id: String,
    pub previous_remaining: i64,
    pub new_remaining: i64,
    pub status: ContainerStatus,
    pub previous_current_stock: i64,
    pub current_stock: i64,
}

/// Outcome of archiving a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArchiveOutcome {
    /// Unit kept with status `empty` and its sale history intact.
    /// `discarded` is the positive remainder written off, if any.
    SoftArchived { container_id: String, discarded: i64 },
    /// Unit physically removed together with its sale history.
    Deleted { container_id: String },
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciliation_buckets() {
        use MovementDirection::*;
        assert_eq!(MovementType::Purchase.reconciliation_direction(), Some(In));
        assert_eq!(MovementType::Return.reconciliation_direction(), Some(In));
        assert_eq!(
            MovementType::CancellationReversal.reconciliation_direction(),
            Some(In)
        );
        assert_eq!(MovementType::Sale.reconciliation_direction(), Some(Out));
        assert_eq!(MovementType::Expired.reconciliation_direction(), Some(Out));
        assert_eq!(MovementType::Transfer.reconciliation_direction(), None);
        assert_eq!(MovementType::BundleSale.reconciliation_direction(), None);
    }

    #[test]
    fn test_stock_sign() {
        assert_eq!(MovementType::Damage.stock_sign(), Some(-1));
        assert_eq!(MovementType::AdjustmentIn.stock_sign(), Some(1));
        assert_eq!(MovementType::BundleSale.stock_sign(), None);
        assert_eq!(MovementType::Transfer.stock_sign(), None);
    }

    #[test]
    fn test_movement_type_round_trips_through_str() {
        for t in MovementType::ALL {
            assert_eq!(t.as_str().parse::<MovementType>().unwrap(), t);
        }
        assert!("restock".parse::<MovementType>().is_err());
    }

    #[test]
    fn test_movement_type_serde_matches_ledger_strings() {
        let json = serde_json::to_string(&MovementType::CancellationReversal).unwrap();
        assert_eq!(json, "\"cancellation_reversal\"");
    }

    #[test]
    fn test_movement_entry_stores_magnitude() {
        let entry = MovementEntry::new("P1", MovementType::AdjustmentOut, -4, "COUNT-1");
        assert_eq!(entry.quantity, 4);
    }

    #[test]
    fn test_new_item_not_container_tracked_without_capacity() {
        let item = StockItem::new("GAUZE", "Gauze pad", 0);
        assert!(!item.is_container_tracked());
        let bottle = StockItem::new("SAL-500", "Saline 500ml", 500);
        assert!(bottle.is_container_tracked());
    }

    #[test]
    fn test_sale_occurred_at_prefers_completion() {
        let created = Utc::now();
        let completed = created + chrono::Duration::seconds(30);
        let sale = SaleRecord {
            id: "s1".into(),
            receipt_number: "R1".into(),
            customer_id: None,
            total_cents: 100,
            status: SaleStatus::Completed,
            created_at: created,
            completed_at: Some(completed),
        };
        assert_eq!(sale.occurred_at(), completed);
    }
}
