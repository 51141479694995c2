//! # Stock Arithmetic
//!
//! Pure functions computing derived stock facts from a [`StockItem`].
//!
//! ## Signed Stock Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  current_stock:   -3 ─── 0 ─── 12                                       │
//! │                    │     │      │                                       │
//! │  is_oversold       true  false  false                                   │
//! │  backorder         3     0      0                                       │
//! │  available (r=2)   0     0      10    ← max(0, current - reserved)      │
//! │                                                                         │
//! │  Internal logic reads the signed figure. Only `get_available_stock`    │
//! │  clamps, and only that figure is shown to checkout / storefront.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here has side effects; `calculate_restock_analytics` returns a
//! patch that the caller applies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::StockItem;

/// Share of the reorder point under which a restock becomes urgent.
pub const URGENT_RESTOCK_FACTOR: f64 = 0.5;

/// `current_stock <= reorder_point * threshold`.
///
/// `threshold` is normally `1.0`; dashboards pass e.g. `1.2` to get an
/// early warning band.
pub fn needs_restock(item: &StockItem, threshold: f64) -> bool {
    (item.current_stock as f64) <= (item.reorder_point as f64) * threshold
}

/// Out of stock, oversold, or at half the reorder point or less.
pub fn needs_urgent_restock(item: &StockItem) -> bool {
    item.current_stock <= 0
        || (item.current_stock as f64) <= (item.reorder_point as f64) * URGENT_RESTOCK_FACTOR
}

/// Quantity a restock should bring in. Never negative.
///
/// With restock history: `max(average, reorder_point - current)`.
/// Without: `max(reorder_point, reorder_point - current)`.
pub fn suggested_restock_quantity(item: &StockItem) -> i64 {
    let shortfall = item.reorder_point - item.current_stock;
    let suggested = match item.average_restock_quantity {
        Some(avg) if item.restock_count > 0 => (avg.round() as i64).max(shortfall),
        _ => item.reorder_point.max(shortfall),
    };
    suggested.max(0)
}

/// Whether the automatic reorder cadence has elapsed.
///
/// False when auto-reorder is disabled or the item was never restocked.
pub fn is_auto_reorder_due(item: &StockItem, now: DateTime<Utc>) -> bool {
    if !item.auto_reorder_enabled {
        return false;
    }
    match item.last_restock_date {
        Some(last) => (now - last).num_days() >= item.restock_frequency_days,
        None => false,
    }
}

/// Units owed to customers: `abs(min(0, current_stock))`.
#[inline]
pub fn get_backorder_quantity(item: &StockItem) -> i64 {
    item.current_stock.min(0).abs()
}

#[inline]
pub fn is_oversold(item: &StockItem) -> bool {
    item.current_stock < 0
}

/// `max(0, current_stock - reserved_stock)`. Always non-negative.
#[inline]
pub fn get_available_stock(item: &StockItem) -> i64 {
    (item.current_stock - item.reserved_stock).max(0)
}

// =============================================================================
// Restock Analytics
// =============================================================================

/// Patch describing the restock-policy fields after one more restock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestockAnalytics {
    #[ts(as = "String")]
    pub last_restock_date: DateTime<Utc>,
    pub restock_count: i64,
    pub average_restock_quantity: f64,
}

/// Computes the analytics patch for a restock of `quantity` at `now`.
///
/// The mean is updated incrementally, `avg + (q - avg) / n`, so it never
/// accumulates a running sum that could overflow or drift.
pub fn calculate_restock_analytics(
    item: &StockItem,
    quantity: i64,
    now: DateTime<Utc>,
) -> RestockAnalytics {
    let count = item.restock_count.max(0) + 1;
    let old_avg = item.average_restock_quantity.unwrap_or(0.0);
    let average = old_avg + (quantity as f64 - old_avg) / count as f64;

    RestockAnalytics {
        last_restock_date: now,
        restock_count: count,
        average_restock_quantity: average,
    }
}

// =============================================================================
// Restock Candidates
// =============================================================================

/// One row of the restock worklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestockCandidate {
    pub item_id: String,
    pub sku: String,
    pub name: String,
    pub current_stock: i64,
    pub reorder_point: i64,
    pub backorder: i64,
    pub urgent: bool,
    pub suggested_quantity: i64,
    pub auto_reorder_due: bool,
}

/// Builds a worklist row when the item needs restocking at `threshold` or its
/// automatic reorder cadence has elapsed.
pub fn restock_candidate(
    item: &StockItem,
    threshold: f64,
    now: DateTime<Utc>,
) -> Option<RestockCandidate> {
    let auto_reorder_due = is_auto_reorder_due(item, now);
    if !needs_restock(item, threshold) && !auto_reorder_due {
        return None;
    }

    Some(RestockCandidate {
        item_id: item.id.clone(),
        sku: item.sku.clone(),
        name: item.name.clone(),
        current_stock: item.current_stock,
        reorder_point: item.reorder_point,
        backorder: get_backorder_quantity(item),
        urgent: needs_urgent_restock(item),
        suggested_quantity: suggested_restock_quantity(item),
        auto_reorder_due,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
