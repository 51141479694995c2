//! # Audit Arithmetic
//!
//! Pure reporting logic behind the Reconciliation Auditor and the Duplicate
//! Detector. Everything here produces advisory reports; nothing here decides
//! to correct anything.
//!
//! ## Reconciliation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ledger ─► totals by type ─► in  = purchase + adjustment_in            │
//! │                                    + return + cancellation_reversal    │
//! │                              out = sale + adjustment_out               │
//! │                                    + damage + expired                  │
//! │                              (transfer, bundle_sale: excluded)         │
//! │                                                                         │
//! │  calculated  = in - out                                                │
//! │  discrepancy = current_stock - calculated                              │
//! │  reported when |discrepancy| > tolerance                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::money::Money;
use crate::types::{MovementDirection, MovementEntry, MovementType, SaleRecord, SaleStatus, StockItem};

// =============================================================================
// Ledger Totals
// =============================================================================

/// Summed quantity of one movement type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TypeTotal {
    pub movement_type: MovementType,
    pub quantity: i64,
}

/// Per-item ledger totals, bucketed for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerTotals {
    pub item_id: String,
    /// Every type that has entries, in declaration order.
    pub by_type: Vec<TypeTotal>,
    pub total_in: i64,
    pub total_out: i64,
    /// Sum of `transfer` and `bundle_sale` quantities, left out of in/out.
    pub excluded: i64,
}

impl LedgerTotals {
    /// Buckets `(type, summed quantity)` pairs as returned by a
    /// `GROUP BY movement_type` query. Repeated types are added together.
    pub fn from_type_sums(
        item_id: impl Into<String>,
        sums: impl IntoIterator<Item = (MovementType, i64)>,
    ) -> Self {
        let mut merged: BTreeMap<MovementType, i64> = BTreeMap::new();
        for (movement_type, quantity) in sums {
            *merged.entry(movement_type).or_default() += quantity;
        }

        let mut totals = LedgerTotals {
            item_id: item_id.into(),
            by_type: Vec::with_capacity(merged.len()),
            total_in: 0,
            total_out: 0,
            excluded: 0,
        };

        for (movement_type, quantity) in merged {
            match movement_type.reconciliation_direction() {
                Some(MovementDirection::In) => totals.total_in += quantity,
                Some(MovementDirection::Out) => totals.total_out += quantity,
                None => totals.excluded += quantity,
            }
            totals.by_type.push(TypeTotal {
                movement_type,
                quantity,
            });
        }

        totals
    }

    /// Quantity recorded for one type, 0 if none.
    pub fn quantity_of(&self, movement_type: MovementType) -> i64 {
        self.by_type
            .iter()
            .find(|t| t.movement_type == movement_type)
            .map(|t| t.quantity)
            .unwrap_or(0)
    }

    /// Stock implied by the ledger: `in - out`.
    #[inline]
    pub fn calculated_stock(&self) -> i64 {
        self.total_in - self.total_out
    }
}

// =============================================================================
// Discrepancies
// =============================================================================

/// What part of the catalog a reconciliation run covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "scope", content = "value", rename_all = "snake_case")]
pub enum ReconciliationScope {
    All,
    Items(Vec<String>),
    /// A random sample of at most this many items.
    Sample(u32),
}

/// One item whose stock and ledger disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscrepancyReport {
    pub item_id: String,
    pub sku: String,
    pub name: String,
    pub current_stock: i64,
    pub calculated_stock: i64,
    /// `current_stock - calculated_stock`.
    pub discrepancy: i64,
    pub total_in: i64,
    pub total_out: i64,
    #[ts(as = "String")]
    pub checked_at: DateTime<Utc>,
}

/// Compares an item against its ledger totals.
///
/// Returns `None` when `|discrepancy| <= tolerance`.
pub fn check_discrepancy(
    item: &StockItem,
    totals: &LedgerTotals,
    tolerance: f64,
    checked_at: DateTime<Utc>,
) -> Option<DiscrepancyReport> {
    let calculated_stock = totals.calculated_stock();
    let discrepancy = item.current_stock - calculated_stock;

    if (discrepancy as f64).abs() <= tolerance {
        return None;
    }

    Some(DiscrepancyReport {
        item_id: item.id.clone(),
        sku: item.sku.clone(),
        name: item.name.clone(),
        current_stock: item.current_stock,
        calculated_stock,
        discrepancy,
        total_in: totals.total_in,
        total_out: totals.total_out,
        checked_at,
    })
}

// =============================================================================
// Duplicate Reports
// =============================================================================

/// Ledger entries sharing `(reference, item_id, movement_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DuplicateMovementGroup {
    pub reference: String,
    pub item_id: String,
    pub movement_type: MovementType,
    pub count: i64,
    /// Every member, oldest first.
    pub entries: Vec<MovementEntry>,
}

/// Completed sales sharing customer, total and calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DuplicateSaleGroup {
    pub customer_id: String,
    pub total_cents: i64,
    #[ts(as = "String")]
    pub day: NaiveDate,
    pub count: i64,
    pub sales: Vec<SaleRecord>,
}

/// Two sales for the same customer and total, close together in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RapidDuplicatePair {
    pub customer_id: String,
    pub total_cents: i64,
    pub first: SaleRecord,
    pub second: SaleRecord,
    pub seconds_apart: i64,
}

/// Time range inspected by a duplicate scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ScanWindow {
    #[ts(as = "String")]
    pub from: DateTime<Utc>,
    #[ts(as = "String")]
    pub to: DateTime<Utc>,
}

impl ScanWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        ScanWindow { from, to }
    }

    /// The `days` days up to `now`.
    pub fn last_days(days: i64, now: DateTime<Utc>) -> Self {
        ScanWindow {
            from: now - chrono::Duration::days(days),
            to: now,
        }
    }

    #[inline]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.to
    }
}

/// Output of one duplicate scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DuplicateScanReport {
    pub window: ScanWindow,
    pub duplicate_movements: Vec<DuplicateMovementGroup>,
    pub duplicate_sales: Vec<DuplicateSaleGroup>,
    pub rapid_duplicates: Vec<RapidDuplicatePair>,
}

impl DuplicateScanReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_movements.is_empty()
            && self.duplicate_sales.is_empty()
            && self.rapid_duplicates.is_empty()
    }
}

// =============================================================================
// Sale Grouping
// =============================================================================

/// Completed sales that carry a customer. Walk-in sales cannot be compared.
fn comparable_sales(sales: &[SaleRecord]) -> impl Iterator<Item = (&str, &SaleRecord)> {
    sales.iter().filter_map(|s| match (&s.customer_id, s.status) {
        (Some(customer), SaleStatus::Completed) => Some((customer.as_str(), s)),
        _ => None,
    })
}

/// Groups completed sales by `(customer, total, day)` and keeps groups with
/// more than one member.
pub fn find_duplicate_sales(sales: &[SaleRecord]) -> Vec<DuplicateSaleGroup> {
    let mut groups: BTreeMap<(&str, Money, NaiveDate), Vec<&SaleRecord>> = BTreeMap::new();
    for (customer, sale) in comparable_sales(sales) {
        groups
            .entry((customer, sale.total(), sale.occurred_at().date_naive()))
            .or_default()
            .push(sale);
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|((customer, total, day), mut members)| {
            members.sort_by_key(|s| s.occurred_at());
            DuplicateSaleGroup {
                customer_id: customer.to_string(),
                total_cents: total.cents(),
                day,
                count: members.len() as i64,
                sales: members.into_iter().cloned().collect(),
            }
        })
        .collect()
}

/// Flags adjacent sales of the same customer and total that are at most
/// `window_secs` apart.
pub fn find_rapid_duplicates(sales: &[SaleRecord], window_secs: i64) -> Vec<RapidDuplicatePair> {
    let mut groups: BTreeMap<(&str, Money), Vec<&SaleRecord>> = BTreeMap::new();
    for (customer, sale) in comparable_sales(sales) {
        groups.entry((customer, sale.total())).or_default().push(sale);
    }

    let mut pairs = Vec::new();
    for ((customer, total), mut members) in groups {
        members.sort_by_key(|s| s.occurred_at());
        for window in members.windows(2) {
            let (first, second) = (window[0], window[1]);
            let seconds_apart = (second.occurred_at() - first.occurred_at()).num_seconds();
            if seconds_apart <= window_secs {
                pairs.push(RapidDuplicatePair {
                    customer_id: customer.to_string(),
                    total_cents: total.cents(),
                    first: first.clone(),
                    second: second.clone(),
                    seconds_apart,
                });
            }
        }
    }
    pairs
}

// =============================================================================
// Unit Tests
// =============================================================================
