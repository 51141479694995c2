//! # Container Units
//!
//! The per-unit state machine, the container-selection policy used by sales,
//! and the listing order shown to operators.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   FULL ──consume──► PARTIAL ──consume──► EMPTY                          │
//! │     │                  │                   │                            │
//! │     │   consume below zero (sale)          │ consume (sale)             │
//! │     └──────────────┬───┴───────────────────┘                            │
//! │                    ▼                                                    │
//! │                OVERSOLD ──manual adjust (≥0)──► PARTIAL / EMPTY         │
//! │                                                                         │
//! │  • Once opened, a unit never returns to FULL.                          │
//! │  • OVERSOLD only comes from a sale; a manual adjustment re-derives     │
//! │    the status with the normal rule.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Pools
//! An item holds an anonymous count of sealed containers
//! (`StockItem::full_containers`) plus individually tracked units. A pool unit
//! only becomes a tracked unit through [`ContainerUnit::promote_from_pool`].
//!
//! ## Sale History
//! Every quantity change on a unit appends a [`SaleHistoryEntry`] carrying a
//! per-unit monotonic `sequence`. `capacity - Σ quantity_sold == remaining`
//! holds for every unit.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::StockItem;
use crate::validation;

/// Transaction reference written by manual corrections.
pub const MANUAL_ADJUSTMENT_REF: &str = "manual-adjustment";

/// Transaction reference written when a unit is soft-archived.
pub const ARCHIVE_REF: &str = "archive";

// =============================================================================
// Container Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    /// Sealed, never consumed.
    Full,
    /// Opened, `0 < remaining`.
    Partial,
    /// Depleted (`remaining <= 0`) through normal use or archival.
    Empty,
    /// A sale drove `remaining` below zero. Signals a backorder.
    Oversold,
}

impl ContainerStatus {
    pub const ALL: [ContainerStatus; 4] = [
        ContainerStatus::Full,
        ContainerStatus::Partial,
        ContainerStatus::Empty,
        ContainerStatus::Oversold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Full => "full",
            ContainerStatus::Partial => "partial",
            ContainerStatus::Empty => "empty",
            ContainerStatus::Oversold => "oversold",
        }
    }

    /// Status under the normal (non-sale) rule.
    ///
    /// A unit that was ever opened is `Partial` even when corrected back up
    /// to, or above, its capacity.
    pub fn derive(remaining: i64, capacity: i64, opened: bool) -> Self {
        if remaining <= 0 {
            ContainerStatus::Empty
        } else if !opened && remaining >= capacity {
            ContainerStatus::Full
        } else {
            ContainerStatus::Partial
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(ContainerStatus::Full),
            "partial" => Ok(ContainerStatus::Partial),
            "empty" => Ok(ContainerStatus::Empty),
            "oversold" => Ok(ContainerStatus::Oversold),
            _ => Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: ContainerStatus::ALL.iter().map(|s| s.as_str().to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Sale History
// =============================================================================

/// Immutable record of one quantity change on a unit.
///
/// `quantity_sold` is positive for consumption and negative when stock is
/// added back by a correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleHistoryEntry {
    /// Per-unit monotonic sequence, starting at 1.
    pub sequence: i64,
    pub transaction_ref: String,
    pub quantity_sold: i64,
    #[ts(as = "String")]
    pub sold_at: DateTime<Utc>,
    pub sold_by: String,
}

// =============================================================================
// Provenance
// =============================================================================

/// Batch / expiry metadata supplied at restock time.
///
/// When any field is present the restocked containers are tracked
/// individually; otherwise they join the anonymous full pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ContainerProvenance {
    pub batch_number: Option<String>,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl ContainerProvenance {
    pub fn requires_tracking(&self) -> bool {
        self.batch_number.is_some() || self.expiry_date.is_some() || self.notes.is_some()
    }
}

// =============================================================================
// Container Unit
// =============================================================================

/// One individually tracked container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ContainerUnit {
    pub id: String,
    pub item_id: String,
    pub capacity: i64,
    /// Signed. Never clamped in storage.
    pub remaining: i64,
    pub status: ContainerStatus,
    /// High-water mark: the unit was consumed or corrected at least once.
    pub opened: bool,
    pub opened_at: Option<DateTime<Utc>>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Set by the first archive request.
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Chronological, append-only. Loaded separately from its own table.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub sale_history: Vec<SaleHistoryEntry>,
}

/// What archiving a unit will do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveDisposition {
    /// Keep the row, force `Empty`, write off any positive remainder.
    SoftArchive,
    /// Remove the row and its history.
    Delete,
}

impl ContainerUnit {
    /// A sealed unit with its own provenance.
    pub fn new_sealed(
        item_id: impl Into<String>,
        capacity: i64,
        provenance: &ContainerProvenance,
        now: DateTime<Utc>,
    ) -> Self {
        ContainerUnit {
            id: Uuid::new_v4().to_string(),
            item_id: item_id.into(),
            capacity,
            remaining: capacity,
            status: ContainerStatus::Full,
            opened: false,
            opened_at: None,
            batch_number: provenance.batch_number.clone(),
            expiry_date: provenance.expiry_date,
            notes: provenance.notes.clone(),
            archived_at: None,
            created_at: now,
            updated_at: now,
            sale_history: Vec::new(),
        }
    }

    /// Turns one anonymous pool container into a tracked unit.
    ///
    /// The caller decrements `StockItem::full_containers` in the same
    /// transaction; `current_stock` is unchanged by the promotion.
    pub fn promote_from_pool(item: &StockItem, now: DateTime<Utc>) -> Self {
        Self::new_sealed(&item.id, item.container_capacity, &ContainerProvenance::default(), now)
    }

    #[inline]
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Quantity physically on the shelf: `max(0, remaining)`.
    #[inline]
    pub fn shelf_quantity(&self) -> i64 {
        self.remaining.max(0)
    }

    /// Consumes `quantity` for a sale.
    ///
    /// Never fails on insufficient remaining: the unit goes negative and
    /// becomes `Oversold`. Any result below zero is `Oversold`, including a
    /// sale from a unit that was already `Empty` at 0.
    ///
    /// An archived unit is out of service and fails with `ContainerNotFound`;
    /// a manual adjust above zero brings it back.
    pub fn consume(
        &mut self,
        quantity: i64,
        transaction_ref: &str,
        actor: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<SaleHistoryEntry> {
        validation::validate_quantity(quantity)?;
        if self.is_archived() {
            return Err(CoreError::ContainerNotFound(self.id.clone()));
        }

        self.remaining -= quantity;
        self.mark_opened(at);
        self.status = if self.remaining < 0 {
            ContainerStatus::Oversold
        } else {
            ContainerStatus::derive(self.remaining, self.capacity, self.opened)
        };

        Ok(self.record(transaction_ref, quantity, actor, at))
    }

    /// Sets `remaining` directly after a physical count.
    ///
    /// Re-derives the status with the normal rule, so an oversold unit
    /// corrected to a non-negative figure leaves `Oversold`. An archived unit
    /// corrected above zero is back in service.
    pub fn manual_adjust(
        &mut self,
        new_remaining: i64,
        actor: &str,
        at: DateTime<Utc>,
    ) -> SaleHistoryEntry {
        let delta = self.remaining - new_remaining;
        self.remaining = new_remaining;
        self.mark_opened(at);
        self.status = ContainerStatus::derive(self.remaining, self.capacity, self.opened);
        if self.remaining > 0 {
            self.archived_at = None;
        }

        self.record(MANUAL_ADJUSTMENT_REF, delta, actor, at)
    }

    /// Archive is two-step: the first request always soft-archives, a later
    /// request on a unit with nothing left deletes it.
    pub fn archive_disposition(&self) -> ArchiveDisposition {
        if self.is_archived() && self.remaining <= 0 {
            ArchiveDisposition::Delete
        } else {
            ArchiveDisposition::SoftArchive
        }
    }

    /// Soft-archives the unit. Returns the positive remainder written off
    /// and the history entry recording it, if any.
    pub fn soft_archive(
        &mut self,
        actor: &str,
        at: DateTime<Utc>,
    ) -> (i64, Option<SaleHistoryEntry>) {
        let discarded = self.shelf_quantity();
        let entry = if discarded > 0 {
            self.remaining = 0;
            Some(self.record(ARCHIVE_REF, discarded, actor, at))
        } else {
            self.updated_at = at;
            None
        };
        self.status = ContainerStatus::Empty;
        self.archived_at = Some(at);
        (discarded, entry)
    }

    /// Read-only projection with history sorted newest first.
    pub fn view(&self) -> ContainerView {
        let mut sale_history = self.sale_history.clone();
        sale_history.sort_by(|a, b| b.sequence.cmp(&a.sequence));

        ContainerView {
            id: self.id.clone(),
            item_id: self.item_id.clone(),
            capacity: self.capacity,
            remaining: self.remaining,
            display_remaining: self.shelf_quantity(),
            status: self.status,
            opened_at: self.opened_at,
            batch_number: self.batch_number.clone(),
            expiry_date: self.expiry_date,
            notes: self.notes.clone(),
            archived: self.is_archived(),
            sale_history,
        }
    }

    fn mark_opened(&mut self, at: DateTime<Utc>) {
        if !self.opened {
            self.opened = true;
            self.opened_at.get_or_insert(at);
        }
    }

    fn next_sequence(&self) -> i64 {
        self.sale_history.last().map(|e| e.sequence + 1).unwrap_or(1)
    }

    fn record(
        &mut self,
        transaction_ref: &str,
        quantity_sold: i64,
        actor: &str,
        at: DateTime<Utc>,
    ) -> SaleHistoryEntry {
        let entry = SaleHistoryEntry {
            sequence: self.next_sequence(),
            transaction_ref: transaction_ref.to_string(),
            quantity_sold,
            sold_at: at,
            sold_by: actor.to_string(),
        };
        self.sale_history.push(entry.clone());
        self.updated_at = at;
        entry
    }
}

// =============================================================================
// Selection Policy
// =============================================================================

/// Where a policy-driven sale should draw from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerSelection {
    Tracked(String),
    PromoteFromPool,
    /// No container at all; the sale only moves `current_stock`.
    Untracked,
}

/// Picks the container a sale consumes from.
///
/// 1. the most recently opened `Partial` unit
/// 2. a sealed tracked unit, earliest expiry first
/// 3. a unit promoted from the anonymous full pool
/// 4. the most recently opened depleted unit (the sale oversells it)
///
/// Archived units are never picked.
pub fn select_container_for_sale(units: &[ContainerUnit], full_pool: i64) -> ContainerSelection {
    let live = || units.iter().filter(|u| !u.is_archived());

    if let Some(unit) = live()
        .filter(|u| u.status == ContainerStatus::Partial)
        .max_by(|a, b| most_recently_opened(a, b))
    {
        return ContainerSelection::Tracked(unit.id.clone());
    }

    if let Some(unit) = live()
        .filter(|u| u.status == ContainerStatus::Full)
        .min_by(|a, b| earliest_expiry(a, b))
    {
        return ContainerSelection::Tracked(unit.id.clone());
    }

    if full_pool > 0 {
        return ContainerSelection::PromoteFromPool;
    }

    match live().max_by(|a, b| most_recently_opened(a, b)) {
        Some(unit) => ContainerSelection::Tracked(unit.id.clone()),
        None => ContainerSelection::Untracked,
    }
}

fn most_recently_opened(a: &ContainerUnit, b: &ContainerUnit) -> Ordering {
    a.opened_at
        .cmp(&b.opened_at)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

fn earliest_expiry(a: &ContainerUnit, b: &ContainerUnit) -> Ordering {
    match (a.expiry_date, b.expiry_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.created_at.cmp(&b.created_at))
}

// =============================================================================
// Listing
// =============================================================================

/// Read-only projection of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ContainerView {
    pub id: String,
    pub item_id: String,
    pub capacity: i64,
    /// Signed stored value.
    pub remaining: i64,
    /// `max(0, remaining)`, for display.
    pub display_remaining: i64,
    pub status: ContainerStatus,
    #[ts(as = "Option<String>")]
    pub opened_at: Option<DateTime<Utc>>,
    pub batch_number: Option<String>,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub archived: bool,
    /// Newest first (a sorted copy; storage order is untouched).
    pub sale_history: Vec<SaleHistoryEntry>,
}

/// Filter for [`list_containers`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ContainerFilter {
    pub status: Option<ContainerStatus>,
    pub include_empty: bool,
}

/// Lists units: `Partial` first, then the rest, each tier by `opened_at`
/// descending (never-opened units last).
///
/// `Empty` units are hidden unless `include_empty` is set or the status
/// filter asks for them.
pub fn list_containers(units: &[ContainerUnit], filter: ContainerFilter) -> Vec<ContainerView> {
    let mut selected: Vec<&ContainerUnit> = units
        .iter()
        .filter(|u| match filter.status {
            Some(status) => u.status == status,
            None => filter.include_empty || u.status != ContainerStatus::Empty,
        })
        .collect();

    selected.sort_by(|a, b| {
        let tier = |u: &ContainerUnit| u8::from(u.status != ContainerStatus::Partial);
        tier(a)
            .cmp(&tier(b))
            .then_with(|| b.opened_at.cmp(&a.opened_at))
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    selected.into_iter().map(ContainerUnit::view).collect()
}

// =============================================================================
// Stock Derived From Containers
// =============================================================================

/// `full * capacity + Σ max(0, remaining)` - the authoritative container
/// definition of an item's stock.
pub fn expected_current_stock(item: &StockItem, units: &[ContainerUnit]) -> i64 {
    item.full_containers * item.container_capacity
        + units.iter().map(ContainerUnit::shelf_quantity).sum::<i64>()
}

/// Container-level snapshot of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ContainerSummary {
    pub item_id: String,
    pub container_capacity: i64,
    pub full_containers: i64,
    pub tracked_containers: i64,
    pub partial_containers: i64,
    pub oversold_containers: i64,
    /// Container-derived stock.
    pub expected_stock: i64,
    pub current_stock: i64,
}

pub fn summarize(item: &StockItem, units: &[ContainerUnit]) -> ContainerSummary {
    let count = |status: ContainerStatus| units.iter().filter(|u| u.status == status).count() as i64;

    ContainerSummary {
        item_id: item.id.clone(),
        container_capacity: item.container_capacity,
        full_containers: item.full_containers,
        tracked_containers: units.len() as i64,
        partial_containers: count(ContainerStatus::Partial),
        oversold_containers: count(ContainerStatus::Oversold),
        expected_stock: expected_current_stock(item, units),
        current_stock: item.current_stock,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn unit(capacity: i64) -> ContainerUnit {
        ContainerUnit::new_sealed("item-1", capacity, &ContainerProvenance::default(), Utc::now())
    }

    fn history_invariant_holds(u: &ContainerUnit) -> bool {
        u.capacity - u.sale_history.iter().map(|e| e.quantity_sold).sum::<i64>() == u.remaining
    }

    #[test]
    fn test_consume_exact_capacity_is_empty() {
        let mut u = unit(10);
        u.consume(10, "TXN-1", "nurse", Utc::now()).unwrap();
        assert_eq!(u.remaining, 0);
        assert_eq!(u.status, ContainerStatus::Empty);
    }

    #[test]
    fn test_consume_past_zero_is_oversold_then_adjust_restores_partial() {
        let mut u = unit(10);
        u.consume(11, "TXN-1", "nurse", Utc::now()).unwrap();
        assert_eq!(u.remaining, -1);
        assert_eq!(u.status, ContainerStatus::Oversold);

        let entry = u.manual_adjust(5, "manager", Utc::now());
        assert_eq!(entry.quantity_sold, -6);
        assert_eq!(u.remaining, 5);
        assert_eq!(u.status, ContainerStatus::Partial);
        assert!(history_invariant_holds(&u));
    }

    #[test]
    fn test_oversold_unit_adjusted_to_zero_is_empty() {
        let mut u = unit(10);
        u.consume(12, "TXN-1", "nurse", Utc::now()).unwrap();
        u.manual_adjust(0, "manager", Utc::now());
        assert_eq!(u.status, ContainerStatus::Empty);
    }

    #[test]
    fn test_opened_unit_never_returns_to_full() {
        let mut u = unit(10);
        u.consume(3, "TXN-1", "nurse", Utc::now()).unwrap();
        assert_eq!(u.status, ContainerStatus::Partial);

        u.manual_adjust(10, "manager", Utc::now());
        assert_eq!(u.status, ContainerStatus::Partial);
    }

    #[test]
    fn test_consume_from_empty_unit_is_oversold() {
        let mut u = unit(10);
        u.consume(10, "TXN-1", "nurse", Utc::now()).unwrap();
        assert_eq!(u.status, ContainerStatus::Empty);

        u.consume(1, "TXN-2", "nurse", Utc::now()).unwrap();
        assert_eq!(u.remaining, -1);
        assert_eq!(u.status, ContainerStatus::Oversold);
        assert!(history_invariant_holds(&u));
    }

    #[test]
    fn test_archived_unit_cannot_be_consumed() {
        let mut u = unit(10);
        u.consume(10, "TXN-1", "nurse", Utc::now()).unwrap();
        u.soft_archive("manager", Utc::now());

        let err = u.consume(2, "TXN-2", "nurse", Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::ContainerNotFound(ref id) if *id == u.id));
        assert_eq!(u.remaining, 0);
        assert_eq!(u.status, ContainerStatus::Empty);
        assert_eq!(u.sale_history.len(), 1);
        assert!(u.is_archived());

        // Back in service after a count finds stock in it
        u.manual_adjust(3, "manager", Utc::now());
        u.consume(2, "TXN-3", "nurse", Utc::now()).unwrap();
        assert_eq!(u.remaining, 1);
        assert!(history_invariant_holds(&u));
    }

    #[test]
    fn test_consume_rejects_non_positive_quantity() {
        let mut u = unit(10);
        assert!(u.consume(0, "TXN-1", "nurse", Utc::now()).is_err());
        assert!(u.consume(-2, "TXN-1", "nurse", Utc::now()).is_err());
        assert_eq!(u.remaining, 10);
        assert!(u.sale_history.is_empty());
        assert_eq!(u.status, ContainerStatus::Full);
    }

    #[test]
    fn test_history_sequences_are_monotonic() {
        let mut u = unit(100);
        for i in 0..5 {
            u.consume(1, &format!("TXN-{i}"), "nurse", Utc::now()).unwrap();
        }
        let sequences: Vec<i64> = u.sale_history.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
        assert!(history_invariant_holds(&u));
    }

    #[test]
    fn test_archive_is_two_step() {
        let mut u = unit(10);
        u.consume(10, "TXN-1", "nurse", Utc::now()).unwrap();
        assert_eq!(u.archive_disposition(), ArchiveDisposition::SoftArchive);

        let (discarded, entry) = u.soft_archive("manager", Utc::now());
        assert_eq!(discarded, 0);
        assert!(entry.is_none());
        assert_eq!(u.status, ContainerStatus::Empty);
        assert_eq!(u.sale_history.len(), 1);

        assert_eq!(u.archive_disposition(), ArchiveDisposition::Delete);
    }

    #[test]
    fn test_soft_archive_writes_off_positive_remainder() {
        let mut u = unit(10);
        u.consume(4, "TXN-1", "nurse", Utc::now()).unwrap();
        let (discarded, entry) = u.soft_archive("manager", Utc::now());
        assert_eq!(discarded, 6);
        assert_eq!(entry.unwrap().transaction_ref, ARCHIVE_REF);
        assert_eq!(u.remaining, 0);
        assert!(history_invariant_holds(&u));
    }

    #[test]
    fn test_adjust_after_archive_returns_unit_to_service() {
        let mut u = unit(10);
        u.soft_archive("manager", Utc::now());
        u.manual_adjust(4, "manager", Utc::now());
        assert!(!u.is_archived());
        assert_eq!(u.archive_disposition(), ArchiveDisposition::SoftArchive);
    }

    #[test]
    fn test_selection_prefers_most_recent_partial() {
        let now = Utc::now();
        let mut older = unit(10);
        older.consume(1, "A", "n", now - Duration::hours(2)).unwrap();
        let mut newer = unit(10);
        newer.consume(1, "B", "n", now - Duration::hours(1)).unwrap();
        let sealed = unit(10);

        let units = vec![older, newer.clone(), sealed];
        assert_eq!(
            select_container_for_sale(&units, 3),
            ContainerSelection::Tracked(newer.id)
        );
    }

    #[test]
    fn test_selection_uses_tracked_sealed_before_pool() {
        let now = Utc::now();
        let late = ContainerUnit::new_sealed(
            "item-1",
            10,
            &ContainerProvenance {
                expiry_date: NaiveDate::from_ymd_opt(2027, 6, 1),
                ..Default::default()
            },
            now,
        );
        let soon = ContainerUnit::new_sealed(
            "item-1",
            10,
            &ContainerProvenance {
                expiry_date: NaiveDate::from_ymd_opt(2027, 1, 1),
                ..Default::default()
            },
            now,
        );
        let units = vec![late, soon.clone()];
        assert_eq!(
            select_container_for_sale(&units, 5),
            ContainerSelection::Tracked(soon.id)
        );
    }

    #[test]
    fn test_selection_falls_back_to_pool_then_depleted_then_untracked() {
        assert_eq!(select_container_for_sale(&[], 2), ContainerSelection::PromoteFromPool);
        assert_eq!(select_container_for_sale(&[], 0), ContainerSelection::Untracked);

        let mut empty = unit(10);
        empty.consume(10, "A", "n", Utc::now()).unwrap();
        let units = vec![empty.clone()];
        assert_eq!(select_container_for_sale(&units, 1), ContainerSelection::PromoteFromPool);
        assert_eq!(
            select_container_for_sale(&units, 0),
            ContainerSelection::Tracked(empty.id)
        );
    }

    #[test]
    fn test_selection_skips_archived_units() {
        let mut archived = unit(10);
        archived.consume(2, "A", "n", Utc::now()).unwrap();
        archived.soft_archive("m", Utc::now());
        assert_eq!(
            select_container_for_sale(&[archived], 0),
            ContainerSelection::Untracked
        );
    }

    #[test]
    fn test_list_order_and_empty_filter() {
        let now = Utc::now();
        let mut partial_old = unit(10);
        partial_old.consume(1, "A", "n", now - Duration::hours(3)).unwrap();
        let mut partial_new = unit(10);
        partial_new.consume(1, "B", "n", now - Duration::hours(1)).unwrap();
        let mut oversold = unit(10);
        oversold.consume(12, "C", "n", now).unwrap();
        let mut empty = unit(10);
        empty.consume(10, "D", "n", now).unwrap();
        let sealed = unit(10);

        let units = vec![
            sealed.clone(),
            oversold.clone(),
            partial_old.clone(),
            empty.clone(),
            partial_new.clone(),
        ];

        let ids: Vec<String> = list_containers(&units, ContainerFilter::default())
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, vec![partial_new.id, partial_old.id, oversold.id, sealed.id]);

        let with_empty = list_containers(
            &units,
            ContainerFilter {
                status: None,
                include_empty: true,
            },
        );
        assert_eq!(with_empty.len(), 5);

        let only_empty = list_containers(
            &units,
            ContainerFilter {
                status: Some(ContainerStatus::Empty),
                include_empty: false,
            },
        );
        assert_eq!(only_empty.len(), 1);
        assert_eq!(only_empty[0].id, empty.id);
    }

    #[test]
    fn test_list_is_idempotent_and_clamps_display() {
        let mut oversold = unit(10);
        oversold.consume(13, "A", "n", Utc::now()).unwrap();
        let units = vec![oversold];

        let first = list_containers(&units, ContainerFilter::default());
        let second = list_containers(&units, ContainerFilter::default());
        assert_eq!(first, second);
        assert_eq!(first[0].remaining, -3);
        assert_eq!(first[0].display_remaining, 0);
    }

    #[test]
    fn test_view_sorts_copy_of_history() {
        let mut u = unit(10);
        u.consume(1, "A", "n", Utc::now()).unwrap();
        u.consume(2, "B", "n", Utc::now()).unwrap();
        let view = u.view();
        assert_eq!(view.sale_history[0].transaction_ref, "B");
        assert_eq!(u.sale_history[0].transaction_ref, "A");
    }

    #[test]
    fn test_expected_current_stock() {
        let mut item = StockItem::new("SAL-500", "Saline", 10);
        item.full_containers = 3;
        let mut a = unit(10);
        a.consume(4, "A", "n", Utc::now()).unwrap();
        let mut b = unit(10);
        b.consume(15, "B", "n", Utc::now()).unwrap();
        assert_eq!(expected_current_stock(&item, &[a.clone(), b.clone()]), 36);

        let summary = summarize(&item, &[a, b]);
        assert_eq!(summary.tracked_containers, 2);
        assert_eq!(summary.oversold_containers, 1);
        assert_eq!(summary.partial_containers, 1);
    }
}
