//! # Inventory Service
//!
//! Request-scoped stock operations: consumption, restock, container
//! corrections and archival, plus the reads shown to collaborators.
//!
//! ## Anatomy of a Mutation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate input (no lock, no I/O)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tokio::time::timeout(operation_timeout) ─────────────────────────┐    │
//! │  │ ItemLocks::acquire(item_id)                                     │    │
//! │  │      │                                                          │    │
//! │  │      ▼                                                          │    │
//! │  │ ┌── attempt ─────────────────────────────────────────────────┐ │    │
//! │  │ │ BEGIN IMMEDIATE (write lock up front)                      │ │    │
//! │  │ │   read item + containers                                   │ │    │
//! │  │ │   apply vessel-core transition                             │ │    │
//! │  │ │   write containers, history, ledger entry                  │ │    │
//! │  │ │   UPDATE stock_items ... WHERE version = ?   (CAS)         │ │    │
//! │  │ │ COMMIT                                                     │ │    │
//! │  │ └──── ConcurrencyConflict? back off, retry ≤ max_retries ────┘ │    │
//! │  └── deadline hit? transaction dropped = rolled back ─────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Insufficient stock never fails an operation. A sale that takes more than
//! is on the shelf drives the container and the item negative and is
//! reported as `oversold` in the result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::future::Future;
use tracing::{debug, info, warn};

use crate::config::ConcurrencySettings;
use crate::error::{DbError, DbResult};
use crate::locks::ItemLocks;
use crate::repository::{container as containers, item as items, ledger};
use vessel_core::container::{
    self, ArchiveDisposition, ContainerFilter, ContainerProvenance, ContainerSelection,
    ContainerStatus, ContainerSummary, ContainerUnit, ContainerView,
};
use vessel_core::stock::{self, RestockCandidate};
use vessel_core::validation;
use vessel_core::{
    AdjustmentResult, ArchiveOutcome, ConsumptionResult, CoreError, MovementEntry, MovementType,
    Money, RestockResult, StockItem, ValidationError,
};

// =============================================================================
// Requests
// =============================================================================

/// Input of [`InventoryService::create_item`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStockItem {
    pub sku: String,
    pub name: String,
    /// 0 for items sold by the unit.
    pub container_capacity: i64,
    pub reorder_point: i64,
    pub auto_reorder_enabled: bool,
    pub restock_frequency_days: i64,
}

/// Restock-policy fields editable outside of a restock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockPolicy {
    pub reorder_point: i64,
    pub auto_reorder_enabled: bool,
    pub restock_frequency_days: i64,
}

/// Input of [`InventoryService::restock`].
///
/// `quantity` counts containers for container-tracked items and units
/// otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestockRequest {
    pub quantity: i64,
    #[serde(default)]
    pub provenance: ContainerProvenance,
    /// Cost per stock unit, recorded on the purchase entry.
    pub unit_cost: Option<Money>,
    pub reference: String,
    pub actor: String,
}

/// Input of [`InventoryService::create_containers`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateContainers {
    pub count: i64,
    /// Capacity of the new units when it differs from the item's.
    pub capacity_override: Option<i64>,
    #[serde(default)]
    pub provenance: ContainerProvenance,
    pub unit_cost: Option<Money>,
    pub reference: String,
    pub actor: String,
}

// =============================================================================
// Service
// =============================================================================

/// Movements with an operation of their own.
const DEDICATED_MOVEMENTS: [MovementType; 2] = [MovementType::Sale, MovementType::Purchase];

/// Stock operations over one database.
///
/// Clones share the pool and the per-item locks.
#[derive(Debug, Clone)]
pub struct InventoryService {
    pool: SqlitePool,
    locks: ItemLocks,
    settings: ConcurrencySettings,
}

impl InventoryService {
    pub fn new(pool: SqlitePool, locks: ItemLocks, settings: ConcurrencySettings) -> Self {
        InventoryService {
            pool,
            locks,
            settings,
        }
    }

    pub fn settings(&self) -> &ConcurrencySettings {
        &self.settings
    }

    // -------------------------------------------------------------------------
    // Items
    // -------------------------------------------------------------------------

    /// Creates an item with zero stock.
    pub async fn create_item(&self, new_item: NewStockItem) -> DbResult<StockItem> {
        validation::validate_sku(&new_item.sku).map_err(CoreError::from)?;
        if new_item.name.trim().is_empty() {
            return Err(CoreError::from(ValidationError::Required {
                field: "name".to_string(),
            })
            .into());
        }
        if new_item.container_capacity != 0 {
            validation::validate_capacity(new_item.container_capacity).map_err(CoreError::from)?;
        }

        let mut item = StockItem::new(
            new_item.sku.trim(),
            new_item.name.trim(),
            new_item.container_capacity,
        );
        item.reorder_point = new_item.reorder_point;
        item.auto_reorder_enabled = new_item.auto_reorder_enabled;
        item.restock_frequency_days = new_item.restock_frequency_days;

        items::insert_item(&self.pool, &item).await?;
        info!(item_id = %item.id, sku = %item.sku, "Stock item created");
        Ok(item)
    }

    pub async fn get_item(&self, item_id: &str) -> DbResult<StockItem> {
        items::require_item(&self.pool, item_id).await
    }

    /// The only stock figure for customer-facing availability. Never negative.
    pub async fn get_available_stock(&self, item_id: &str) -> DbResult<i64> {
        let item = items::require_item(&self.pool, item_id).await?;
        Ok(stock::get_available_stock(&item))
    }

    pub async fn update_restock_policy(
        &self,
        item_id: &str,
        policy: RestockPolicy,
    ) -> DbResult<StockItem> {
        self.run_locked(item_id, "update_restock_policy", move || async move {
            let mut tx = self.begin_write().await?;
            let mut item = items::require_item(&mut *tx, item_id).await?;
            item.reorder_point = policy.reorder_point;
            item.auto_reorder_enabled = policy.auto_reorder_enabled;
            item.restock_frequency_days = policy.restock_frequency_days;
            item.updated_at = Utc::now();
            items::compare_and_swap(&mut *tx, &mut item).await?;
            tx.commit().await?;
            Ok(item)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Consumption
    // -------------------------------------------------------------------------

    /// Consumes stock for a sale, picking the container by policy.
    ///
    /// Items without container capacity just lose `quantity` units.
    pub async fn consume_stock(
        &self,
        item_id: &str,
        quantity: i64,
        reference: &str,
        actor: &str,
    ) -> DbResult<ConsumptionResult> {
        validate_sale(quantity, reference, actor)?;

        let result = self
            .run_locked(item_id, "consume_stock", move || {
                self.consume_stock_once(item_id, quantity, reference, actor)
            })
            .await?;

        log_consumption(&result, reference);
        Ok(result)
    }

    async fn consume_stock_once(
        &self,
        item_id: &str,
        quantity: i64,
        reference: &str,
        actor: &str,
    ) -> DbResult<ConsumptionResult> {
        let now = Utc::now();
        let mut tx = self.begin_write().await?;
        let mut item = items::require_item(&mut *tx, item_id).await?;

        let consumed = if item.is_container_tracked() {
            let mut units = containers::fetch_containers(&mut tx, item_id).await?;
            let target = match container::select_container_for_sale(&units, item.full_containers) {
                ContainerSelection::Tracked(id) => units.iter().position(|u| u.id == id),
                ContainerSelection::PromoteFromPool => {
                    let unit = ContainerUnit::promote_from_pool(&item, now);
                    item.full_containers -= 1;
                    containers::insert_container(&mut *tx, &unit).await?;
                    debug!(item_id = %item.id, container_id = %unit.id, "Promoted pool container");
                    units.push(unit);
                    Some(units.len() - 1)
                }
                ContainerSelection::Untracked => None,
            };

            match target {
                Some(index) => {
                    let unit = &mut units[index];
                    consume_unit(&mut tx, unit, quantity, reference, actor, now).await?;
                    Some((unit.id.clone(), unit.remaining, unit.status))
                }
                None => None,
            }
        } else {
            None
        };

        item.current_stock -= quantity;
        item.updated_at = now;
        ledger::append(&mut *tx, &sale_entry(&item.id, quantity, reference, actor, now)).await?;
        items::compare_and_swap(&mut *tx, &mut item).await?;
        tx.commit().await?;

        Ok(consumption_result(&item, quantity, consumed))
    }

    /// Consumes from a specific container chosen by the caller.
    pub async fn consume_from_container(
        &self,
        container_id: &str,
        quantity: i64,
        reference: &str,
        actor: &str,
    ) -> DbResult<ConsumptionResult> {
        validate_sale(quantity, reference, actor)?;
        let item_id = self.container_owner(container_id).await?;
        let item_id = item_id.as_str();

        let result = self
            .run_locked(item_id, "consume_from_container", move || async move {
                let now = Utc::now();
                let mut tx = self.begin_write().await?;
                let mut item = items::require_item(&mut *tx, item_id).await?;
                let mut unit = require_container(&mut tx, item_id, container_id).await?;

                consume_unit(&mut tx, &mut unit, quantity, reference, actor, now).await?;

                item.current_stock -= quantity;
                item.updated_at = now;
                ledger::append(&mut *tx, &sale_entry(item_id, quantity, reference, actor, now))
                    .await?;
                items::compare_and_swap(&mut *tx, &mut item).await?;
                tx.commit().await?;

                Ok(consumption_result(
                    &item,
                    quantity,
                    Some((unit.id.clone(), unit.remaining, unit.status)),
                ))
            })
            .await?;

        log_consumption(&result, reference);
        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Restock
    // -------------------------------------------------------------------------

    /// Restocks an item.
    ///
    /// Container-tracked items receive `quantity` containers of the item's
    /// capacity; other items receive `quantity` units.
    pub async fn restock(&self, item_id: &str, request: &RestockRequest) -> DbResult<RestockResult> {
        validation::validate_reference(&request.reference).map_err(CoreError::from)?;
        validation::validate_actor(&request.actor).map_err(CoreError::from)?;
        validate_cost(request.unit_cost)?;

        self.run_locked(item_id, "restock", move || async move {
            let now = Utc::now();
            let mut tx = self.begin_write().await?;
            let mut item = items::require_item(&mut *tx, item_id).await?;

            let result = if item.is_container_tracked() {
                validation::validate_container_count(request.quantity).map_err(CoreError::from)?;
                let capacity = item.container_capacity;
                add_containers(
                    &mut tx,
                    &mut item,
                    ContainerBatch {
                        count: request.quantity,
                        capacity,
                        provenance: &request.provenance,
                        unit_cost: request.unit_cost,
                        reference: &request.reference,
                        actor: &request.actor,
                    },
                    now,
                )
                .await?
            } else {
                validation::validate_quantity(request.quantity).map_err(CoreError::from)?;
                add_units(&mut tx, &mut item, request, now).await?
            };

            items::compare_and_swap(&mut *tx, &mut item).await?;
            tx.commit().await?;

            info!(
                item_id = %item.id,
                quantity_added = result.quantity_added,
                containers_added = result.containers_added,
                current_stock = item.current_stock,
                "Restocked"
            );
            Ok(result)
        })
        .await
    }

    /// Adds `count` containers, optionally with a capacity other than the
    /// item's.
    ///
    /// A non-positive override is a validation error. Fails with
    /// `InvalidConfiguration` when there is no override and the item has no
    /// capacity.
    pub async fn create_containers(
        &self,
        item_id: &str,
        request: &CreateContainers,
    ) -> DbResult<RestockResult> {
        validation::validate_container_count(request.count).map_err(CoreError::from)?;
        if let Some(capacity) = request.capacity_override {
            validation::validate_capacity(capacity).map_err(CoreError::from)?;
        }
        validation::validate_reference(&request.reference).map_err(CoreError::from)?;
        validation::validate_actor(&request.actor).map_err(CoreError::from)?;
        validate_cost(request.unit_cost)?;

        self.run_locked(item_id, "create_containers", move || async move {
            let now = Utc::now();
            let mut tx = self.begin_write().await?;
            let mut item = items::require_item(&mut *tx, item_id).await?;

            let capacity = match request.capacity_override {
                Some(capacity) => capacity,
                None if item.is_container_tracked() => item.container_capacity,
                None => {
                    return Err(CoreError::invalid_configuration(
                        item_id,
                        "item has no container capacity and no override was given",
                    )
                    .into())
                }
            };

            if !item.is_container_tracked() {
                item.container_capacity = capacity;
            }

            let result = add_containers(
                &mut tx,
                &mut item,
                ContainerBatch {
                    count: request.count,
                    capacity,
                    provenance: &request.provenance,
                    unit_cost: request.unit_cost,
                    reference: &request.reference,
                    actor: &request.actor,
                },
                now,
            )
            .await?;

            items::compare_and_swap(&mut *tx, &mut item).await?;
            tx.commit().await?;

            info!(
                item_id = %item.id,
                containers_added = result.containers_added,
                tracked = result.tracked_container_ids.len(),
                current_stock = item.current_stock,
                "Containers created"
            );
            Ok(result)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Corrections
    // -------------------------------------------------------------------------

    /// Sets a container's remaining quantity after a physical count and
    /// rebuilds the item's stock from container state.
    ///
    /// The stock change is written to the ledger as `adjustment_in` /
    /// `adjustment_out` so the ledger keeps reconciling.
    pub async fn adjust_container(
        &self,
        item_id: &str,
        container_id: &str,
        new_remaining: i64,
        actor: &str,
    ) -> DbResult<AdjustmentResult> {
        validation::validate_actor(actor).map_err(CoreError::from)?;

        let result = self
            .run_locked(item_id, "adjust_container", move || async move {
                let now = Utc::now();
                let mut tx = self.begin_write().await?;
                let mut item = items::require_item(&mut *tx, item_id).await?;
                let mut units = containers::fetch_containers(&mut tx, item_id).await?;
                let index = units
                    .iter()
                    .position(|u| u.id == container_id)
                    .ok_or_else(|| CoreError::ContainerNotFound(container_id.to_string()))?;

                let unit = &mut units[index];
                let previous_remaining = unit.remaining;
                let entry = unit.manual_adjust(new_remaining, actor, now);
                containers::update_container_state(&mut *tx, unit).await?;
                containers::insert_history(&mut *tx, &unit.id, &entry).await?;
                let (status, remaining) = (unit.status, unit.remaining);

                let previous_current_stock = item.current_stock;
                item.current_stock = container::expected_current_stock(&item, &units);
                item.updated_at = now;

                let delta = item.current_stock - previous_current_stock;
                if delta != 0 {
                    let movement_type = if delta > 0 {
                        MovementType::AdjustmentIn
                    } else {
                        MovementType::AdjustmentOut
                    };
                    let entry = MovementEntry::new(
                        item_id,
                        movement_type,
                        delta,
                        format!("adjust:{container_id}"),
                    )
                    .with_actor(actor);
                    ledger::append(&mut *tx, &stamped(entry, now)).await?;
                }

                items::compare_and_swap(&mut *tx, &mut item).await?;
                tx.commit().await?;

                Ok(AdjustmentResult {
                    item_id: item.id.clone(),
                    container_id: container_id.to_string(),
                    previous_remaining,
                    new_remaining: remaining,
                    status,
                    previous_current_stock,
                    current_stock: item.current_stock,
                })
            })
            .await?;

        info!(
            item_id = %result.item_id,
            container_id = %result.container_id,
            previous_remaining = result.previous_remaining,
            new_remaining = result.new_remaining,
            current_stock = result.current_stock,
            "Container adjusted"
        );
        Ok(result)
    }

    /// Archives a container.
    ///
    /// The first request soft-archives: the unit is kept as `empty` with its
    /// history, and any positive remainder is written off. A request on an
    /// already archived unit with nothing left deletes it.
    pub async fn archive_container(
        &self,
        container_id: &str,
        actor: &str,
    ) -> DbResult<ArchiveOutcome> {
        validation::validate_actor(actor).map_err(CoreError::from)?;
        let item_id = self.container_owner(container_id).await?;
        let item_id = item_id.as_str();

        let outcome = self
            .run_locked(item_id, "archive_container", move || async move {
                let now = Utc::now();
                let mut tx = self.begin_write().await?;
                let mut item = items::require_item(&mut *tx, item_id).await?;
                let mut unit = require_container(&mut tx, item_id, container_id).await?;

                let outcome = match unit.archive_disposition() {
                    ArchiveDisposition::Delete => {
                        containers::delete_container(&mut *tx, container_id).await?;
                        ArchiveOutcome::Deleted {
                            container_id: container_id.to_string(),
                        }
                    }
                    ArchiveDisposition::SoftArchive => {
                        let (discarded, entry) = unit.soft_archive(actor, now);
                        containers::update_container_state(&mut *tx, &unit).await?;
                        if let Some(entry) = entry {
                            containers::insert_history(&mut *tx, container_id, &entry).await?;
                            item.current_stock -= discarded;
                            let movement = MovementEntry::new(
                                item_id,
                                MovementType::AdjustmentOut,
                                discarded,
                                format!("archive:{container_id}"),
                            )
                            .with_actor(actor);
                            ledger::append(&mut *tx, &stamped(movement, now)).await?;
                        }
                        ArchiveOutcome::SoftArchived {
                            container_id: container_id.to_string(),
                            discarded,
                        }
                    }
                };

                item.updated_at = now;
                items::compare_and_swap(&mut *tx, &mut item).await?;
                tx.commit().await?;
                Ok(outcome)
            })
            .await?;

        match &outcome {
            ArchiveOutcome::SoftArchived { discarded, .. } if *discarded > 0 => warn!(
                item_id = %item_id,
                container_id = %container_id,
                discarded,
                "Archived container still held stock, remainder written off"
            ),
            ArchiveOutcome::SoftArchived { .. } => {
                info!(item_id = %item_id, container_id = %container_id, "Container archived")
            }
            ArchiveOutcome::Deleted { .. } => {
                info!(item_id = %item_id, container_id = %container_id, "Container deleted")
            }
        }
        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // Reservations and item-level movements
    // -------------------------------------------------------------------------

    /// Earmarks stock. Reserving more than is on hand is allowed; available
    /// stock simply reads 0.
    pub async fn reserve_stock(&self, item_id: &str, quantity: i64) -> DbResult<StockItem> {
        validation::validate_quantity(quantity).map_err(CoreError::from)?;
        self.update_reservation(item_id, "reserve_stock", quantity).await
    }

    /// Releases a reservation. Never drops `reserved_stock` below zero.
    pub async fn release_reservation(&self, item_id: &str, quantity: i64) -> DbResult<StockItem> {
        validation::validate_quantity(quantity).map_err(CoreError::from)?;
        self.update_reservation(item_id, "release_reservation", -quantity)
            .await
    }

    async fn update_reservation(
        &self,
        item_id: &str,
        operation: &'static str,
        delta: i64,
    ) -> DbResult<StockItem> {
        self.run_locked(item_id, operation, move || async move {
            let mut tx = self.begin_write().await?;
            let mut item = items::require_item(&mut *tx, item_id).await?;
            item.reserved_stock = (item.reserved_stock + delta).max(0);
            item.updated_at = Utc::now();
            items::compare_and_swap(&mut *tx, &mut item).await?;
            tx.commit().await?;
            debug!(item_id = %item_id, reserved_stock = item.reserved_stock, "Reservation updated");
            Ok(item)
        })
        .await
    }

    /// Records an item-level movement (return, damage, expiry, ...) on an item
    /// that is not container-tracked.
    ///
    /// `sale` and `purchase` go through [`consume_stock`](Self::consume_stock)
    /// and [`restock`](Self::restock). `transfer` and `bundle_sale` need a
    /// paired entry the auditor can count and are rejected.
    pub async fn record_movement(
        &self,
        item_id: &str,
        movement_type: MovementType,
        quantity: i64,
        reference: &str,
        actor: &str,
    ) -> DbResult<StockItem> {
        validate_sale(quantity, reference, actor)?;
        let sign = if DEDICATED_MOVEMENTS.contains(&movement_type) {
            None
        } else {
            movement_type.stock_sign()
        }
        .ok_or_else(|| {
            CoreError::from(ValidationError::NotAllowed {
                field: "movement_type".to_string(),
                allowed: MovementType::ALL
                    .iter()
                    .filter(|t| !DEDICATED_MOVEMENTS.contains(*t) && t.stock_sign().is_some())
                    .map(|t| t.as_str().to_string())
                    .collect(),
            })
        })?;

        let item = self
            .run_locked(item_id, "record_movement", move || async move {
                let now = Utc::now();
                let mut tx = self.begin_write().await?;
                let mut item = items::require_item(&mut *tx, item_id).await?;
                if item.is_container_tracked() {
                    return Err(CoreError::invalid_configuration(
                        item_id,
                        "container-tracked stock changes through container operations",
                    )
                    .into());
                }

                item.current_stock += sign * quantity;
                item.updated_at = now;
                let entry =
                    MovementEntry::new(item_id, movement_type, quantity, reference).with_actor(actor);
                ledger::append(&mut *tx, &stamped(entry, now)).await?;
                items::compare_and_swap(&mut *tx, &mut item).await?;
                tx.commit().await?;
                Ok(item)
            })
            .await?;

        info!(
            item_id = %item.id,
            movement_type = %movement_type,
            quantity,
            current_stock = item.current_stock,
            "Movement recorded"
        );
        Ok(item)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Lists an item's containers, `partial` first, most recently opened first.
    pub async fn list_containers(
        &self,
        item_id: &str,
        filter: ContainerFilter,
    ) -> DbResult<Vec<ContainerView>> {
        let mut tx = self.pool.begin().await?;
        items::require_item(&mut *tx, item_id).await?;
        let units = containers::fetch_containers(&mut tx, item_id).await?;
        tx.commit().await?;

        Ok(container::list_containers(&units, filter))
    }

    pub async fn container_summary(&self, item_id: &str) -> DbResult<ContainerSummary> {
        let mut tx = self.pool.begin().await?;
        let item = items::require_item(&mut *tx, item_id).await?;
        let units = containers::fetch_containers(&mut tx, item_id).await?;
        tx.commit().await?;

        Ok(container::summarize(&item, &units))
    }

    /// Items that need restocking at `threshold` or are due for auto-reorder,
    /// urgent ones first.
    pub async fn restock_candidates(&self, threshold: f64) -> DbResult<Vec<RestockCandidate>> {
        let now = Utc::now();
        let mut candidates: Vec<RestockCandidate> = items::fetch_all_items(&self.pool)
            .await?
            .iter()
            .filter_map(|item| stock::restock_candidate(item, threshold, now))
            .collect();
        candidates.sort_by(|a, b| {
            b.urgent
                .cmp(&a.urgent)
                .then_with(|| a.current_stock.cmp(&b.current_stock))
                .then_with(|| a.sku.cmp(&b.sku))
        });
        Ok(candidates)
    }

    /// An item's ledger, oldest first.
    pub async fn ledger_for_item(&self, item_id: &str) -> DbResult<Vec<MovementEntry>> {
        ledger::LedgerRepository::new(self.pool.clone())
            .entries_for_item(item_id)
            .await
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    /// Resolves the item a container belongs to.
    async fn container_owner(&self, container_id: &str) -> DbResult<String> {
        sqlx::query_scalar::<_, String>("SELECT item_id FROM container_units WHERE id = ?1")
            .bind(container_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::ContainerNotFound(container_id.to_string()).into())
    }

    /// Opens a transaction that takes SQLite's write lock immediately.
    ///
    /// A deferred transaction that reads first and writes later cannot wait
    /// for the lock when another connection got there in between; SQLite
    /// fails it with `SQLITE_BUSY` at once. `BEGIN IMMEDIATE` waits on the
    /// connection's busy timeout instead.
    async fn begin_write(&self) -> DbResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Runs `attempt` under the item lock, retrying lost version checks with
    /// a growing pause and bounding the whole thing by the operation deadline.
    async fn run_locked<T, F, Fut>(
        &self,
        item_id: &str,
        operation: &'static str,
        mut attempt: F,
    ) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let timeout = self.settings.operation_timeout();
        let max_retries = self.settings.max_retries;

        let work = async {
            let _guard = self.locks.acquire(item_id).await;
            let mut retries = 0;
            loop {
                match attempt().await {
                    Err(e) if e.is_retryable() && retries < max_retries => {
                        retries += 1;
                        let backoff = self.settings.retry_backoff(retries);
                        warn!(
                            item_id = %item_id,
                            operation,
                            retries,
                            backoff_ms = backoff.as_millis() as u64,
                            "Concurrent update, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    Err(e) if e.is_retryable() => {
                        return Err(DbError::RetriesExhausted {
                            item_id: item_id.to_string(),
                            attempts: retries + 1,
                        })
                    }
                    other => return other,
                }
            }
        };

        let result = match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(DbError::DeadlineExceeded {
                item_id: item_id.to_string(),
                timeout_ms: self.settings.operation_timeout_ms,
            }),
        };

        if let Err(e) = &result {
            warn!(item_id = %item_id, operation, error = %e, "Stock operation failed");
        }
        result
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Arguments of one container restock.
struct ContainerBatch<'a> {
    count: i64,
    capacity: i64,
    provenance: &'a ContainerProvenance,
    unit_cost: Option<Money>,
    reference: &'a str,
    actor: &'a str,
}

/// Adds containers to the anonymous pool, or as tracked units when
/// provenance is given or the capacity differs from the item's.
async fn add_containers(
    tx: &mut Transaction<'_, Sqlite>,
    item: &mut StockItem,
    batch: ContainerBatch<'_>,
    now: DateTime<Utc>,
) -> DbResult<RestockResult> {
    let tracked =
        batch.provenance.requires_tracking() || batch.capacity != item.container_capacity;

    let mut tracked_container_ids = Vec::new();
    if tracked {
        for _ in 0..batch.count {
            let unit = ContainerUnit::new_sealed(&item.id, batch.capacity, batch.provenance, now);
            containers::insert_container(&mut **tx, &unit).await?;
            tracked_container_ids.push(unit.id);
        }
    } else {
        item.full_containers += batch.count;
    }

    let quantity_added = batch.count * batch.capacity;
    item.current_stock += quantity_added;
    item.apply_restock_analytics(&stock::calculate_restock_analytics(item, quantity_added, now));
    item.updated_at = now;

    let entry = MovementEntry::new(&item.id, MovementType::Purchase, quantity_added, batch.reference)
        .with_actor(batch.actor)
        .with_unit_cost(batch.unit_cost);
    ledger::append(&mut **tx, &stamped(entry, now)).await?;

    Ok(RestockResult {
        item_id: item.id.clone(),
        new_current_stock: item.current_stock,
        containers_added: batch.count,
        tracked_container_ids,
        quantity_added,
    })
}

async fn add_units(
    tx: &mut Transaction<'_, Sqlite>,
    item: &mut StockItem,
    request: &RestockRequest,
    now: DateTime<Utc>,
) -> DbResult<RestockResult> {
    if request.provenance.requires_tracking() {
        debug!(item_id = %item.id, "Provenance ignored for an item without containers");
    }

    item.current_stock += request.quantity;
    item.apply_restock_analytics(&stock::calculate_restock_analytics(item, request.quantity, now));
    item.updated_at = now;

    let entry = MovementEntry::new(&item.id, MovementType::Purchase, request.quantity, &request.reference)
        .with_actor(&request.actor)
        .with_unit_cost(request.unit_cost);
    ledger::append(&mut **tx, &stamped(entry, now)).await?;

    Ok(RestockResult {
        item_id: item.id.clone(),
        new_current_stock: item.current_stock,
        containers_added: 0,
        tracked_container_ids: Vec::new(),
        quantity_added: request.quantity,
    })
}

/// Applies a sale to one unit and persists state plus the history entry.
async fn consume_unit(
    tx: &mut Transaction<'_, Sqlite>,
    unit: &mut ContainerUnit,
    quantity: i64,
    reference: &str,
    actor: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let entry = unit.consume(quantity, reference, actor, now)?;
    containers::update_container_state(&mut **tx, unit).await?;
    containers::insert_history(&mut **tx, &unit.id, &entry).await?;
    Ok(())
}

/// Loads a container and checks it belongs to `item_id`.
async fn require_container(
    tx: &mut Transaction<'_, Sqlite>,
    item_id: &str,
    container_id: &str,
) -> DbResult<ContainerUnit> {
    match containers::fetch_container(tx, container_id).await? {
        Some(unit) if unit.item_id == item_id => Ok(unit),
        _ => Err(CoreError::ContainerNotFound(container_id.to_string()).into()),
    }
}

fn validate_sale(quantity: i64, reference: &str, actor: &str) -> DbResult<()> {
    validation::validate_quantity(quantity).map_err(CoreError::from)?;
    validation::validate_reference(reference).map_err(CoreError::from)?;
    validation::validate_actor(actor).map_err(CoreError::from)?;
    Ok(())
}

fn validate_cost(cost: Option<Money>) -> DbResult<()> {
    if let Some(cost) = cost {
        validation::validate_cost_cents(cost.cents()).map_err(CoreError::from)?;
    }
    Ok(())
}

fn stamped(mut entry: MovementEntry, at: DateTime<Utc>) -> MovementEntry {
    entry.created_at = at;
    entry
}

fn sale_entry(
    item_id: &str,
    quantity: i64,
    reference: &str,
    actor: &str,
    at: DateTime<Utc>,
) -> MovementEntry {
    stamped(
        MovementEntry::new(item_id, MovementType::Sale, quantity, reference).with_actor(actor),
        at,
    )
}

fn consumption_result(
    item: &StockItem,
    quantity: i64,
    consumed: Option<(String, i64, ContainerStatus)>,
) -> ConsumptionResult {
    let (container_id, remaining_after, status) = match consumed {
        Some((id, remaining, status)) => (Some(id), remaining, Some(status)),
        None => (None, item.current_stock, None),
    };

    ConsumptionResult {
        item_id: item.id.clone(),
        container_id,
        quantity,
        remaining_after,
        status,
        oversold: status == Some(ContainerStatus::Oversold) || stock::is_oversold(item),
        current_stock: item.current_stock,
        available_stock: stock::get_available_stock(item),
    }
}

fn log_consumption(result: &ConsumptionResult, reference: &str) {
    if result.oversold {
        warn!(
            item_id = %result.item_id,
            container_id = ?result.container_id,
            reference = %reference,
            remaining_after = result.remaining_after,
            current_stock = result.current_stock,
            "Sale oversold stock"
        );
    } else {
        info!(
            item_id = %result.item_id,
            container_id = ?result.container_id,
            reference = %reference,
            quantity = result.quantity,
            current_stock = result.current_stock,
            "Stock consumed"
        );
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    async fn setup() -> (Database, InventoryService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = db.inventory();
        (db, service)
    }

    async fn item(service: &InventoryService, sku: &str, capacity: i64) -> StockItem {
        service
            .create_item(NewStockItem {
                sku: sku.to_string(),
                name: format!("Item {sku}"),
                container_capacity: capacity,
                reorder_point: 5,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    fn restock_of(quantity: i64) -> RestockRequest {
        RestockRequest {
            quantity,
            reference: "PO-1".to_string(),
            actor: "clerk".to_string(),
            ..Default::default()
        }
    }

    async fn ledger_stock(db: &Database, item_id: &str) -> i64 {
        db.ledger()
            .totals_by_type(item_id)
            .await
            .unwrap()
            .calculated_stock()
    }

    #[tokio::test]
    async fn test_container_lifecycle_through_sales() {
        let (db, service) = setup().await;
        let bottle = item(&service, "WINE-750", 10).await;

        let restocked = service.restock(&bottle.id, &restock_of(2)).await.unwrap();
        assert_eq!(restocked.quantity_added, 20);
        assert_eq!(restocked.new_current_stock, 20);
        assert!(restocked.tracked_container_ids.is_empty());

        // First sale opens a container from the pool
        let first = service.consume_stock(&bottle.id, 3, "TXN-1", "till").await.unwrap();
        assert_eq!(first.remaining_after, 7);
        assert_eq!(first.status, Some(ContainerStatus::Partial));
        assert_eq!(first.current_stock, 17);
        assert!(!first.oversold);
        let opened = first.container_id.clone().unwrap();

        // The open container is drained before another is touched
        let second = service.consume_stock(&bottle.id, 7, "TXN-2", "till").await.unwrap();
        assert_eq!(second.container_id.as_deref(), Some(opened.as_str()));
        assert_eq!(second.status, Some(ContainerStatus::Empty));

        let third = service.consume_stock(&bottle.id, 4, "TXN-3", "till").await.unwrap();
        assert_ne!(third.container_id.as_deref(), Some(opened.as_str()));
        assert_eq!(third.remaining_after, 6);
        assert_eq!(service.get_item(&bottle.id).await.unwrap().full_containers, 0);

        // Selling past the shelf oversells without failing
        let fourth = service.consume_stock(&bottle.id, 10, "TXN-4", "till").await.unwrap();
        assert!(fourth.oversold);
        assert_eq!(fourth.status, Some(ContainerStatus::Oversold));
        assert_eq!(fourth.remaining_after, -4);
        assert_eq!(fourth.current_stock, -4);
        assert_eq!(fourth.available_stock, 0);

        assert_eq!(ledger_stock(&db, &bottle.id).await, -4);
        let entries = service.ledger_for_item(&bottle.id).await.unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(
            entries
                .iter()
                .filter(|e| e.movement_type == MovementType::Sale)
                .count(),
            4
        );
    }

    #[tokio::test]
    async fn test_container_sum_matches_stock() {
        let (_db, service) = setup().await;
        let bottle = item(&service, "GIN-1L", 10).await;
        service.restock(&bottle.id, &restock_of(3)).await.unwrap();

        for (i, qty) in [2, 5, 3, 1].into_iter().enumerate() {
            service
                .consume_stock(&bottle.id, qty, &format!("TXN-{i}"), "till")
                .await
                .unwrap();
        }

        let summary = service.container_summary(&bottle.id).await.unwrap();
        assert_eq!(summary.current_stock, 19);
        assert_eq!(summary.expected_stock, summary.current_stock);
        assert_eq!(summary.full_containers, 1);
        assert_eq!(summary.tracked_containers, 2);
    }

    #[tokio::test]
    async fn test_item_without_containers() {
        let (db, service) = setup().await;
        let soap = item(&service, "SOAP", 0).await;
        service.restock(&soap.id, &restock_of(12)).await.unwrap();

        let sold = service.consume_stock(&soap.id, 15, "TXN-9", "till").await.unwrap();
        assert!(sold.container_id.is_none());
        assert!(sold.oversold);
        assert_eq!(sold.current_stock, -3);
        assert_eq!(sold.remaining_after, -3);
        assert_eq!(db.containers().count_for_item(&soap.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_consumption_loses_no_updates() {
        let (db, service) = setup().await;
        let bottle = item(&service, "RUM-700", 10).await;
        service.restock(&bottle.id, &restock_of(5)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let service = db.inventory();
            let item_id = bottle.id.clone();
            handles.push(tokio::spawn(async move {
                service
                    .consume_stock(&item_id, 1, &format!("TXN-{i}"), "till")
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let after = service.get_item(&bottle.id).await.unwrap();
        assert_eq!(after.current_stock, 30);
        assert_eq!(after.version, bottle.version + 21);

        let sales = service
            .ledger_for_item(&bottle.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.movement_type == MovementType::Sale)
            .count();
        assert_eq!(sales, 20);

        let summary = service.container_summary(&bottle.id).await.unwrap();
        assert_eq!(summary.expected_stock, 30);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumption_multi_thread() {
        let (db, service) = setup().await;
        let soap = item(&service, "SOAP-MT", 0).await;
        service.restock(&soap.id, &restock_of(100)).await.unwrap();

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let service = db.inventory();
                let item_id = soap.id.clone();
                tokio::spawn(async move {
                    service
                        .consume_stock(&item_id, 2, &format!("TXN-{i}"), "till")
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(service.get_item(&soap.id).await.unwrap().current_stock, 60);
        assert_eq!(ledger_stock(&db, &soap.id).await, 60);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_file_database_independent_items_concurrently() {
        let path = std::env::temp_dir().join(format!("vessel-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let service = db.inventory();

        let mut ids = Vec::new();
        for i in 0..40 {
            let cask = item(&service, &format!("CASK-{i:02}"), 10).await;
            service.restock(&cask.id, &restock_of(5)).await.unwrap();
            ids.push(cask.id);
        }

        // Five sales per item, every item at once: writers on different
        // items contend for the file's write lock, not for the item lock
        let mut handles = Vec::new();
        for (i, item_id) in ids.iter().enumerate() {
            for n in 0..5 {
                let service = db.inventory();
                let item_id = item_id.clone();
                handles.push(tokio::spawn(async move {
                    service
                        .consume_stock(&item_id, 3, &format!("TXN-{i}-{n}"), "till")
                        .await
                }));
            }
        }

        let mut failures = Vec::new();
        for handle in handles {
            if let Err(e) = handle.await.unwrap() {
                failures.push(e.to_string());
            }
        }

        let mut wrong = Vec::new();
        for item_id in &ids {
            let current = service.get_item(item_id).await.unwrap().current_stock;
            let ledger = ledger_stock(&db, item_id).await;
            if current != 35 || ledger != 35 {
                wrong.push((item_id.clone(), current, ledger));
            }
        }

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }

        assert!(failures.is_empty(), "{} of 200 sales failed: {failures:?}", failures.len());
        assert!(wrong.is_empty(), "stock drifted: {wrong:?}");
    }

    #[tokio::test]
    async fn test_consume_from_specific_container() {
        let (_db, service) = setup().await;
        let bottle = item(&service, "VODKA", 10).await;
        let created = service
            .create_containers(
                &bottle.id,
                &CreateContainers {
                    count: 2,
                    provenance: ContainerProvenance {
                        batch_number: Some("B-7".to_string()),
                        ..Default::default()
                    },
                    reference: "PO-2".to_string(),
                    actor: "clerk".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.tracked_container_ids.len(), 2);

        let target = &created.tracked_container_ids[1];
        let result = service
            .consume_from_container(target, 4, "TXN-1", "till")
            .await
            .unwrap();
        assert_eq!(result.container_id.as_deref(), Some(target.as_str()));
        assert_eq!(result.remaining_after, 6);
        assert_eq!(result.current_stock, 16);

        let err = service
            .consume_from_container("missing", 1, "TXN-2", "till")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::ContainerNotFound(_))));
    }

    #[tokio::test]
    async fn test_each_container_sale_is_one_ledger_entry() {
        let (db, service) = setup().await;
        let bottle = item(&service, "BRANDY", 10).await;
        let created = service
            .create_containers(
                &bottle.id,
                &CreateContainers {
                    count: 1,
                    provenance: ContainerProvenance {
                        batch_number: Some("B-9".to_string()),
                        ..Default::default()
                    },
                    reference: "PO-4".to_string(),
                    actor: "clerk".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let container_id = &created.tracked_container_ids[0];

        let quantities = [1, 4, 2, 3, 5];
        for (i, quantity) in quantities.into_iter().enumerate() {
            service
                .consume_from_container(container_id, quantity, &format!("TXN-{i}"), "till")
                .await
                .unwrap();
        }

        let sales: Vec<MovementEntry> = service
            .ledger_for_item(&bottle.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.movement_type == MovementType::Sale)
            .collect();
        assert_eq!(sales.len(), quantities.len());
        for (i, (entry, quantity)) in sales.iter().zip(quantities).enumerate() {
            assert_eq!(entry.quantity, quantity);
            assert_eq!(entry.reference, format!("TXN-{i}"));
            assert_eq!(entry.created_by.as_deref(), Some("till"));
        }

        let unit = db.containers().get_by_id(container_id).await.unwrap().unwrap();
        assert_eq!(unit.sale_history.len(), quantities.len());
        assert_eq!(unit.remaining, -5);
        assert_eq!(unit.status, ContainerStatus::Oversold);
        assert_eq!(service.get_item(&bottle.id).await.unwrap().current_stock, -5);
        assert_eq!(ledger_stock(&db, &bottle.id).await, -5);
    }

    #[tokio::test]
    async fn test_archived_container_is_not_sold_from() {
        let (db, service) = setup().await;
        let bottle = item(&service, "SHERRY", 10).await;
        service.restock(&bottle.id, &restock_of(1)).await.unwrap();
        let sale = service.consume_stock(&bottle.id, 10, "TXN-1", "till").await.unwrap();
        let container_id = sale.container_id.unwrap();
        service.archive_container(&container_id, "manager").await.unwrap();

        let err = service
            .consume_from_container(&container_id, 2, "TXN-2", "till")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::ContainerNotFound(_))));

        // Nothing moved, and the unit keeps its history
        assert_eq!(service.get_item(&bottle.id).await.unwrap().current_stock, 0);
        assert_eq!(ledger_stock(&db, &bottle.id).await, 0);
        assert!(db
            .ledger()
            .entries_by_reference("TXN-2")
            .await
            .unwrap()
            .is_empty());
        let listed = service
            .list_containers(
                &bottle.id,
                ContainerFilter {
                    include_empty: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].archived);
        assert_eq!(listed[0].remaining, 0);
        assert_eq!(listed[0].status, ContainerStatus::Empty);
        assert_eq!(listed[0].sale_history.len(), 1);
    }

    #[tokio::test]
    async fn test_create_containers_capacity_rules() {
        let (_db, service) = setup().await;
        let loose = item(&service, "LOOSE", 0).await;

        let request = CreateContainers {
            count: 2,
            reference: "PO-3".to_string(),
            actor: "clerk".to_string(),
            ..Default::default()
        };
        let err = service.create_containers(&loose.id, &request).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidConfiguration { .. })
        ));

        for capacity in [0, -4] {
            let err = service
                .create_containers(
                    &loose.id,
                    &CreateContainers {
                        capacity_override: Some(capacity),
                        ..request.clone()
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                DbError::Core(CoreError::Validation(ValidationError::MustBePositive { .. }))
            ));
        }

        // The item adopts the override when it has no capacity yet
        let adopted = service
            .create_containers(
                &loose.id,
                &CreateContainers {
                    capacity_override: Some(12),
                    ..request.clone()
                },
            )
            .await
            .unwrap();
        assert_eq!(adopted.quantity_added, 24);
        let after = service.get_item(&loose.id).await.unwrap();
        assert_eq!(after.container_capacity, 12);
        assert_eq!(after.full_containers, 2);

        // A different size is tracked unit by unit
        let odd = service
            .create_containers(
                &loose.id,
                &CreateContainers {
                    count: 1,
                    capacity_override: Some(5),
                    ..request
                },
            )
            .await
            .unwrap();
        assert_eq!(odd.tracked_container_ids.len(), 1);
        let after = service.get_item(&loose.id).await.unwrap();
        assert_eq!(after.current_stock, 29);
        assert_eq!(after.full_containers, 2);
        assert_eq!(after.restock_count, 2);
    }

    #[tokio::test]
    async fn test_adjust_container_rebuilds_stock() {
        let (db, service) = setup().await;
        let bottle = item(&service, "WHISKY", 10).await;
        service.restock(&bottle.id, &restock_of(1)).await.unwrap();
        let sale = service.consume_stock(&bottle.id, 4, "TXN-1", "till").await.unwrap();
        let container_id = sale.container_id.unwrap();

        let adjusted = service
            .adjust_container(&bottle.id, &container_id, 5, "manager")
            .await
            .unwrap();
        assert_eq!(adjusted.previous_remaining, 6);
        assert_eq!(adjusted.new_remaining, 5);
        assert_eq!(adjusted.previous_current_stock, 6);
        assert_eq!(adjusted.current_stock, 5);
        assert_eq!(adjusted.status, ContainerStatus::Partial);

        let entries = db
            .ledger()
            .entries_by_reference(&format!("adjust:{container_id}"))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].movement_type, MovementType::AdjustmentOut);
        assert_eq!(entries[0].quantity, 1);
        assert_eq!(ledger_stock(&db, &bottle.id).await, 5);

        let err = service
            .adjust_container(&bottle.id, "missing", 3, "manager")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::ContainerNotFound(_))));
    }

    #[tokio::test]
    async fn test_archive_is_two_step() {
        let (db, service) = setup().await;
        let bottle = item(&service, "PORT", 10).await;
        service.restock(&bottle.id, &restock_of(1)).await.unwrap();
        let sale = service.consume_stock(&bottle.id, 5, "TXN-1", "till").await.unwrap();
        let container_id = sale.container_id.unwrap();

        let first = service.archive_container(&container_id, "manager").await.unwrap();
        assert_eq!(
            first,
            ArchiveOutcome::SoftArchived {
                container_id: container_id.clone(),
                discarded: 5
            }
        );
        assert_eq!(service.get_item(&bottle.id).await.unwrap().current_stock, 0);
        assert_eq!(ledger_stock(&db, &bottle.id).await, 0);

        let listed = service
            .list_containers(
                &bottle.id,
                ContainerFilter {
                    include_empty: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].archived);
        assert_eq!(listed[0].sale_history[0].transaction_ref, "archive");

        let second = service.archive_container(&container_id, "manager").await.unwrap();
        assert!(matches!(second, ArchiveOutcome::Deleted { .. }));
        assert_eq!(db.containers().count_for_item(&bottle.id).await.unwrap(), 0);

        let err = service
            .archive_container(&container_id, "manager")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::ContainerNotFound(_))));
    }

    #[tokio::test]
    async fn test_reads_are_idempotent() {
        let (_db, service) = setup().await;
        let bottle = item(&service, "CIDER", 10).await;
        service.restock(&bottle.id, &restock_of(2)).await.unwrap();
        service.consume_stock(&bottle.id, 3, "TXN-1", "till").await.unwrap();

        let filter = ContainerFilter::default();
        let a = service.list_containers(&bottle.id, filter).await.unwrap();
        let b = service.list_containers(&bottle.id, filter).await.unwrap();
        assert_eq!(a, b);

        assert_eq!(service.get_available_stock(&bottle.id).await.unwrap(), 17);
        assert_eq!(service.get_available_stock(&bottle.id).await.unwrap(), 17);
        assert_eq!(
            service.get_item(&bottle.id).await.unwrap().version,
            bottle.version + 2
        );
    }

    #[tokio::test]
    async fn test_reservations_clamp() {
        let (db, service) = setup().await;
        let soap = item(&service, "SOAP-R", 0).await;
        service.restock(&soap.id, &restock_of(3)).await.unwrap();

        let reserved = service.reserve_stock(&soap.id, 5).await.unwrap();
        assert_eq!(reserved.reserved_stock, 5);
        assert_eq!(service.get_available_stock(&soap.id).await.unwrap(), 0);

        let released = service.release_reservation(&soap.id, 10).await.unwrap();
        assert_eq!(released.reserved_stock, 0);
        assert_eq!(service.get_available_stock(&soap.id).await.unwrap(), 3);

        // Reservations never touch the ledger
        assert_eq!(db.ledger().entries_for_item(&soap.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_movement() {
        let (db, service) = setup().await;
        let soap = item(&service, "SOAP-M", 0).await;
        service.restock(&soap.id, &restock_of(10)).await.unwrap();

        let damaged = service
            .record_movement(&soap.id, MovementType::Damage, 3, "DMG-1", "clerk")
            .await
            .unwrap();
        assert_eq!(damaged.current_stock, 7);
        let returned = service
            .record_movement(&soap.id, MovementType::Return, 1, "RET-1", "clerk")
            .await
            .unwrap();
        assert_eq!(returned.current_stock, 8);
        assert_eq!(ledger_stock(&db, &soap.id).await, 8);

        for rejected in [
            MovementType::Sale,
            MovementType::Purchase,
            MovementType::Transfer,
            MovementType::BundleSale,
        ] {
            let err = service
                .record_movement(&soap.id, rejected, 1, "X-1", "clerk")
                .await
                .unwrap_err();
            assert!(matches!(err, DbError::Core(CoreError::Validation(_))));
        }

        // Nothing rejected reached the item or the ledger
        assert_eq!(service.get_item(&soap.id).await.unwrap().current_stock, 8);
        assert_eq!(ledger_stock(&db, &soap.id).await, 8);
        let drift = db
            .auditor(crate::config::AuditSettings::default())
            .run(&vessel_core::audit::ReconciliationScope::All)
            .await
            .unwrap();
        assert!(drift.is_empty());

        let bottle = item(&service, "BEER", 6).await;
        let err = service
            .record_movement(&bottle.id, MovementType::Damage, 1, "DMG-2", "clerk")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn test_validation_and_missing_item() {
        let (_db, service) = setup().await;
        let soap = item(&service, "SOAP-V", 0).await;

        let err = service.consume_stock(&soap.id, 0, "TXN-1", "till").await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));
        let err = service.consume_stock(&soap.id, 1, "", "till").await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));

        let err = service.consume_stock("missing", 1, "TXN-1", "till").await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::ItemNotFound(_))));

        let err = service
            .create_item(NewStockItem {
                sku: "SOAP-V".to_string(),
                name: "Again".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        let err = service
            .create_item(NewStockItem {
                sku: "KEG-NEG".to_string(),
                name: "Keg".to_string(),
                container_capacity: -30,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));
    }

    #[tokio::test]
    async fn test_restock_candidates() {
        let (_db, service) = setup().await;
        let empty = item(&service, "A-EMPTY", 0).await;
        let low = item(&service, "B-LOW", 0).await;
        let fine = item(&service, "C-FINE", 0).await;
        service.restock(&low.id, &restock_of(4)).await.unwrap();
        service.restock(&fine.id, &restock_of(50)).await.unwrap();

        let candidates = service.restock_candidates(1.0).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].item_id, empty.id);
        assert!(candidates[0].urgent);
        assert_eq!(candidates[1].item_id, low.id);
        assert!(!candidates[1].urgent);
        assert_eq!(candidates[1].suggested_quantity, 4);
    }

    #[tokio::test]
    async fn test_update_restock_policy() {
        let (_db, service) = setup().await;
        let soap = item(&service, "SOAP-P", 0).await;
        let policy = RestockPolicy {
            reorder_point: 25,
            auto_reorder_enabled: true,
            restock_frequency_days: 7,
        };
        let updated = service.update_restock_policy(&soap.id, policy).await.unwrap();
        assert_eq!(updated.reorder_point, 25);
        assert!(updated.auto_reorder_enabled);
        assert_eq!(updated.version, soap.version + 1);
    }

    #[tokio::test]
    async fn test_deadline_while_item_is_locked() {
        let (db, _service) = setup().await;
        let service = db.inventory_with(ConcurrencySettings {
            operation_timeout_ms: 50,
            ..Default::default()
        });
        let soap = item(&service, "SOAP-D", 0).await;

        let _held = service.locks.acquire(&soap.id).await;
        let err = service.consume_stock(&soap.id, 1, "TXN-1", "till").await.unwrap_err();
        assert!(matches!(err, DbError::DeadlineExceeded { timeout_ms: 50, .. }));
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let (_db, service) = setup().await;
        let attempts = AtomicU32::new(0);

        let result = service
            .run_locked("item-r", "test", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DbError::conflict("item-r"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let (_db, service) = setup().await;
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result: DbResult<()> = service
            .run_locked("item-r", "test", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(DbError::conflict("item-r")) }
            })
            .await;
        assert!(matches!(
            result,
            Err(DbError::RetriesExhausted { attempts: 4, .. })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }
}
