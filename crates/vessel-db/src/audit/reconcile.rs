//! # Reconciliation Auditor
//!
//! Compares each item's `current_stock` with the stock its ledger implies.
//!
//! The two figures are maintained by different code paths (container state
//! on one side, appended movements on the other), so a bug, a half-applied
//! out-of-band fix or a direct database edit shows up here as drift.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::config::AuditSettings;
use crate::error::DbResult;
use crate::repository::{item as items, ledger};
use vessel_core::audit::{check_discrepancy, DiscrepancyReport, ReconciliationScope};
use vessel_core::StockItem;

/// Read-only stock/ledger reconciliation.
#[derive(Debug, Clone)]
pub struct ReconciliationAuditor {
    pool: SqlitePool,
    settings: AuditSettings,
}

impl ReconciliationAuditor {
    pub fn new(pool: SqlitePool, settings: AuditSettings) -> Self {
        ReconciliationAuditor { pool, settings }
    }

    pub fn settings(&self) -> &AuditSettings {
        &self.settings
    }

    /// Checks the items in `scope` and returns those whose discrepancy
    /// exceeds the tolerance, largest drift first.
    ///
    /// Ids in an explicit item list that no longer exist are skipped.
    pub async fn run(&self, scope: &ReconciliationScope) -> DbResult<Vec<DiscrepancyReport>> {
        let checked_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        let scoped: Vec<StockItem> = match scope {
            ReconciliationScope::All => items::fetch_all_items(&mut *tx).await?,
            ReconciliationScope::Sample(size) => items::fetch_sample_items(&mut *tx, *size).await?,
            ReconciliationScope::Items(ids) => {
                let mut found = Vec::with_capacity(ids.len());
                for id in ids {
                    match items::fetch_item(&mut *tx, id).await? {
                        Some(item) => found.push(item),
                        None => warn!(item_id = %id, "Item in reconciliation scope not found"),
                    }
                }
                found
            }
        };
        debug!(items = scoped.len(), ?scope, "Reconciling");

        let mut reports = Vec::new();
        for item in &scoped {
            let totals = ledger::fetch_totals(&mut *tx, &item.id).await?;
            if let Some(report) =
                check_discrepancy(item, &totals, self.settings.tolerance, checked_at)
            {
                warn!(
                    item_id = %report.item_id,
                    sku = %report.sku,
                    current_stock = report.current_stock,
                    calculated_stock = report.calculated_stock,
                    discrepancy = report.discrepancy,
                    "Stock does not match ledger"
                );
                reports.push(report);
            }
        }
        tx.commit().await?;

        reports.sort_by(|a, b| {
            b.discrepancy
                .abs()
                .cmp(&a.discrepancy.abs())
                .then_with(|| a.sku.cmp(&b.sku))
        });

        info!(
            checked = scoped.len(),
            discrepancies = reports.len(),
            "Reconciliation complete"
        );
        Ok(reports)
    }

    /// Reconciles a random sample of `sample_size` items.
    pub async fn run_sample(&self) -> DbResult<Vec<DiscrepancyReport>> {
        self.run(&ReconciliationScope::Sample(self.settings.sample_size))
            .await
    }
}
