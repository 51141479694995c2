//! # Duplicate Detector
//!
//! Flags ledger entries and sales that look like the same event recorded
//! twice. Results are advisory: a duplicate sale group is suspicious, not
//! proof, and nothing is voided or reversed automatically.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  one read transaction                                                   │
//! │    ├── stock_movements in window, GROUP BY (reference, item, type)     │
//! │    │   HAVING COUNT(*) > 1                 ─► duplicate_movements      │
//! │    └── completed sales in window                                        │
//! │          ├── by (customer, total, day)     ─► duplicate_sales          │
//! │          └── by (customer, total), adjacent                            │
//! │              pairs ≤ rapid_window_secs     ─► rapid_duplicates         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::AuditSettings;
use crate::error::DbResult;
use crate::repository::{ledger, sale};
use vessel_core::audit::{
    find_duplicate_sales, find_rapid_duplicates, DuplicateScanReport, ScanWindow,
};

/// Read-only duplicate scan over the ledger and the sales records.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    pool: SqlitePool,
    settings: AuditSettings,
}

impl DuplicateDetector {
    pub fn new(pool: SqlitePool, settings: AuditSettings) -> Self {
        DuplicateDetector { pool, settings }
    }

    /// Scans ledger entries created and sales completed inside `window`.
    pub async fn scan(&self, window: ScanWindow) -> DbResult<DuplicateScanReport> {
        let mut tx = self.pool.begin().await?;
        let duplicate_movements = ledger::fetch_duplicate_groups(&mut tx, &window).await?;
        let sales = sale::fetch_completed_between(&mut *tx, &window).await?;
        tx.commit().await?;

        let duplicate_sales = find_duplicate_sales(&sales);
        let rapid_duplicates = find_rapid_duplicates(&sales, self.settings.rapid_window_secs);

        for group in &duplicate_movements {
            warn!(
                item_id = %group.item_id,
                reference = %group.reference,
                movement_type = %group.movement_type,
                count = group.count,
                "Movement recorded more than once"
            );
        }
        for group in &duplicate_sales {
            warn!(
                customer_id = %group.customer_id,
                total_cents = group.total_cents,
                day = %group.day,
                count = group.count,
                "Possible duplicate sales"
            );
        }
        for pair in &rapid_duplicates {
            warn!(
                customer_id = %pair.customer_id,
                first = %pair.first.id,
                second = %pair.second.id,
                seconds_apart = pair.seconds_apart,
                "Rapid duplicate sale"
            );
        }

        info!(
            sales = sales.len(),
            duplicate_movements = duplicate_movements.len(),
            duplicate_sales = duplicate_sales.len(),
            rapid_duplicates = rapid_duplicates.len(),
            "Duplicate scan complete"
        );

        Ok(DuplicateScanReport {
            window,
            duplicate_movements,
            duplicate_sales,
            rapid_duplicates,
        })
    }

    /// Scans the last `days` days.
    pub async fn scan_last_days(&self, days: i64) -> DbResult<DuplicateScanReport> {
        self.scan(ScanWindow::last_days(days, Utc::now())).await
    }
}
