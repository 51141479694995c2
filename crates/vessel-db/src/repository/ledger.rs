//! # Movement Ledger Repository
//!
//! The append-only log of stock-affecting events.
//!
//! ## Append-Only
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  append(entry) ──► INSERT INTO stock_movements                          │
//! │                                                                         │
//! │  UPDATE stock_movements ... ──► trigger: RAISE(ABORT)                   │
//! │  DELETE FROM stock_movements ──► trigger: RAISE(ABORT)                  │
//! │                                                                         │
//! │  A wrong entry is corrected by appending an offsetting entry.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Appends tied to a stock mutation run on the service's transaction, so they
//! commit together with it. Standalone appends go straight to the pool.

use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use vessel_core::audit::{DuplicateMovementGroup, LedgerTotals, ScanWindow};
use vessel_core::{MovementEntry, MovementType};

const MOVEMENT_COLUMNS: &str = r#"
    id, item_id, movement_type, quantity, reference, unit_cost_cents, created_by, created_at
"#;

#[derive(sqlx::FromRow)]
struct DuplicateKeyRow {
    reference: String,
    item_id: String,
    movement_type: MovementType,
    count: i64,
}

// =============================================================================
// Executor-Generic Queries
// =============================================================================

pub(crate) async fn append<'e, E>(exec: E, entry: &MovementEntry) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, item_id, movement_type, quantity, reference, unit_cost_cents, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.item_id)
    .bind(entry.movement_type)
    .bind(entry.quantity)
    .bind(&entry.reference)
    .bind(entry.unit_cost_cents)
    .bind(&entry.created_by)
    .bind(entry.created_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Sums quantities per movement type and buckets them.
pub(crate) async fn fetch_totals<'e, E>(exec: E, item_id: &str) -> DbResult<LedgerTotals>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sums = sqlx::query_as::<_, (MovementType, i64)>(
        r#"
        SELECT movement_type, SUM(quantity)
        FROM stock_movements
        WHERE item_id = ?1
        GROUP BY movement_type
        "#,
    )
    .bind(item_id)
    .fetch_all(exec)
    .await?;

    Ok(LedgerTotals::from_type_sums(item_id, sums))
}

/// Groups entries of the window by `(reference, item_id, movement_type)` and
/// returns every group with more than one member, members included.
pub(crate) async fn fetch_duplicate_groups(
    conn: &mut SqliteConnection,
    window: &ScanWindow,
) -> DbResult<Vec<DuplicateMovementGroup>> {
    let keys = sqlx::query_as::<_, DuplicateKeyRow>(
        r#"
        SELECT reference, item_id, movement_type, COUNT(*) AS count
        FROM stock_movements
        WHERE created_at >= ?1 AND created_at <= ?2
        GROUP BY reference, item_id, movement_type
        HAVING COUNT(*) > 1
        ORDER BY reference, item_id, movement_type
        "#,
    )
    .bind(window.from)
    .bind(window.to)
    .fetch_all(&mut *conn)
    .await?;

    let sql = format!(
        r#"
        SELECT {MOVEMENT_COLUMNS}
        FROM stock_movements
        WHERE reference = ?1 AND item_id = ?2 AND movement_type = ?3
          AND created_at >= ?4 AND created_at <= ?5
        ORDER BY created_at, rowid
        "#
    );

    let mut groups = Vec::with_capacity(keys.len());
    for key in keys {
        let entries = sqlx::query_as::<_, MovementEntry>(&sql)
            .bind(&key.reference)
            .bind(&key.item_id)
            .bind(key.movement_type)
            .bind(window.from)
            .bind(window.to)
            .fetch_all(&mut *conn)
            .await?;

        groups.push(DuplicateMovementGroup {
            reference: key.reference,
            item_id: key.item_id,
            movement_type: key.movement_type,
            count: key.count,
            entries,
        });
    }

    Ok(groups)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the movement ledger.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Appends an entry that is not tied to a stock mutation.
    ///
    /// Safe to call concurrently; entries are never updated afterwards.
    pub async fn append(&self, entry: &MovementEntry) -> DbResult<()> {
        debug!(
            item_id = %entry.item_id,
            movement_type = %entry.movement_type,
            reference = %entry.reference,
            quantity = entry.quantity,
            "Appending ledger entry"
        );
        append(&self.pool, entry).await
    }

    /// Per-type totals of one item, bucketed into in / out / excluded.
    pub async fn totals_by_type(&self, item_id: &str) -> DbResult<LedgerTotals> {
        debug!(item_id = %item_id, "Summing ledger by type");
        fetch_totals(&self.pool, item_id).await
    }

    /// All entries of one item, oldest first.
    pub async fn entries_for_item(&self, item_id: &str) -> DbResult<Vec<MovementEntry>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE item_id = ?1 ORDER BY created_at, rowid"
        );
        let entries = sqlx::query_as::<_, MovementEntry>(&sql)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await?;
        debug!(item_id = %item_id, count = entries.len(), "Loaded ledger entries");
        Ok(entries)
    }

    pub async fn entries_by_reference(&self, reference: &str) -> DbResult<Vec<MovementEntry>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE reference = ?1 ORDER BY created_at, rowid"
        );
        Ok(sqlx::query_as::<_, MovementEntry>(&sql)
            .bind(reference)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Duplicate `(reference, item_id, movement_type)` groups within a window.
    pub async fn duplicate_groups(&self, window: &ScanWindow) -> DbResult<Vec<DuplicateMovementGroup>> {
        let mut conn = self.pool.acquire().await?;
        fetch_duplicate_groups(&mut conn, window).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
