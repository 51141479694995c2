//! # Container Repository
//!
//! Persistence for individually tracked container units and their sale
//! history.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  container_units                 container_sale_history                │
//! │  ┌───────────────────────┐       ┌──────────────────────────────────┐  │
//! │  │ id                    │◄──────│ container_id  ┐ PRIMARY KEY      │  │
//! │  │ item_id ──► stock_items│       │ sequence      ┘ (monotonic)      │  │
//! │  │ remaining (signed)    │       │ transaction_ref, quantity_sold   │  │
//! │  │ status, opened        │       │ sold_at, sold_by                 │  │
//! │  └───────────────────────┘       └──────────────────────────────────┘  │
//! │                                                                         │
//! │  History rows are never updated. Deleting a unit cascades to them.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use crate::error::DbResult;
use vessel_core::container::{ContainerUnit, SaleHistoryEntry};

const UNIT_COLUMNS: &str = r#"
    id, item_id, capacity, remaining, status, opened, opened_at,
    batch_number, expiry_date, notes, archived_at, created_at, updated_at
"#;

#[derive(sqlx::FromRow)]
struct HistoryRow {
    container_id: String,
    #[sqlx(flatten)]
    entry: SaleHistoryEntry,
}

// =============================================================================
// Reads
// =============================================================================

/// Loads every unit of an item, history attached, in creation order.
pub(crate) async fn fetch_containers(
    conn: &mut SqliteConnection,
    item_id: &str,
) -> DbResult<Vec<ContainerUnit>> {
    let sql = format!(
        "SELECT {UNIT_COLUMNS} FROM container_units WHERE item_id = ?1 ORDER BY created_at, id"
    );
    let mut units = sqlx::query_as::<_, ContainerUnit>(&sql)
        .bind(item_id)
        .fetch_all(&mut *conn)
        .await?;

    let rows = sqlx::query_as::<_, HistoryRow>(
        r#"
        SELECT h.container_id, h.sequence, h.transaction_ref, h.quantity_sold, h.sold_at, h.sold_by
        FROM container_sale_history h
        INNER JOIN container_units c ON c.id = h.container_id
        WHERE c.item_id = ?1
        ORDER BY h.container_id, h.sequence
        "#,
    )
    .bind(item_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut history: HashMap<String, Vec<SaleHistoryEntry>> = HashMap::new();
    for row in rows {
        history.entry(row.container_id).or_default().push(row.entry);
    }
    for unit in &mut units {
        unit.sale_history = history.remove(&unit.id).unwrap_or_default();
    }

    Ok(units)
}

/// Loads one unit with its history.
pub(crate) async fn fetch_container(
    conn: &mut SqliteConnection,
    container_id: &str,
) -> DbResult<Option<ContainerUnit>> {
    let sql = format!("SELECT {UNIT_COLUMNS} FROM container_units WHERE id = ?1");
    let Some(mut unit) = sqlx::query_as::<_, ContainerUnit>(&sql)
        .bind(container_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    unit.sale_history = sqlx::query_as::<_, SaleHistoryEntry>(
        r#"
        SELECT sequence, transaction_ref, quantity_sold, sold_at, sold_by
        FROM container_sale_history
        WHERE container_id = ?1
        ORDER BY sequence
        "#,
    )
    .bind(container_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(unit))
}

// =============================================================================
// Writes
// =============================================================================

pub(crate) async fn insert_container<'e, E>(exec: E, unit: &ContainerUnit) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO container_units (
            id, item_id, capacity, remaining, status, opened, opened_at,
            batch_number, expiry_date, notes, archived_at, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&unit.id)
    .bind(&unit.item_id)
    .bind(unit.capacity)
    .bind(unit.remaining)
    .bind(unit.status)
    .bind(unit.opened)
    .bind(unit.opened_at)
    .bind(&unit.batch_number)
    .bind(unit.expiry_date)
    .bind(&unit.notes)
    .bind(unit.archived_at)
    .bind(unit.created_at)
    .bind(unit.updated_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Persists the mutable state of a unit. Provenance is left untouched.
pub(crate) async fn update_container_state<'e, E>(exec: E, unit: &ContainerUnit) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE container_units SET
            remaining = ?1,
            status = ?2,
            opened = ?3,
            opened_at = ?4,
            archived_at = ?5,
            updated_at = ?6
        WHERE id = ?7
        "#,
    )
    .bind(unit.remaining)
    .bind(unit.status)
    .bind(unit.opened)
    .bind(unit.opened_at)
    .bind(unit.archived_at)
    .bind(unit.updated_at)
    .bind(&unit.id)
    .execute(exec)
    .await?;
    Ok(())
}

pub(crate) async fn insert_history<'e, E>(
    exec: E,
    container_id: &str,
    entry: &SaleHistoryEntry,
) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO container_sale_history (
            container_id, sequence, transaction_ref, quantity_sold, sold_at, sold_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(container_id)
    .bind(entry.sequence)
    .bind(&entry.transaction_ref)
    .bind(entry.quantity_sold)
    .bind(entry.sold_at)
    .bind(&entry.sold_by)
    .execute(exec)
    .await?;
    Ok(())
}

/// Physically removes a unit; its history goes with it.
pub(crate) async fn delete_container<'e, E>(exec: E, container_id: &str) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("DELETE FROM container_units WHERE id = ?1")
        .bind(container_id)
        .execute(exec)
        .await?;
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to container units.
#[derive(Debug, Clone)]
pub struct ContainerRepository {
    pool: SqlitePool,
}

impl ContainerRepository {
    /// Creates a new ContainerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ContainerRepository { pool }
    }

    pub async fn get_by_id(&self, container_id: &str) -> DbResult<Option<ContainerUnit>> {
        debug!(container_id = %container_id, "Getting container");
        let mut conn = self.pool.acquire().await?;
        fetch_container(&mut conn, container_id).await
    }

    /// Every unit of an item (archived ones included), history attached.
    pub async fn list_for_item(&self, item_id: &str) -> DbResult<Vec<ContainerUnit>> {
        debug!(item_id = %item_id, "Listing containers");
        let mut conn = self.pool.acquire().await?;
        fetch_containers(&mut conn, item_id).await
    }

    pub async fn count_for_item(&self, item_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM container_units WHERE item_id = ?1")
                .bind(item_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
