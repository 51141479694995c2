//! # Stock Item Repository
//!
//! Database operations for stock items.
//!
//! ## Versioned Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  read item (version = 7)                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  mutate in memory, insert containers / history / ledger rows           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE stock_items SET ..., version = 8                               │
//! │   WHERE id = ? AND version = 7                                         │
//! │       │                                                                 │
//! │       ├── 1 row  → commit                                              │
//! │       └── 0 rows → ConcurrencyConflict, transaction rolled back        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The free functions take any executor so the service can run them on its
//! transaction; [`ItemRepository`] wraps them for plain pool access.

use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use vessel_core::StockItem;

const ITEM_COLUMNS: &str = r#"
    id, sku, name, current_stock, reserved_stock,
    reorder_point, auto_reorder_enabled, restock_frequency_days,
    average_restock_quantity, restock_count, last_restock_date,
    container_capacity, full_containers, version, created_at, updated_at
"#;

// =============================================================================
// Executor-Generic Queries
// =============================================================================

pub(crate) async fn fetch_item<'e, E>(exec: E, id: &str) -> DbResult<Option<StockItem>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {ITEM_COLUMNS} FROM stock_items WHERE id = ?1");
    let item = sqlx::query_as::<_, StockItem>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await?;
    Ok(item)
}

/// Fetches an item or fails with `ItemNotFound`.
pub(crate) async fn require_item<'e, E>(exec: E, id: &str) -> DbResult<StockItem>
where
    E: Executor<'e, Database = Sqlite>,
{
    fetch_item(exec, id)
        .await?
        .ok_or_else(|| vessel_core::CoreError::ItemNotFound(id.to_string()).into())
}

pub(crate) async fn insert_item<'e, E>(exec: E, item: &StockItem) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO stock_items (
            id, sku, name, current_stock, reserved_stock,
            reorder_point, auto_reorder_enabled, restock_frequency_days,
            average_restock_quantity, restock_count, last_restock_date,
            container_capacity, full_containers, version, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
    )
    .bind(&item.id)
    .bind(&item.sku)
    .bind(&item.name)
    .bind(item.current_stock)
    .bind(item.reserved_stock)
    .bind(item.reorder_point)
    .bind(item.auto_reorder_enabled)
    .bind(item.restock_frequency_days)
    .bind(item.average_restock_quantity)
    .bind(item.restock_count)
    .bind(item.last_restock_date)
    .bind(item.container_capacity)
    .bind(item.full_containers)
    .bind(item.version)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(exec)
    .await
    .map_err(|e| match DbError::from(e) {
        DbError::UniqueViolation { field, .. } => DbError::duplicate(field, item.sku.clone()),
        other => other,
    })?;
    Ok(())
}

/// Writes every mutable column of `item` if its stored version is still
/// `item.version`, then bumps the version.
///
/// On success `item.version` is advanced to match the row.
pub(crate) async fn compare_and_swap<'e, E>(exec: E, item: &mut StockItem) -> DbResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE stock_items SET
            current_stock = ?1,
            reserved_stock = ?2,
            reorder_point = ?3,
            auto_reorder_enabled = ?4,
            restock_frequency_days = ?5,
            average_restock_quantity = ?6,
            restock_count = ?7,
            last_restock_date = ?8,
            container_capacity = ?9,
            full_containers = ?10,
            updated_at = ?11,
            version = version + 1
        WHERE id = ?12 AND version = ?13
        "#,
    )
    .bind(item.current_stock)
    .bind(item.reserved_stock)
    .bind(item.reorder_point)
    .bind(item.auto_reorder_enabled)
    .bind(item.restock_frequency_days)
    .bind(item.average_restock_quantity)
    .bind(item.restock_count)
    .bind(item.last_restock_date)
    .bind(item.container_capacity)
    .bind(item.full_containers)
    .bind(item.updated_at)
    .bind(&item.id)
    .bind(item.version)
    .execute(exec)
    .await?;

    if result.rows_affected() == 0 {
        debug!(item_id = %item.id, version = item.version, "Version check failed");
        return Err(DbError::conflict(&item.id));
    }

    item.version += 1;
    Ok(())
}

pub(crate) async fn fetch_all_items<'e, E>(exec: E) -> DbResult<Vec<StockItem>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {ITEM_COLUMNS} FROM stock_items ORDER BY sku");
    Ok(sqlx::query_as::<_, StockItem>(&sql).fetch_all(exec).await?)
}

/// A random sample of at most `size` items.
pub(crate) async fn fetch_sample_items<'e, E>(exec: E, size: u32) -> DbResult<Vec<StockItem>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {ITEM_COLUMNS} FROM stock_items ORDER BY RANDOM() LIMIT ?1");
    Ok(sqlx::query_as::<_, StockItem>(&sql)
        .bind(size)
        .fetch_all(exec)
        .await?)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for stock item reads and inserts.
///
/// Stock mutations go through `InventoryService`, which owns the locking.
#[derive(Debug, Clone)]
pub struct ItemRepository {
    pool: SqlitePool,
}

impl ItemRepository {
    /// Creates a new ItemRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ItemRepository { pool }
    }

    pub async fn insert(&self, item: &StockItem) -> DbResult<()> {
        debug!(item_id = %item.id, sku = %item.sku, "Inserting stock item");
        insert_item(&self.pool, item).await
    }

    /// Gets an item by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(StockItem))` - Item found
    /// * `Ok(None)` - Item not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<StockItem>> {
        debug!(item_id = %id, "Getting stock item");
        fetch_item(&self.pool, id).await
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<StockItem>> {
        debug!(sku = %sku, "Getting stock item by SKU");
        let sql = format!("SELECT {ITEM_COLUMNS} FROM stock_items WHERE sku = ?1");
        Ok(sqlx::query_as::<_, StockItem>(&sql)
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Lists every item ordered by SKU.
    pub async fn list_all(&self) -> DbResult<Vec<StockItem>> {
        let items = fetch_all_items(&self.pool).await?;
        debug!(count = items.len(), "Listed stock items");
        Ok(items)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = db().await;
        let item = StockItem::new("SAL-500", "Saline 500ml", 500);
        db.items().insert(&item).await.unwrap();

        let loaded = db.items().get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(loaded.sku, "SAL-500");
        assert_eq!(loaded.container_capacity, 500);
        assert_eq!(loaded.version, 0);

        let by_sku = db.items().get_by_sku("SAL-500").await.unwrap().unwrap();
        assert_eq!(by_sku.id, item.id);
        assert!(db.items().get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = db().await;
        db.items()
            .insert(&StockItem::new("SAL-500", "Saline", 500))
            .await
            .unwrap();
        let err = db
            .items()
            .insert(&StockItem::new("SAL-500", "Saline again", 500))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_compare_and_swap_detects_stale_version() {
        let db = db().await;
        let item = StockItem::new("GAUZE", "Gauze", 0);
        db.items().insert(&item).await.unwrap();

        let mut first = db.items().get_by_id(&item.id).await.unwrap().unwrap();
        let mut stale = first.clone();

        first.current_stock = 5;
        compare_and_swap(db.pool(), &mut first).await.unwrap();
        assert_eq!(first.version, 1);

        stale.current_stock = 9;
        let err = compare_and_swap(db.pool(), &mut stale).await.unwrap_err();
        assert!(matches!(err, DbError::ConcurrencyConflict { .. }));

        let stored = db.items().get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.current_stock, 5);
        assert_eq!(stored.version, 1);
    }
}
