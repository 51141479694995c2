//! # Sale Repository
//!
//! Sale headers written by the checkout workflow. The duplicate detector
//! reads completed sales from here.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   create_sale ──► DRAFT ──complete_sale──► COMPLETED                    │
//! │                     │                          │                        │
//! │                     └────────void_sale─────────┴──► VOIDED              │
//! │                                                                         │
//! │   Only COMPLETED sales with a customer take part in duplicate scans.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use vessel_core::audit::ScanWindow;
use vessel_core::{Money, SaleRecord, SaleStatus};

const SALE_COLUMNS: &str =
    "id, receipt_number, customer_id, total_cents, status, created_at, completed_at";

/// Completed sales whose completion time falls inside the window.
pub(crate) async fn fetch_completed_between<'e, E>(
    exec: E,
    window: &ScanWindow,
) -> DbResult<Vec<SaleRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"
        SELECT {SALE_COLUMNS}
        FROM sales
        WHERE status = 'completed'
          AND completed_at >= ?1 AND completed_at <= ?2
        ORDER BY completed_at, id
        "#
    );
    Ok(sqlx::query_as::<_, SaleRecord>(&sql)
        .bind(window.from)
        .bind(window.to)
        .fetch_all(exec)
        .await?)
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SaleRecord>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
        Ok(sqlx::query_as::<_, SaleRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Inserts a sale as given (imports, replays, tests).
    pub async fn insert_sale(&self, sale: &SaleRecord) -> DbResult<()> {
        debug!(id = %sale.id, receipt_number = %sale.receipt_number, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, receipt_number, customer_id, total_cents, status, created_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.receipt_number)
        .bind(&sale.customer_id)
        .bind(sale.total_cents)
        .bind(sale.status)
        .bind(sale.created_at)
        .bind(sale.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Creates a new draft sale.
    ///
    /// ## Returns
    /// The created sale with generated ID and receipt number.
    pub async fn create_sale(&self, customer_id: Option<&str>, total: Money) -> DbResult<SaleRecord> {
        let sale = SaleRecord {
            id: Uuid::new_v4().to_string(),
            receipt_number: generate_receipt_number(),
            customer_id: customer_id.map(str::to_string),
            total_cents: total.cents(),
            status: SaleStatus::Draft,
            created_at: Utc::now(),
            completed_at: None,
        };

        self.insert_sale(&sale).await?;
        debug!(receipt = %sale.receipt_number, total = %total, "Draft sale created");
        Ok(sale)
    }

    /// Marks a draft sale as completed now.
    pub async fn complete_sale(&self, sale_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET status = 'completed', completed_at = ?2
            WHERE id = ?1 AND status = 'draft'
            "#,
        )
        .bind(sale_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale (draft)", sale_id));
        }

        Ok(())
    }

    /// Voids a sale.
    pub async fn void_sale(&self, sale_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET status = 'voided'
            WHERE id = ?1 AND status IN ('draft', 'completed')
            "#,
        )
        .bind(sale_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }

        Ok(())
    }

    /// Completed sales inside a window, oldest first.
    pub async fn completed_between(&self, window: &ScanWindow) -> DbResult<Vec<SaleRecord>> {
        let sales = fetch_completed_between(&self.pool, window).await?;
        debug!(count = sales.len(), "Loaded completed sales");
        Ok(sales)
    }
}

/// Generates a receipt number in format: YYYYMMDD-XXXXXXXX
fn generate_receipt_number() -> String {
    let date_part = Utc::now().format("%Y%m%d");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", date_part, &suffix[..8].to_uppercase())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;

    #[tokio::test]
    async fn test_sale_lifecycle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sales = db.sales();

        let sale = sales
            .create_sale(Some("patient-1"), Money::from_cents(7500))
            .await
            .unwrap();
        assert_eq!(sale.status, SaleStatus::Draft);

        sales.complete_sale(&sale.id).await.unwrap();
        let loaded = sales.get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SaleStatus::Completed);
        assert!(loaded.completed_at.is_some());

        // Completing twice is rejected
        assert!(sales.complete_sale(&sale.id).await.is_err());

        let window = ScanWindow::new(Utc::now() - Duration::hours(1), Utc::now() + Duration::hours(1));
        assert_eq!(sales.completed_between(&window).await.unwrap().len(), 1);

        sales.void_sale(&sale.id).await.unwrap();
        assert!(sales.completed_between(&window).await.unwrap().is_empty());
    }

    #[test]
    fn test_receipt_numbers_differ() {
        assert_ne!(generate_receipt_number(), generate_receipt_number());
    }
}
