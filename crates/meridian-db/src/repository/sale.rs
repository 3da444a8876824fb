//! # Sale Repository
//!
//! Database operations for sales and sale lines.
//!
//! ## Where This Sits in a Commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Commit Plumbing                              │
//! │                                                                         │
//! │  meridian-ledger::commit_sale                                          │
//! │       │                                                                 │
//! │       ├── 1. stock debits (StockRepository, one per line)              │
//! │       │                                                                 │
//! │       ├── 2. insert_with_lines() ← THIS FILE                           │
//! │       │      sale row + every line row in ONE transaction              │
//! │       │      (a sale with half its lines must be impossible)           │
//! │       │                                                                 │
//! │       └── 3. on unique collision: compensating credits upstream        │
//! │                                                                         │
//! │  The repository persists; the ledger decides. No business rules here.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use meridian_core::{Sale, SaleLine};

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

    /// Gets a sale by ID within a business scope.
    pub async fn find_by_id(&self, business_id: &str, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(
            r#"
            SELECT
                id, business_id, store_id, device_id, sale_number, client_ref,
                status, customer_id, customer_name, biller_name, payment_method,
                subtotal_cents, discount_cents, tax_cents, total_cents,
                note, sale_date, created_at, updated_at, cancelled_at
            FROM sales
            WHERE business_id = ?1 AND id = ?2
            "#,
        )
        .bind(business_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Gets a sale by its idempotency key.
    ///
    /// ## Usage
    /// Replay detection: an offline payload drained twice presents the same
    /// client_ref, and the second pass finds the first sale here.
    pub async fn find_by_client_ref(
        &self,
        business_id: &str,
        client_ref: &str,
    ) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(
            r#"
            SELECT
                id, business_id, store_id, device_id, sale_number, client_ref,
                status, customer_id, customer_name, biller_name, payment_method,
                subtotal_cents, discount_cents, tax_cents, total_cents,
                note, sale_date, created_at, updated_at, cancelled_at
            FROM sales
            WHERE business_id = ?1 AND client_ref = ?2
            "#,
        )
        .bind(business_id)
        .bind(client_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Inserts a sale and all its lines in one transaction.
    ///
    /// ## All-or-Nothing
    /// The sale row and every line row commit together. Any failure
    /// (including a client_ref collision) rolls the whole document back,
    /// so a sale can never exist with half its lines.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - client_ref already recorded
    pub async fn insert_with_lines(&self, sale: &Sale, lines: &[SaleLine]) -> DbResult<()> {
        debug!(id = %sale.id, sale_number = %sale.sale_number, lines = lines.len(), "Inserting sale");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, business_id, store_id, device_id, sale_number, client_ref,
                status, customer_id, customer_name, biller_name, payment_method,
                subtotal_cents, discount_cents, tax_cents, total_cents,
                note, sale_date, created_at, updated_at, cancelled_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.business_id)
        .bind(&sale.store_id)
        .bind(&sale.device_id)
        .bind(&sale.sale_number)
        .bind(&sale.client_ref)
        .bind(sale.status)
        .bind(&sale.customer_id)
        .bind(&sale.customer_name)
        .bind(&sale.biller_name)
        .bind(sale.payment_method)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(&sale.note)
        .bind(sale.sale_date)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .bind(sale.cancelled_at)
        .execute(&mut *tx)
        .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO sale_lines (
                    id, sale_id, product_id, name_snapshot,
                    unit_price_cents, quantity, line_total_cents,
                    line_no, created_at
                ) VALUES (
                    ?1, ?2, ?3, ?4,
                    ?5, ?6, ?7,
                    ?8, ?9
                )
                "#,
            )
            .bind(&line.id)
            .bind(&line.sale_id)
            .bind(&line.product_id)
            .bind(&line.name_snapshot)
            .bind(line.unit_price_cents)
            .bind(line.quantity)
            .bind(line.line_total_cents)
            .bind(line.line_no)
            .bind(line.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Gets all lines for a sale, in line order.
    pub async fn lines(&self, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let lines = sqlx::query_as::<_, SaleLine>(
            r#"
            SELECT
                id, sale_id, product_id, name_snapshot,
                unit_price_cents, quantity, line_total_cents,
                line_no, created_at
            FROM sale_lines
            WHERE sale_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Flips a sale to cancelled, once.
    ///
    /// ## Conditional Flip
    /// The WHERE clause excludes already-cancelled sales, so two racing
    /// cancels resolve to exactly one winner. The loser sees `false` and
    /// must not credit stock back a second time.
    ///
    /// ## Returns
    /// * `Ok(true)` - This call cancelled the sale
    /// * `Ok(false)` - Sale missing or already cancelled (caller decides which)
    pub async fn try_mark_cancelled(&self, business_id: &str, sale_id: &str) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE sales
            SET status = 'cancelled', cancelled_at = ?3, updated_at = ?3
            WHERE business_id = ?1 AND id = ?2 AND status != 'cancelled'
            "#,
        )
        .bind(business_id)
        .bind(sale_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::stock::generate_product_id;
    use meridian_core::{Product, SaleStatus};
    use uuid::Uuid;

    const BIZ: &str = "biz-1";
    const STORE: &str = "store-1";

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seed_product(db: &Database, name: &str) -> String {
        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            business_id: BIZ.to_string(),
            store_id: STORE.to_string(),
            name: name.to_string(),
            category: None,
            brand: None,
            barcode: None,
            description: None,
            image_url: None,
            quantity: 100,
            stock_alert: 5,
            price_cents: 500,
            cost_price_cents: None,
            created_at: now,
            updated_at: now,
        };
        db.stock().insert(&product).await.unwrap();
        product.id
    }

    fn make_sale(client_ref: &str) -> Sale {
        let now = Utc::now();
        Sale {
            id: Uuid::new_v4().to_string(),
            business_id: BIZ.to_string(),
            store_id: STORE.to_string(),
            device_id: "till-1".to_string(),
            sale_number: "S-000001".to_string(),
            client_ref: client_ref.to_string(),
            status: SaleStatus::Completed,
            customer_id: None,
            customer_name: None,
            biller_name: "Amira".to_string(),
            payment_method: None,
            subtotal_cents: 1000,
            discount_cents: 0,
            tax_cents: 0,
            total_cents: 1000,
            note: None,
            sale_date: now,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        }
    }

    fn make_line(sale_id: &str, product_id: &str, line_no: i64) -> SaleLine {
        SaleLine {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            product_id: product_id.to_string(),
            name_snapshot: format!("Product {}", line_no),
            unit_price_cents: 500,
            quantity: 1,
            line_total_cents: 500,
            line_no,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_sale_with_lines() {
        let db = test_db().await;
        let p1 = seed_product(&db, "Cola").await;
        let p2 = seed_product(&db, "Chips").await;

        let sale = make_sale("ref-1");
        let lines = vec![make_line(&sale.id, &p1, 0), make_line(&sale.id, &p2, 1)];
        db.sales().insert_with_lines(&sale, &lines).await.unwrap();

        let found = db.sales().find_by_id(BIZ, &sale.id).await.unwrap().unwrap();
        assert_eq!(found.sale_number, "S-000001");
        assert_eq!(found.status, SaleStatus::Completed);
        assert_eq!(found.cancelled_at, None);

        let fetched = db.sales().lines(&sale.id).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].line_no, 0);
        assert_eq!(fetched[1].line_no, 1);
    }

    #[tokio::test]
    async fn test_find_by_client_ref() {
        let db = test_db().await;
        let p1 = seed_product(&db, "Cola").await;

        let sale = make_sale("offline-xyz");
        let lines = vec![make_line(&sale.id, &p1, 0)];
        db.sales().insert_with_lines(&sale, &lines).await.unwrap();

        let found = db
            .sales()
            .find_by_client_ref(BIZ, "offline-xyz")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, sale.id);

        assert!(db
            .sales()
            .find_by_client_ref(BIZ, "other")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_client_ref_rolls_back_whole_document() {
        let db = test_db().await;
        let p1 = seed_product(&db, "Cola").await;

        let first = make_sale("ref-dup");
        db.sales()
            .insert_with_lines(&first, &[make_line(&first.id, &p1, 0)])
            .await
            .unwrap();

        let second = make_sale("ref-dup");
        let err = db
            .sales()
            .insert_with_lines(&second, &[make_line(&second.id, &p1, 0)])
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        // Rollback must leave no orphaned lines for the losing sale
        let orphans = db.sales().lines(&second.id).await.unwrap();
        assert!(orphans.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_flips_exactly_once() {
        let db = test_db().await;
        let p1 = seed_product(&db, "Cola").await;

        let sale = make_sale("ref-c");
        db.sales()
            .insert_with_lines(&sale, &[make_line(&sale.id, &p1, 0)])
            .await
            .unwrap();

        assert!(db.sales().try_mark_cancelled(BIZ, &sale.id).await.unwrap());
        // Second attempt must lose
        assert!(!db.sales().try_mark_cancelled(BIZ, &sale.id).await.unwrap());

        let cancelled = db.sales().find_by_id(BIZ, &sale.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, SaleStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_missing_sale_returns_false() {
        let db = test_db().await;
        assert!(!db
            .sales()
            .try_mark_cancelled(BIZ, "no-such-sale")
            .await
            .unwrap());
    }
}
