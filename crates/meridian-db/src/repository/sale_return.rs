//! # Return Repository
//!
//! Database operations for sale returns and their items.
//!
//! ## State Machine (enforced by conditional UPDATEs)
//! ```text
//!                 try_set_status            try_mark_refunded
//!   ┌─────────┐  ─────────────────▶  ┌──────────┐  ───────────▶  refunded = 1
//!   │ pending │                      │ approved │                (exactly once)
//!   └─────────┘  ─────────────────▶  ├──────────┤
//!                                    │ rejected │  ──▶ refund impossible
//!                                    └──────────┘
//! ```
//! Every transition is a single UPDATE whose WHERE clause names the state it
//! leaves. Two racing approvals, or a refund raced against a rejection,
//! resolve to one winner and one `false`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use meridian_core::{ReturnItem, ReturnStatus, SaleReturn};

/// Repository for return database operations.
#[derive(Debug, Clone)]
pub struct ReturnRepository {
    pool: SqlitePool,
}

impl ReturnRepository {
    /// Creates a new ReturnRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReturnRepository { pool }
    }

    /// Gets a return by ID within a business scope.
    pub async fn find_by_id(&self, business_id: &str, id: &str) -> DbResult<Option<SaleReturn>> {
        let ret = sqlx::query_as::<_, SaleReturn>(
            r#"
            SELECT
                id, business_id, store_id, device_id, reference, sale_id,
                client_ref, customer, reason, status, payment_method,
                subtotal_cents, tax_cents, amount_cents, refunded,
                approved_by, return_date, created_at, updated_at
            FROM sale_returns
            WHERE business_id = ?1 AND id = ?2
            "#,
        )
        .bind(business_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ret)
    }

    /// Gets a return by its human-facing reference (the slip number).
    pub async fn find_by_reference(
        &self,
        business_id: &str,
        reference: &str,
    ) -> DbResult<Option<SaleReturn>> {
        let ret = sqlx::query_as::<_, SaleReturn>(
            r#"
            SELECT
                id, business_id, store_id, device_id, reference, sale_id,
                client_ref, customer, reason, status, payment_method,
                subtotal_cents, tax_cents, amount_cents, refunded,
                approved_by, return_date, created_at, updated_at
            FROM sale_returns
            WHERE business_id = ?1 AND reference = ?2
            "#,
        )
        .bind(business_id)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ret)
    }

    /// Inserts a return and all its items in one transaction.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - reference already recorded for
    ///   this business; nothing is written
    pub async fn insert_with_items(&self, ret: &SaleReturn, items: &[ReturnItem]) -> DbResult<()> {
        debug!(id = %ret.id, reference = %ret.reference, items = items.len(), "Inserting return");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sale_returns (
                id, business_id, store_id, device_id, reference, sale_id,
                client_ref, customer, reason, status, payment_method,
                subtotal_cents, tax_cents, amount_cents, refunded,
                approved_by, return_date, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19
            )
            "#,
        )
        .bind(&ret.id)
        .bind(&ret.business_id)
        .bind(&ret.store_id)
        .bind(&ret.device_id)
        .bind(&ret.reference)
        .bind(&ret.sale_id)
        .bind(&ret.client_ref)
        .bind(&ret.customer)
        .bind(&ret.reason)
        .bind(ret.status)
        .bind(ret.payment_method)
        .bind(ret.subtotal_cents)
        .bind(ret.tax_cents)
        .bind(ret.amount_cents)
        .bind(ret.refunded)
        .bind(&ret.approved_by)
        .bind(ret.return_date)
        .bind(ret.created_at)
        .bind(ret.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO sale_return_items (
                    id, return_id, product_id, name_snapshot,
                    unit_price_cents, quantity, line_total_cents,
                    line_no, created_at
                ) VALUES (
                    ?1, ?2, ?3, ?4,
                    ?5, ?6, ?7,
                    ?8, ?9
                )
                "#,
            )
            .bind(&item.id)
            .bind(&item.return_id)
            .bind(&item.product_id)
            .bind(&item.name_snapshot)
            .bind(item.unit_price_cents)
            .bind(item.quantity)
            .bind(item.line_total_cents)
            .bind(item.line_no)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Gets all items for a return, in line order.
    pub async fn items(&self, return_id: &str) -> DbResult<Vec<ReturnItem>> {
        let items = sqlx::query_as::<_, ReturnItem>(
            r#"
            SELECT
                id, return_id, product_id, name_snapshot,
                unit_price_cents, quantity, line_total_cents,
                line_no, created_at
            FROM sale_return_items
            WHERE return_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(return_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Sums already-returned quantities per product name for a sale.
    ///
    /// Only pending and approved returns count toward the over-return
    /// ceiling. A rejected slip releases its quantities back.
    pub async fn returned_quantities(&self, sale_id: &str) -> DbResult<Vec<(String, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT ri.name_snapshot, SUM(ri.quantity)
            FROM sale_return_items ri
            JOIN sale_returns r ON r.id = ri.return_id
            WHERE r.sale_id = ?1 AND r.status IN ('pending', 'approved')
            GROUP BY ri.name_snapshot
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// True if any return references this sale, in any status.
    ///
    /// ## Usage
    /// Cancelling a sale that has a return slip (even a rejected one)
    /// would strand the paper trail, so the ledger refuses.
    pub async fn exists_for_sale(&self, sale_id: &str) -> DbResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sale_returns WHERE sale_id = ?1",
        )
        .bind(sale_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Moves a pending return to approved or rejected, once.
    ///
    /// ## Returns
    /// * `Ok(true)` - transition applied
    /// * `Ok(false)` - return missing or no longer pending (caller decides which)
    pub async fn try_set_status(
        &self,
        business_id: &str,
        id: &str,
        status: ReturnStatus,
        approved_by: Option<&str>,
    ) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE sale_returns
            SET status = ?3, approved_by = ?4, updated_at = ?5
            WHERE business_id = ?1 AND id = ?2 AND status = 'pending'
            "#,
        )
        .bind(business_id)
        .bind(id)
        .bind(status)
        .bind(approved_by)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Records the refund payout for an approved return, once.
    ///
    /// ## Returns
    /// * `Ok(true)` - refund recorded
    /// * `Ok(false)` - return missing, not approved, or already refunded
    pub async fn try_mark_refunded(&self, business_id: &str, id: &str) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE sale_returns
            SET refunded = 1, updated_at = ?3
            WHERE business_id = ?1 AND id = ?2 AND status = 'approved' AND refunded = 0
            "#,
        )
        .bind(business_id)
        .bind(id)
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
    use meridian_core::Product;
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
            quantity: 50,
            stock_alert: 5,
            price_cents: 300,
            cost_price_cents: None,
            created_at: now,
            updated_at: now,
        };
        db.stock().insert(&product).await.unwrap();
        product.id
    }

    fn make_return(reference: &str) -> SaleReturn {
        let now = Utc::now();
        SaleReturn {
            id: Uuid::new_v4().to_string(),
            business_id: BIZ.to_string(),
            store_id: STORE.to_string(),
            device_id: "till-1".to_string(),
            reference: reference.to_string(),
            sale_id: None,
            client_ref: None,
            customer: "Walk-in".to_string(),
            reason: "Damaged".to_string(),
            status: ReturnStatus::Pending,
            payment_method: None,
            subtotal_cents: 300,
            tax_cents: 0,
            amount_cents: 300,
            refunded: false,
            approved_by: None,
            return_date: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn make_item(return_id: &str, product_id: &str, name: &str, quantity: i64) -> ReturnItem {
        ReturnItem {
            id: Uuid::new_v4().to_string(),
            return_id: return_id.to_string(),
            product_id: product_id.to_string(),
            name_snapshot: name.to_string(),
            unit_price_cents: 300,
            quantity,
            line_total_cents: 300 * quantity,
            line_no: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_return_with_items() {
        let db = test_db().await;
        let p1 = seed_product(&db, "Cola").await;

        let ret = make_return("RET-001");
        let items = vec![make_item(&ret.id, &p1, "Cola", 2)];
        db.returns().insert_with_items(&ret, &items).await.unwrap();

        let found = db
            .returns()
            .find_by_reference(BIZ, "RET-001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, ReturnStatus::Pending);
        assert!(!found.refunded);

        let fetched = db.returns().items(&ret.id).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_duplicate_reference_rejected() {
        let db = test_db().await;
        let p1 = seed_product(&db, "Cola").await;

        let first = make_return("RET-DUP");
        db.returns()
            .insert_with_items(&first, &[make_item(&first.id, &p1, "Cola", 1)])
            .await
            .unwrap();

        let second = make_return("RET-DUP");
        let err = db
            .returns()
            .insert_with_items(&second, &[make_item(&second.id, &p1, "Cola", 1)])
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());

        // The losing insert must leave no items behind
        assert!(db.returns().items(&second.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_returned_quantities_excludes_rejected() {
        let db = test_db().await;
        let p1 = seed_product(&db, "Cola").await;

        // The FK on sale_returns.sale_id requires a real sale row
        let sale = {
            let now = Utc::now();
            meridian_core::Sale {
                id: Uuid::new_v4().to_string(),
                business_id: BIZ.to_string(),
                store_id: STORE.to_string(),
                device_id: "till-1".to_string(),
                sale_number: "S-000001".to_string(),
                client_ref: "ref-1".to_string(),
                status: meridian_core::SaleStatus::Completed,
                customer_id: None,
                customer_name: None,
                biller_name: "Amira".to_string(),
                payment_method: None,
                subtotal_cents: 900,
                discount_cents: 0,
                tax_cents: 0,
                total_cents: 900,
                note: None,
                sale_date: now,
                created_at: now,
                updated_at: now,
                cancelled_at: None,
            }
        };
        db.sales().insert_with_lines(&sale, &[]).await.unwrap();

        let mut first = make_return("RET-A");
        first.sale_id = Some(sale.id.clone());
        db.returns()
            .insert_with_items(&first, &[make_item(&first.id, &p1, "Cola", 2)])
            .await
            .unwrap();

        let mut second = make_return("RET-B");
        second.sale_id = Some(sale.id.clone());
        db.returns()
            .insert_with_items(&second, &[make_item(&second.id, &p1, "Cola", 1)])
            .await
            .unwrap();

        let sums = db.returns().returned_quantities(&sale.id).await.unwrap();
        assert_eq!(sums, vec![("Cola".to_string(), 3)]);

        // Rejecting the second slip releases its quantity
        assert!(db
            .returns()
            .try_set_status(BIZ, &second.id, ReturnStatus::Rejected, Some("mgr"))
            .await
            .unwrap());
        let sums = db.returns().returned_quantities(&sale.id).await.unwrap();
        assert_eq!(sums, vec![("Cola".to_string(), 2)]);

        // But the rejected slip still blocks cancellation of the sale
        assert!(db.returns().exists_for_sale(&sale.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_status_transition_applies_once() {
        let db = test_db().await;
        let p1 = seed_product(&db, "Cola").await;

        let ret = make_return("RET-S");
        db.returns()
            .insert_with_items(&ret, &[make_item(&ret.id, &p1, "Cola", 1)])
            .await
            .unwrap();

        assert!(db
            .returns()
            .try_set_status(BIZ, &ret.id, ReturnStatus::Approved, Some("mgr"))
            .await
            .unwrap());
        // Already approved: a second transition loses
        assert!(!db
            .returns()
            .try_set_status(BIZ, &ret.id, ReturnStatus::Rejected, Some("mgr"))
            .await
            .unwrap());

        let found = db.returns().find_by_id(BIZ, &ret.id).await.unwrap().unwrap();
        assert_eq!(found.status, ReturnStatus::Approved);
        assert_eq!(found.approved_by.as_deref(), Some("mgr"));
    }

    #[tokio::test]
    async fn test_refund_requires_approved_and_applies_once() {
        let db = test_db().await;
        let p1 = seed_product(&db, "Cola").await;

        let ret = make_return("RET-R");
        db.returns()
            .insert_with_items(&ret, &[make_item(&ret.id, &p1, "Cola", 1)])
            .await
            .unwrap();

        // Pending: refund refused
        assert!(!db.returns().try_mark_refunded(BIZ, &ret.id).await.unwrap());

        db.returns()
            .try_set_status(BIZ, &ret.id, ReturnStatus::Approved, None)
            .await
            .unwrap();

        assert!(db.returns().try_mark_refunded(BIZ, &ret.id).await.unwrap());
        // Second payout must lose
        assert!(!db.returns().try_mark_refunded(BIZ, &ret.id).await.unwrap());

        let found = db.returns().find_by_id(BIZ, &ret.id).await.unwrap().unwrap();
        assert!(found.refunded);
    }
}
