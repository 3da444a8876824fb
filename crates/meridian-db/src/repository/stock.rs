//! # Stock Repository
//!
//! Database operations for the product stock ledger.
//!
//! ## The Conditional Debit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stock Debit Strategy                                 │
//! │                                                                         │
//! │  ❌ WRONG: Read-check-write (race window)                              │
//! │     let qty = SELECT quantity ...        ← till B debits here          │
//! │     if qty >= requested {                                              │
//! │         UPDATE products SET quantity = qty - requested                 │
//! │     }                                    ← stock goes negative         │
//! │                                                                         │
//! │  ✅ CORRECT: Single conditional UPDATE                                 │
//! │     UPDATE products                                                    │
//! │     SET quantity = quantity - ?                                        │
//! │     WHERE id = ? AND quantity >= ?                                     │
//! │     RETURNING quantity                                                 │
//! │                                                                         │
//! │  SQLite serializes writers, so the check and the subtraction are one   │
//! │  atomic step. No row back = not enough stock (or no such product);     │
//! │  a follow-up SELECT tells the two apart.                               │
//! │                                                                         │
//! │  Two tills fighting over the last 5 units: exactly one wins.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use meridian_core::{Product, StockAdjustment, StockLevel};

/// Outcome of a conditional stock debit.
///
/// Short stock is an expected, normal outcome of the race between tills,
/// not an infrastructure failure, so it is data rather than an error here.
/// The ledger layer turns it into `InsufficientStock` with product context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    /// The debit applied; here is the stock level it produced.
    Applied(StockLevel),
    /// Not enough stock. The row was not changed.
    Insufficient { available: i64 },
}

/// Repository for stock ledger operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = StockRepository::new(pool);
///
/// match repo.debit("biz-001", "store-001", &product_id, 3).await? {
///     DebitOutcome::Applied(level) => { /* sold */ }
///     DebitOutcome::Insufficient { available } => { /* reject */ }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Atomically debits stock if and only if enough is available.
    ///
    /// ## How It Works
    /// 1. One conditional UPDATE guarded by `quantity >= requested`
    /// 2. RETURNING hands back the post-debit snapshot
    /// 3. No row back: a follow-up SELECT distinguishes a missing product
    ///    from short stock
    ///
    /// ## Returns
    /// * `Ok(DebitOutcome::Applied(level))` - Debit applied
    /// * `Ok(DebitOutcome::Insufficient { available })` - Not enough stock
    /// * `Err(DbError::NotFound)` - No such product in this store
    pub async fn debit(
        &self,
        business_id: &str,
        store_id: &str,
        product_id: &str,
        qty: i64,
    ) -> DbResult<DebitOutcome> {
        debug!(product_id = %product_id, qty = %qty, "Debiting stock");

        let now = Utc::now();

        let level = sqlx::query_as::<_, StockLevel>(
            r#"
            UPDATE products
            SET quantity = quantity - ?4, updated_at = ?5
            WHERE business_id = ?1 AND store_id = ?2 AND id = ?3
              AND quantity >= ?4
            RETURNING id AS product_id, name, quantity, stock_alert
            "#,
        )
        .bind(business_id)
        .bind(store_id)
        .bind(product_id)
        .bind(qty)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(level) = level {
            return Ok(DebitOutcome::Applied(level));
        }

        // Guard did not match: either the product is missing or the stock
        // is short. Read the quantity to tell which.
        let available: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT quantity FROM products
            WHERE business_id = ?1 AND store_id = ?2 AND id = ?3
            "#,
        )
        .bind(business_id)
        .bind(store_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        match available {
            Some(available) => Ok(DebitOutcome::Insufficient { available }),
            None => Err(DbError::not_found("Product", product_id)),
        }
    }

    /// Credits stock back (returns, cancellations, positive adjustments).
    ///
    /// Credits have no upper guard; they always apply when the product
    /// exists.
    pub async fn credit(
        &self,
        business_id: &str,
        store_id: &str,
        product_id: &str,
        qty: i64,
    ) -> DbResult<StockLevel> {
        debug!(product_id = %product_id, qty = %qty, "Crediting stock");

        let now = Utc::now();

        let level = sqlx::query_as::<_, StockLevel>(
            r#"
            UPDATE products
            SET quantity = quantity + ?4, updated_at = ?5
            WHERE business_id = ?1 AND store_id = ?2 AND id = ?3
            RETURNING id AS product_id, name, quantity, stock_alert
            "#,
        )
        .bind(business_id)
        .bind(store_id)
        .bind(product_id)
        .bind(qty)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        level.ok_or_else(|| DbError::not_found("Product", product_id))
    }

    /// Gets a product by its ID within a store scope.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn find_by_id(
        &self,
        business_id: &str,
        store_id: &str,
        id: &str,
    ) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                id, business_id, store_id, name, category, brand, barcode,
                description, image_url, quantity, stock_alert,
                price_cents, cost_price_cents, created_at, updated_at
            FROM products
            WHERE business_id = ?1 AND store_id = ?2 AND id = ?3
            "#,
        )
        .bind(business_id)
        .bind(store_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by its display name within a store scope.
    ///
    /// Names are unique per (business, store); this is how return items on
    /// a paper slip find their products.
    pub async fn find_by_name(
        &self,
        business_id: &str,
        store_id: &str,
        name: &str,
    ) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT
                id, business_id, store_id, name, category, brand, barcode,
                description, image_url, quantity, stock_alert,
                price_cents, cost_price_cents, created_at, updated_at
            FROM products
            WHERE business_id = ?1 AND store_id = ?2 AND name = ?3
            "#,
        )
        .bind(business_id)
        .bind(store_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Inserts a new product.
    ///
    /// ## Arguments
    /// * `product` - Product to insert (id should be generated beforehand)
    ///
    /// ## Returns
    /// * `Ok(())` - Inserted
    /// * `Err(DbError::UniqueViolation)` - Name or barcode already taken
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, business_id, store_id, name, category, brand, barcode,
                description, image_url, quantity, stock_alert,
                price_cents, cost_price_cents, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15
            )
            "#,
        )
        .bind(&product.id)
        .bind(&product.business_id)
        .bind(&product.store_id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(&product.barcode)
        .bind(&product.description)
        .bind(&product.image_url)
        .bind(product.quantity)
        .bind(product.stock_alert)
        .bind(product.price_cents)
        .bind(product.cost_price_cents)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists products at or below their alert threshold.
    ///
    /// ## Usage
    /// Dashboard panel and close-of-day reorder report.
    pub async fn list_below_alert(
        &self,
        business_id: &str,
        store_id: &str,
    ) -> DbResult<Vec<StockLevel>> {
        let levels = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT id AS product_id, name, quantity, stock_alert
            FROM products
            WHERE business_id = ?1 AND store_id = ?2
              AND quantity <= stock_alert
            ORDER BY name
            "#,
        )
        .bind(business_id)
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(levels)
    }

    /// Counts products in a store (for diagnostics).
    pub async fn count(&self, business_id: &str, store_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE business_id = ?1 AND store_id = ?2",
        )
        .bind(business_id)
        .bind(store_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Records the audit row for a manual adjustment.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - client_ref already recorded
    ///   (the caller lost an idempotency race and should undo its movement)
    pub async fn insert_adjustment(&self, adjustment: &StockAdjustment) -> DbResult<()> {
        debug!(
            product_id = %adjustment.product_id,
            qty_delta = %adjustment.qty_delta,
            "Recording stock adjustment"
        );

        sqlx::query(
            r#"
            INSERT INTO stock_adjustments (
                id, business_id, store_id, device_id, product_id,
                qty_delta, quantity_after, reason, client_ref, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10
            )
            "#,
        )
        .bind(&adjustment.id)
        .bind(&adjustment.business_id)
        .bind(&adjustment.store_id)
        .bind(&adjustment.device_id)
        .bind(&adjustment.product_id)
        .bind(adjustment.qty_delta)
        .bind(adjustment.quantity_after)
        .bind(&adjustment.reason)
        .bind(&adjustment.client_ref)
        .bind(adjustment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Finds a recorded adjustment by its idempotency key.
    pub async fn find_adjustment_by_client_ref(
        &self,
        business_id: &str,
        client_ref: &str,
    ) -> DbResult<Option<StockAdjustment>> {
        let adjustment = sqlx::query_as::<_, StockAdjustment>(
            r#"
            SELECT
                id, business_id, store_id, device_id, product_id,
                qty_delta, quantity_after, reason, client_ref, created_at
            FROM stock_adjustments
            WHERE business_id = ?1 AND client_ref = ?2
            "#,
        )
        .bind(business_id)
        .bind(client_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(adjustment)
    }
}

/// Helper to generate a new product ID.
///
/// ## Usage
/// ```rust,ignore
/// let id = generate_product_id();
/// let product = Product { id, ... };
/// ```
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
