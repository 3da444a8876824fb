//! # Sale Commit & Cancellation
//!
//! The all-or-nothing path from a terminal basket to a recorded sale.
//!
//! ## Commit Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        commit_sale Flow                                 │
//! │                                                                         │
//! │  1. Validate      totals identity, line bounds (no stock touched yet)   │
//! │  2. Replay check  client_ref already recorded? hand that sale back      │
//! │  3. Resolve       every product must exist before the first debit       │
//! │  4. Number        take the next receipt number for the store            │
//! │  5. Debit         one conditional debit per line, collecting warnings   │
//! │        │                                                                │
//! │        ├── line short ──▶ credit applied lines in REVERSE order,        │
//! │        │                  refuse with the shortfall                     │
//! │        ▼                                                                │
//! │  6. Persist       sale + lines in one database transaction              │
//! │        │                                                                │
//! │        ├── client_ref collision ──▶ credit everything back, the         │
//! │        │                            recorded sale wins (replay)         │
//! │        ▼                                                                │
//! │  7. Return        SaleCommit { sale, lines, low_stock, replayed }       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Debits happen line by line, so a shortfall midway leaves earlier lines
//! already applied. The compensating credits put them back before the error
//! surfaces. Stock rows other sales touched in between are never disturbed,
//! because each credit targets exactly the quantity this commit took.

use chrono::Utc;
use tracing::{debug, error, info};
use uuid::Uuid;

use meridian_core::validation;
use meridian_core::{
    LedgerError, LedgerResult, LowStockWarning, NewSale, NewSaleLine, Sale, SaleCommit, SaleLine,
    SaleStatus,
};
use meridian_db::DebitOutcome;

use crate::engine::LedgerEngine;

impl LedgerEngine {
    /// Commits a sale: debits every line or none, then records the document.
    ///
    /// ## Rules
    /// - `subtotal - discount + tax` must equal `total`, or the commit is
    ///   refused before any stock moves
    /// - Any line short on stock refuses the whole sale and restores the
    ///   lines already debited
    /// - A `client_ref` seen before replays: the recorded sale is handed
    ///   back with `replayed = true` and no stock moves
    ///
    /// ## Returns
    /// The recorded sale, its lines, and a warning for every product this
    /// commit left at or below its alert threshold.
    pub async fn commit_sale(&self, sale: NewSale) -> LedgerResult<SaleCommit> {
        validation::validate_sale(&sale)?;

        let sales = self.db.sales();
        let stock = self.db.stock();

        let client_ref = sale
            .client_ref
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if sale.client_ref.is_some() {
            if let Some(prior) = sales.find_by_client_ref(&sale.business_id, &client_ref).await? {
                debug!(client_ref = %client_ref, sale_id = %prior.id, "Sale replayed");
                let lines = sales.lines(&prior.id).await?;
                return Ok(SaleCommit {
                    sale: prior,
                    lines,
                    low_stock: Vec::new(),
                    replayed: true,
                });
            }
        }

        // Resolve every product before touching stock, so an unknown id on
        // line 3 never leaves lines 1 and 2 debited
        let mut products = Vec::with_capacity(sale.lines.len());
        for line in &sale.lines {
            let product = stock
                .find_by_id(&sale.business_id, &sale.store_id, &line.product_id)
                .await?
                .ok_or_else(|| LedgerError::ProductNotFound(line.product_id.clone()))?;
            products.push(product);
        }

        // Receipt numbers are taken before the debits; a commit that fails
        // past this point burns a number, which receipts tolerate
        let sale_number = self
            .db
            .counters()
            .next_sale_number(&sale.business_id, &sale.store_id)
            .await?;

        let mut applied: Vec<&NewSaleLine> = Vec::with_capacity(sale.lines.len());
        let mut low_stock: Vec<LowStockWarning> = Vec::new();

        for (idx, line) in sale.lines.iter().enumerate() {
            match stock
                .debit(&sale.business_id, &sale.store_id, &line.product_id, line.quantity)
                .await
            {
                Ok(DebitOutcome::Applied(level)) => {
                    if level.below_alert() {
                        low_stock.push(LowStockWarning::from(level));
                    }
                    applied.push(line);
                }
                Ok(DebitOutcome::Insufficient { available }) => {
                    self.compensate_debits(&sale.business_id, &sale.store_id, &applied)
                        .await;
                    return Err(LedgerError::InsufficientStock {
                        name: products[idx].name.clone(),
                        available,
                        requested: line.quantity,
                    });
                }
                Err(e) => {
                    self.compensate_debits(&sale.business_id, &sale.store_id, &applied)
                        .await;
                    return Err(e.into());
                }
            }
        }

        let now = Utc::now();
        let sale_id = Uuid::new_v4().to_string();

        let rows: Vec<SaleLine> = sale
            .lines
            .iter()
            .zip(products.iter())
            .enumerate()
            .map(|(idx, (line, product))| SaleLine {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                product_id: line.product_id.clone(),
                name_snapshot: product.name.clone(),
                unit_price_cents: line.unit_price_cents,
                quantity: line.quantity,
                line_total_cents: line.line_total().cents(),
                line_no: idx as i64,
                created_at: now,
            })
            .collect();

        let record = Sale {
            id: sale_id,
            business_id: sale.business_id.clone(),
            store_id: sale.store_id.clone(),
            device_id: sale.device_id.clone(),
            sale_number,
            client_ref: client_ref.clone(),
            status: SaleStatus::Completed,
            customer_id: sale.customer_id.clone(),
            customer_name: sale.customer_name.clone(),
            biller_name: sale.biller_name.clone(),
            payment_method: sale.payment_method,
            subtotal_cents: sale.subtotal_cents,
            discount_cents: sale.discount_cents,
            tax_cents: sale.tax_cents,
            total_cents: sale.total_cents,
            note: sale.note.clone(),
            sale_date: sale.sale_date.unwrap_or(now),
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        };

        if let Err(e) = sales.insert_with_lines(&record, &rows).await {
            let all: Vec<&NewSaleLine> = sale.lines.iter().collect();
            self.compensate_debits(&sale.business_id, &sale.store_id, &all)
                .await;

            if e.is_unique_violation() {
                // Same capture committed on another path between our replay
                // check and this insert; the recorded sale wins
                debug!(client_ref = %client_ref, "Sale lost client_ref race, replaying");
                let winner = sales
                    .find_by_client_ref(&sale.business_id, &client_ref)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::StorageUnavailable(
                            "recorded sale vanished after client_ref collision".to_string(),
                        )
                    })?;
                let lines = sales.lines(&winner.id).await?;
                return Ok(SaleCommit {
                    sale: winner,
                    lines,
                    low_stock: Vec::new(),
                    replayed: true,
                });
            }

            return Err(e.into());
        }

        info!(
            sale_number = %record.sale_number,
            lines = rows.len(),
            total_cents = record.total_cents,
            low_stock = low_stock.len(),
            "Sale committed"
        );

        Ok(SaleCommit {
            sale: record,
            lines: rows,
            low_stock,
            replayed: false,
        })
    }

    /// Cancels a completed sale and puts its stock back.
    ///
    /// ## Rules
    /// - A sale with any return slip against it (even a rejected one)
    ///   cannot be cancelled
    /// - Cancelling twice refuses with the sale's current state
    ///
    /// Two racing cancels resolve through a conditional flip in the
    /// database, so the restock runs exactly once.
    pub async fn cancel_sale(&self, business_id: &str, sale_id: &str) -> LedgerResult<Sale> {
        let sales = self.db.sales();

        let sale = sales
            .find_by_id(business_id, sale_id)
            .await?
            .ok_or_else(|| LedgerError::SaleNotFound(sale_id.to_string()))?;

        if sale.status == SaleStatus::Cancelled {
            return Err(LedgerError::InvalidState {
                entity: "Sale".to_string(),
                id: sale_id.to_string(),
                state: "cancelled".to_string(),
            });
        }

        if self.db.returns().exists_for_sale(sale_id).await? {
            return Err(LedgerError::ConflictingReturn(sale_id.to_string()));
        }

        if !sales.try_mark_cancelled(business_id, sale_id).await? {
            // Lost to a concurrent cancel; only that path restocks
            return Err(LedgerError::InvalidState {
                entity: "Sale".to_string(),
                id: sale_id.to_string(),
                state: "cancelled".to_string(),
            });
        }

        let lines = sales.lines(sale_id).await?;
        for line in lines.iter().rev() {
            if let Err(e) = self
                .db
                .stock()
                .credit(business_id, &sale.store_id, &line.product_id, line.quantity)
                .await
            {
                error!(
                    sale_id = %sale_id,
                    product_id = %line.product_id,
                    qty = line.quantity,
                    error = %e,
                    "Restock credit failed; stock requires manual correction"
                );
            }
        }

        info!(sale_id = %sale_id, lines = lines.len(), "Sale cancelled");

        sales
            .find_by_id(business_id, sale_id)
            .await?
            .ok_or_else(|| LedgerError::SaleNotFound(sale_id.to_string()))
    }

    /// Credits already-debited lines back, newest first.
    ///
    /// Best-effort: a credit that fails is logged and the remaining lines
    /// are still restored.
    pub(crate) async fn compensate_debits(
        &self,
        business_id: &str,
        store_id: &str,
        applied: &[&NewSaleLine],
    ) {
        for line in applied.iter().rev() {
            if let Err(e) = self
                .db
                .stock()
                .credit(business_id, store_id, &line.product_id, line.quantity)
                .await
            {
                error!(
                    product_id = %line.product_id,
                    qty = line.quantity,
                    error = %e,
                    "Compensating credit failed; stock requires manual correction"
                );
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meridian_core::{NewReturn, NewReturnItem, Product};
    use meridian_db::repository::stock::generate_product_id;
    use meridian_db::{Database, DbConfig};

    const BIZ: &str = "biz-1";
    const STORE: &str = "store-1";

    async fn test_engine() -> LedgerEngine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        LedgerEngine::new(Arc::new(db))
    }

    async fn seed_product(engine: &LedgerEngine, name: &str, quantity: i64, alert: i64) -> String {
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
            quantity,
            stock_alert: alert,
            price_cents: 250,
            cost_price_cents: None,
            created_at: now,
            updated_at: now,
        };
        engine.db.stock().insert(&product).await.unwrap();
        product.id
    }

    fn new_sale(lines: Vec<(&str, i64, i64)>) -> NewSale {
        let lines: Vec<NewSaleLine> = lines
            .into_iter()
            .map(|(pid, qty, price)| NewSaleLine {
                product_id: pid.to_string(),
                quantity: qty,
                unit_price_cents: price,
            })
            .collect();
        let subtotal: i64 = lines.iter().map(|l| l.line_total().cents()).sum();
        NewSale {
            business_id: BIZ.to_string(),
            store_id: STORE.to_string(),
            device_id: "till-1".to_string(),
            client_ref: None,
            biller_name: "Amira".to_string(),
            customer_id: None,
            customer_name: None,
            payment_method: None,
            lines,
            subtotal_cents: subtotal,
            discount_cents: 0,
            tax_cents: 0,
            total_cents: subtotal,
            note: None,
            sale_date: None,
        }
    }

    async fn quantity_of(engine: &LedgerEngine, product_id: &str) -> i64 {
        engine
            .db
            .stock()
            .find_by_id(BIZ, STORE, product_id)
            .await
            .unwrap()
            .unwrap()
            .quantity
    }

    #[tokio::test]
    async fn test_commit_debits_stock_and_numbers_receipt() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10, 3).await;
        let chips = seed_product(&engine, "Chips", 20, 3).await;

        let outcome = engine
            .commit_sale(new_sale(vec![(&cola, 2, 250), (&chips, 3, 150)]))
            .await
            .unwrap();

        assert_eq!(outcome.sale.sale_number, "S-000001");
        assert_eq!(outcome.sale.status, SaleStatus::Completed);
        assert_eq!(outcome.sale.total_cents, 2 * 250 + 3 * 150);
        assert_eq!(outcome.lines.len(), 2);
        assert_eq!(outcome.lines[0].line_no, 0);
        assert_eq!(outcome.lines[0].name_snapshot, "Cola");
        assert!(!outcome.replayed);
        assert!(outcome.low_stock.is_empty());

        assert_eq!(quantity_of(&engine, &cola).await, 8);
        assert_eq!(quantity_of(&engine, &chips).await, 17);

        let next = engine
            .commit_sale(new_sale(vec![(&cola, 1, 250)]))
            .await
            .unwrap();
        assert_eq!(next.sale.sale_number, "S-000002");
    }

    #[tokio::test]
    async fn test_totals_mismatch_refused_before_stock_moves() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10, 3).await;

        let mut sale = new_sale(vec![(&cola, 2, 250)]);
        sale.total_cents += 1;

        let err = engine.commit_sale(sale).await.unwrap_err();
        assert!(matches!(err, LedgerError::TotalsMismatch { .. }));
        assert_eq!(quantity_of(&engine, &cola).await, 10);
    }

    #[tokio::test]
    async fn test_short_line_rolls_back_earlier_lines() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10, 3).await;
        let chips = seed_product(&engine, "Chips", 1, 0).await;

        let err = engine
            .commit_sale(new_sale(vec![(&cola, 2, 250), (&chips, 5, 150)]))
            .await
            .unwrap_err();

        match err {
            LedgerError::InsufficientStock {
                name,
                available,
                requested,
            } => {
                assert_eq!(name, "Chips");
                assert_eq!(available, 1);
                assert_eq!(requested, 5);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // The cola debit must have been credited back
        assert_eq!(quantity_of(&engine, &cola).await, 10);
        assert_eq!(quantity_of(&engine, &chips).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_product_refused_before_any_debit() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10, 3).await;
        let ghost = generate_product_id();

        let err = engine
            .commit_sale(new_sale(vec![(&cola, 2, 250), (&ghost, 1, 100)]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ProductNotFound(_)));
        assert_eq!(quantity_of(&engine, &cola).await, 10);
    }

    #[tokio::test]
    async fn test_low_stock_warnings_on_crossing_threshold() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 5, 3).await;
        let chips = seed_product(&engine, "Chips", 50, 3).await;

        let outcome = engine
            .commit_sale(new_sale(vec![(&cola, 2, 250), (&chips, 1, 150)]))
            .await
            .unwrap();

        assert_eq!(outcome.low_stock.len(), 1);
        assert_eq!(outcome.low_stock[0].name, "Cola");
        assert_eq!(outcome.low_stock[0].quantity, 3);
        assert_eq!(outcome.low_stock[0].stock_alert, 3);
    }

    #[tokio::test]
    async fn test_debit_to_zero_is_allowed() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 2, 0).await;

        let outcome = engine
            .commit_sale(new_sale(vec![(&cola, 2, 250)]))
            .await
            .unwrap();
        assert_eq!(outcome.low_stock[0].quantity, 0);
        assert_eq!(quantity_of(&engine, &cola).await, 0);
    }

    #[tokio::test]
    async fn test_same_client_ref_commits_once() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10, 3).await;

        let mut sale = new_sale(vec![(&cola, 2, 250)]);
        sale.client_ref = Some("capture-7".to_string());

        let first = engine.commit_sale(sale.clone()).await.unwrap();
        assert!(!first.replayed);

        let second = engine.commit_sale(sale).await.unwrap();
        assert!(second.replayed);
        assert_eq!(second.sale.id, first.sale.id);
        assert_eq!(second.sale.sale_number, first.sale.sale_number);
        assert_eq!(second.lines.len(), 1);

        // Stock moved exactly once
        assert_eq!(quantity_of(&engine, &cola).await, 8);
    }

    #[tokio::test]
    async fn test_concurrent_commits_never_oversell() {
        // In-memory SQLite is single-connection; real concurrency needs a file
        let config = DbConfig::temp_file();
        let path = config.database_path.clone();
        let db = Database::new(config).await.unwrap();
        let engine = Arc::new(LedgerEngine::new(Arc::new(db)));
        let cola = seed_product(&engine, "Cola", 5, 0).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = Arc::clone(&engine);
            let cola = cola.clone();
            handles.push(tokio::spawn(async move {
                engine.commit_sale(new_sale(vec![(&cola, 1, 250)])).await
            }));
        }

        let mut ok = 0;
        let mut short = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(LedgerError::InsufficientStock { .. }) => short += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(ok, 5);
        assert_eq!(short, 5);
        assert_eq!(quantity_of(&engine, &cola).await, 0);

        engine.db.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10, 3).await;
        let chips = seed_product(&engine, "Chips", 20, 3).await;

        let outcome = engine
            .commit_sale(new_sale(vec![(&cola, 2, 250), (&chips, 3, 150)]))
            .await
            .unwrap();

        let cancelled = engine
            .cancel_sale(BIZ, &outcome.sale.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, SaleStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());

        assert_eq!(quantity_of(&engine, &cola).await, 10);
        assert_eq!(quantity_of(&engine, &chips).await, 20);
    }

    #[tokio::test]
    async fn test_cancel_twice_refused() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10, 3).await;

        let outcome = engine
            .commit_sale(new_sale(vec![(&cola, 2, 250)]))
            .await
            .unwrap();
        engine.cancel_sale(BIZ, &outcome.sale.id).await.unwrap();

        let err = engine
            .cancel_sale(BIZ, &outcome.sale.id)
            .await
            .unwrap_err();
        match err {
            LedgerError::InvalidState { entity, state, .. } => {
                assert_eq!(entity, "Sale");
                assert_eq!(state, "cancelled");
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }

        // The second cancel must not restock again
        assert_eq!(quantity_of(&engine, &cola).await, 10);
    }

    #[tokio::test]
    async fn test_cancel_refused_once_a_return_exists() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10, 3).await;

        let outcome = engine
            .commit_sale(new_sale(vec![(&cola, 4, 250)]))
            .await
            .unwrap();
        let sale_id = outcome.sale.id;

        let slip = NewReturn {
            business_id: BIZ.to_string(),
            store_id: STORE.to_string(),
            device_id: "till-1".to_string(),
            reference: "RET-CXL".to_string(),
            sale_id: Some(sale_id.clone()),
            client_ref: None,
            customer: "Walk-in".to_string(),
            reason: "Damaged".to_string(),
            payment_method: None,
            items: vec![NewReturnItem {
                name: "Cola".to_string(),
                quantity: 1,
                unit_price_cents: 250,
            }],
            subtotal_cents: 250,
            tax_cents: 0,
            amount_cents: 250,
            return_date: None,
        };
        engine.commit_return(slip).await.unwrap();
        assert_eq!(quantity_of(&engine, &cola).await, 7);

        let err = engine.cancel_sale(BIZ, &sale_id).await.unwrap_err();
        assert!(matches!(err, LedgerError::ConflictingReturn(_)));

        // Refused cancel moves nothing and the sale stays completed
        assert_eq!(quantity_of(&engine, &cola).await, 7);
        let sale = engine
            .db
            .sales()
            .find_by_id(BIZ, &sale_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sale.status, SaleStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_unknown_sale_refused() {
        let engine = test_engine().await;
        let err = engine
            .cancel_sale(BIZ, "no-such-sale")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SaleNotFound(_)));
    }
}
