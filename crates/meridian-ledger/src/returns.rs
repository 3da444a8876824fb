//! # Return Slip Lifecycle
//!
//! Commit, review, and refund of customer returns.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Return Lifecycle                                 │
//! │                                                                         │
//! │  commit_return                set_return_status      mark_refunded      │
//! │  ─────────────                ────────────────       ─────────────      │
//! │                                                                         │
//! │  validate ──▶ ceiling ──▶ ┌─────────┐ ──approve──▶ ┌──────────┐ ──▶ $   │
//! │  reference    (vs sale)   │ pending │              │ approved │  once   │
//! │  unique?                  └─────────┘ ──reject───▶ ├──────────┤         │
//! │     │                      stock IN                │ rejected │         │
//! │     └─▶ DuplicateReference at creation             └──────────┘         │
//! │         (or replay when the                         ceiling slot        │
//! │          client_ref matches)                        released            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock comes back at creation, while the slip is still pending. Review
//! decides the money, not the goods: a rejected slip keeps its stock credit
//! but releases its claim against the over-return ceiling.
//!
//! The ceiling matches items to sale lines by product name snapshot, since
//! that is what survives on a printed slip from an offline till.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, error, info};
use uuid::Uuid;

use meridian_core::error::ValidationError;
use meridian_core::validation;
use meridian_core::{
    LedgerError, LedgerResult, NewReturn, ReturnCommit, ReturnItem, ReturnStatus, SaleReturn,
};

use crate::engine::LedgerEngine;

impl LedgerEngine {
    /// Commits a return slip and credits its stock back.
    ///
    /// ## Rules
    /// - The reference must be unused within the business; reusing one with
    ///   the same `client_ref` replays, with a different one refuses
    /// - Against a sale, the slip may not push any product past what the
    ///   sale actually sold, counting prior pending and approved slips
    /// - The slip enters `pending`; review moves the money later
    pub async fn commit_return(&self, ret: NewReturn) -> LedgerResult<ReturnCommit> {
        validation::validate_return(&ret)?;

        let returns = self.db.returns();
        let stock = self.db.stock();

        if let Some(prior) = returns
            .find_by_reference(&ret.business_id, &ret.reference)
            .await?
        {
            return self.resolve_reference_collision(&ret, prior).await;
        }

        if let Some(sale_id) = &ret.sale_id {
            self.check_return_ceiling(&ret, sale_id).await?;
        }

        // Resolve every item before writing anything
        let mut products = Vec::with_capacity(ret.items.len());
        for item in &ret.items {
            let product = stock
                .find_by_name(&ret.business_id, &ret.store_id, &item.name)
                .await?
                .ok_or_else(|| LedgerError::ProductNotFound(item.name.clone()))?;
            products.push(product);
        }

        let now = Utc::now();
        let return_id = Uuid::new_v4().to_string();

        let items: Vec<ReturnItem> = ret
            .items
            .iter()
            .zip(products.iter())
            .enumerate()
            .map(|(idx, (item, product))| ReturnItem {
                id: Uuid::new_v4().to_string(),
                return_id: return_id.clone(),
                product_id: product.id.clone(),
                name_snapshot: product.name.clone(),
                unit_price_cents: item.unit_price_cents,
                quantity: item.quantity,
                line_total_cents: item.line_total().cents(),
                line_no: idx as i64,
                created_at: now,
            })
            .collect();

        let record = SaleReturn {
            id: return_id,
            business_id: ret.business_id.clone(),
            store_id: ret.store_id.clone(),
            device_id: ret.device_id.clone(),
            reference: ret.reference.clone(),
            sale_id: ret.sale_id.clone(),
            client_ref: ret.client_ref.clone(),
            customer: ret.customer.clone(),
            reason: ret.reason.clone(),
            status: ReturnStatus::Pending,
            payment_method: ret.payment_method,
            subtotal_cents: ret.subtotal_cents,
            tax_cents: ret.tax_cents,
            amount_cents: ret.amount_cents,
            refunded: false,
            approved_by: None,
            return_date: ret.return_date.unwrap_or(now),
            created_at: now,
            updated_at: now,
        };

        // The unique reference index arbitrates racing slips; only the
        // winner reaches the stock credits below
        if let Err(e) = returns.insert_with_items(&record, &items).await {
            if e.is_unique_violation() {
                let prior = returns
                    .find_by_reference(&ret.business_id, &ret.reference)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::StorageUnavailable(
                            "recorded return vanished after reference collision".to_string(),
                        )
                    })?;
                return self.resolve_reference_collision(&ret, prior).await;
            }
            return Err(e.into());
        }

        for item in &items {
            if let Err(e) = stock
                .credit(&ret.business_id, &ret.store_id, &item.product_id, item.quantity)
                .await
            {
                error!(
                    return_id = %record.id,
                    product_id = %item.product_id,
                    qty = item.quantity,
                    error = %e,
                    "Return credit failed; stock requires manual correction"
                );
            }
        }

        info!(
            reference = %record.reference,
            items = items.len(),
            amount_cents = record.amount_cents,
            "Return committed"
        );

        Ok(ReturnCommit {
            sale_return: record,
            items,
            replayed: false,
        })
    }

    /// Decides whether a reference collision is a replay or a conflict.
    ///
    /// The same offline capture carries the same `client_ref`; anything
    /// else reusing the reference is a different slip and is refused.
    async fn resolve_reference_collision(
        &self,
        ret: &NewReturn,
        prior: SaleReturn,
    ) -> LedgerResult<ReturnCommit> {
        let same_capture = match (&ret.client_ref, &prior.client_ref) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => false,
        };

        if !same_capture {
            return Err(LedgerError::DuplicateReference(ret.reference.clone()));
        }

        debug!(reference = %ret.reference, return_id = %prior.id, "Return replayed");
        let items = self.db.returns().items(&prior.id).await?;
        Ok(ReturnCommit {
            sale_return: prior,
            items,
            replayed: true,
        })
    }

    /// Refuses any item that would push its product past what the sale sold.
    ///
    /// Counts prior pending and approved slips against the same sale, plus
    /// earlier items of this slip, so one request cannot sneak past the
    /// ceiling by splitting a product across two items.
    async fn check_return_ceiling(&self, ret: &NewReturn, sale_id: &str) -> LedgerResult<()> {
        let sale = self
            .db
            .sales()
            .find_by_id(&ret.business_id, sale_id)
            .await?
            .ok_or_else(|| LedgerError::SaleNotFound(sale_id.to_string()))?;

        let mut sold: HashMap<String, i64> = HashMap::new();
        for line in self.db.sales().lines(&sale.id).await? {
            *sold.entry(line.name_snapshot).or_insert(0) += line.quantity;
        }

        let prior: HashMap<String, i64> = self
            .db
            .returns()
            .returned_quantities(&sale.id)
            .await?
            .into_iter()
            .collect();

        let mut running: HashMap<&str, i64> = HashMap::new();
        for item in &ret.items {
            let requested = running.entry(item.name.as_str()).or_insert(0);
            *requested += item.quantity;

            let sold_qty = sold.get(&item.name).copied().unwrap_or(0);
            let returned = prior.get(&item.name).copied().unwrap_or(0);

            if *requested > sold_qty - returned {
                return Err(LedgerError::OverReturn {
                    name: item.name.clone(),
                    sold: sold_qty,
                    returned,
                    requested: *requested,
                });
            }
        }

        Ok(())
    }

    /// Moves a pending return to approved or rejected.
    ///
    /// ## Rules
    /// - `pending` is not a valid target; slips never go back to review
    /// - Only a pending slip can transition; anything else refuses with
    ///   its current state
    pub async fn set_return_status(
        &self,
        business_id: &str,
        return_id: &str,
        status: ReturnStatus,
        approved_by: Option<&str>,
    ) -> LedgerResult<SaleReturn> {
        if status == ReturnStatus::Pending {
            return Err(ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: "cannot transition back to pending".to_string(),
            }
            .into());
        }

        let returns = self.db.returns();

        if !returns
            .try_set_status(business_id, return_id, status, approved_by)
            .await?
        {
            let current = returns
                .find_by_id(business_id, return_id)
                .await?
                .ok_or_else(|| LedgerError::ReturnNotFound(return_id.to_string()))?;
            return Err(LedgerError::InvalidState {
                entity: "Return".to_string(),
                id: return_id.to_string(),
                state: current.status.as_str().to_string(),
            });
        }

        info!(return_id = %return_id, status = status.as_str(), "Return reviewed");

        returns
            .find_by_id(business_id, return_id)
            .await?
            .ok_or_else(|| LedgerError::ReturnNotFound(return_id.to_string()))
    }

    /// Records the refund payout for an approved return, exactly once.
    pub async fn mark_refunded(&self, business_id: &str, return_id: &str) -> LedgerResult<SaleReturn> {
        let returns = self.db.returns();

        if !returns.try_mark_refunded(business_id, return_id).await? {
            let current = returns
                .find_by_id(business_id, return_id)
                .await?
                .ok_or_else(|| LedgerError::ReturnNotFound(return_id.to_string()))?;

            let state = if current.refunded {
                "refunded".to_string()
            } else {
                current.status.as_str().to_string()
            };
            return Err(LedgerError::InvalidState {
                entity: "Return".to_string(),
                id: return_id.to_string(),
                state,
            });
        }

        info!(return_id = %return_id, "Refund recorded");

        returns
            .find_by_id(business_id, return_id)
            .await?
            .ok_or_else(|| LedgerError::ReturnNotFound(return_id.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meridian_core::{NewReturnItem, NewSale, NewSaleLine, Product};
    use meridian_db::repository::stock::generate_product_id;
    use meridian_db::{Database, DbConfig};

    const BIZ: &str = "biz-1";
    const STORE: &str = "store-1";

    async fn test_engine() -> LedgerEngine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        LedgerEngine::new(Arc::new(db))
    }

    async fn seed_product(engine: &LedgerEngine, name: &str, quantity: i64) -> String {
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
            stock_alert: 5,
            price_cents: 250,
            cost_price_cents: None,
            created_at: now,
            updated_at: now,
        };
        engine.db.stock().insert(&product).await.unwrap();
        product.id
    }

    async fn committed_sale(engine: &LedgerEngine, lines: Vec<(&str, i64)>) -> String {
        let lines: Vec<NewSaleLine> = lines
            .into_iter()
            .map(|(pid, qty)| NewSaleLine {
                product_id: pid.to_string(),
                quantity: qty,
                unit_price_cents: 250,
            })
            .collect();
        let subtotal: i64 = lines.iter().map(|l| l.line_total().cents()).sum();
        let sale = NewSale {
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
        };
        engine.commit_sale(sale).await.unwrap().sale.id
    }

    fn new_return(reference: &str, items: Vec<(&str, i64)>) -> NewReturn {
        let items: Vec<NewReturnItem> = items
            .into_iter()
            .map(|(name, qty)| NewReturnItem {
                name: name.to_string(),
                quantity: qty,
                unit_price_cents: 250,
            })
            .collect();
        let subtotal: i64 = items.iter().map(|i| i.line_total().cents()).sum();
        NewReturn {
            business_id: BIZ.to_string(),
            store_id: STORE.to_string(),
            device_id: "till-1".to_string(),
            reference: reference.to_string(),
            sale_id: None,
            client_ref: None,
            customer: "Walk-in".to_string(),
            reason: "Damaged".to_string(),
            payment_method: None,
            items,
            subtotal_cents: subtotal,
            tax_cents: 0,
            amount_cents: subtotal,
            return_date: None,
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
    async fn test_walk_in_return_credits_stock_at_creation() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10).await;

        let outcome = engine
            .commit_return(new_return("RET-001", vec![("Cola", 3)]))
            .await
            .unwrap();

        assert_eq!(outcome.sale_return.status, ReturnStatus::Pending);
        assert!(!outcome.sale_return.refunded);
        assert_eq!(outcome.items.len(), 1);
        assert!(!outcome.replayed);
        assert_eq!(quantity_of(&engine, &cola).await, 13);
    }

    #[tokio::test]
    async fn test_duplicate_reference_refused_and_credits_once() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10).await;

        engine
            .commit_return(new_return("RET-DUP", vec![("Cola", 2)]))
            .await
            .unwrap();

        let err = engine
            .commit_return(new_return("RET-DUP", vec![("Cola", 2)]))
            .await
            .unwrap_err();
        match err {
            LedgerError::DuplicateReference(reference) => assert_eq!(reference, "RET-DUP"),
            other => panic!("expected DuplicateReference, got {other:?}"),
        }

        assert_eq!(quantity_of(&engine, &cola).await, 12);
    }

    #[tokio::test]
    async fn test_same_capture_replays_instead_of_conflicting() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10).await;

        let mut slip = new_return("RET-OFF", vec![("Cola", 2)]);
        slip.client_ref = Some("capture-9".to_string());

        let first = engine.commit_return(slip.clone()).await.unwrap();
        assert!(!first.replayed);

        let second = engine.commit_return(slip).await.unwrap();
        assert!(second.replayed);
        assert_eq!(second.sale_return.id, first.sale_return.id);
        assert_eq!(second.items.len(), 1);

        // Stock credited exactly once
        assert_eq!(quantity_of(&engine, &cola).await, 12);
    }

    #[tokio::test]
    async fn test_over_return_across_slips_refused() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10).await;
        let sale_id = committed_sale(&engine, vec![(&cola, 3)]).await;

        let mut first = new_return("RET-A", vec![("Cola", 2)]);
        first.sale_id = Some(sale_id.clone());
        engine.commit_return(first).await.unwrap();

        let mut second = new_return("RET-B", vec![("Cola", 2)]);
        second.sale_id = Some(sale_id.clone());
        let err = engine.commit_return(second).await.unwrap_err();

        match err {
            LedgerError::OverReturn {
                name,
                sold,
                returned,
                requested,
            } => {
                assert_eq!(name, "Cola");
                assert_eq!(sold, 3);
                assert_eq!(returned, 2);
                assert_eq!(requested, 2);
            }
            other => panic!("expected OverReturn, got {other:?}"),
        }

        // Refused slip must not touch stock (sale took 3, slip put 2 back)
        assert_eq!(quantity_of(&engine, &cola).await, 9);
    }

    #[tokio::test]
    async fn test_over_return_within_one_slip_refused() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10).await;
        let sale_id = committed_sale(&engine, vec![(&cola, 3)]).await;

        // Two items of the same product must count together
        let mut slip = new_return("RET-SPLIT", vec![("Cola", 2), ("Cola", 2)]);
        slip.sale_id = Some(sale_id);
        let err = engine.commit_return(slip).await.unwrap_err();

        match err {
            LedgerError::OverReturn { requested, .. } => assert_eq!(requested, 4),
            other => panic!("expected OverReturn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_item_not_on_sale_refused() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10).await;
        seed_product(&engine, "Chips", 10).await;
        let sale_id = committed_sale(&engine, vec![(&cola, 3)]).await;

        let mut slip = new_return("RET-X", vec![("Chips", 1)]);
        slip.sale_id = Some(sale_id);
        let err = engine.commit_return(slip).await.unwrap_err();

        match err {
            LedgerError::OverReturn { name, sold, .. } => {
                assert_eq!(name, "Chips");
                assert_eq!(sold, 0);
            }
            other => panic!("expected OverReturn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_slip_releases_ceiling() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10).await;
        let sale_id = committed_sale(&engine, vec![(&cola, 3)]).await;

        let mut first = new_return("RET-R1", vec![("Cola", 3)]);
        first.sale_id = Some(sale_id.clone());
        let first = engine.commit_return(first).await.unwrap();

        engine
            .set_return_status(BIZ, &first.sale_return.id, ReturnStatus::Rejected, Some("mgr"))
            .await
            .unwrap();

        // The rejected slip no longer occupies the ceiling
        let mut second = new_return("RET-R2", vec![("Cola", 3)]);
        second.sale_id = Some(sale_id);
        assert!(engine.commit_return(second).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_item_name_writes_nothing() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10).await;

        let err = engine
            .commit_return(new_return("RET-GHOST", vec![("Cola", 1), ("Ghost", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ProductNotFound(_)));

        // Neither item credited, no slip recorded
        assert_eq!(quantity_of(&engine, &cola).await, 10);
        assert!(engine
            .db
            .returns()
            .find_by_reference(BIZ, "RET-GHOST")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_approval_does_not_move_stock_again() {
        let engine = test_engine().await;
        let cola = seed_product(&engine, "Cola", 10).await;

        let outcome = engine
            .commit_return(new_return("RET-APPR", vec![("Cola", 2)]))
            .await
            .unwrap();
        assert_eq!(quantity_of(&engine, &cola).await, 12);

        let approved = engine
            .set_return_status(BIZ, &outcome.sale_return.id, ReturnStatus::Approved, Some("mgr"))
            .await
            .unwrap();
        assert_eq!(approved.status, ReturnStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("mgr"));
        assert_eq!(quantity_of(&engine, &cola).await, 12);
    }

    #[tokio::test]
    async fn test_pending_is_not_a_valid_target() {
        let engine = test_engine().await;
        seed_product(&engine, "Cola", 10).await;

        let outcome = engine
            .commit_return(new_return("RET-P", vec![("Cola", 1)]))
            .await
            .unwrap();

        let err = engine
            .set_return_status(BIZ, &outcome.sale_return.id, ReturnStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_review_applies_once() {
        let engine = test_engine().await;
        seed_product(&engine, "Cola", 10).await;

        let outcome = engine
            .commit_return(new_return("RET-TWICE", vec![("Cola", 1)]))
            .await
            .unwrap();
        let id = outcome.sale_return.id;

        engine
            .set_return_status(BIZ, &id, ReturnStatus::Approved, Some("mgr"))
            .await
            .unwrap();

        let err = engine
            .set_return_status(BIZ, &id, ReturnStatus::Rejected, Some("mgr"))
            .await
            .unwrap_err();
        match err {
            LedgerError::InvalidState { entity, state, .. } => {
                assert_eq!(entity, "Return");
                assert_eq!(state, "approved");
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refund_only_from_approved_and_once() {
        let engine = test_engine().await;
        seed_product(&engine, "Cola", 10).await;

        let outcome = engine
            .commit_return(new_return("RET-PAY", vec![("Cola", 1)]))
            .await
            .unwrap();
        let id = outcome.sale_return.id;

        // Pending: refused with the current state
        let err = engine.mark_refunded(BIZ, &id).await.unwrap_err();
        match &err {
            LedgerError::InvalidState { state, .. } => assert_eq!(state, "pending"),
            other => panic!("expected InvalidState, got {other:?}"),
        }

        engine
            .set_return_status(BIZ, &id, ReturnStatus::Approved, Some("mgr"))
            .await
            .unwrap();

        let refunded = engine.mark_refunded(BIZ, &id).await.unwrap();
        assert!(refunded.refunded);

        // Second payout refused
        let err = engine.mark_refunded(BIZ, &id).await.unwrap_err();
        match err {
            LedgerError::InvalidState { state, .. } => assert_eq!(state, "refunded"),
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_return_reported_as_not_found() {
        let engine = test_engine().await;

        let err = engine
            .set_return_status(BIZ, "no-such-return", ReturnStatus::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ReturnNotFound(_)));

        let err = engine.mark_refunded(BIZ, "no-such-return").await.unwrap_err();
        assert!(matches!(err, LedgerError::ReturnNotFound(_)));
    }
}
