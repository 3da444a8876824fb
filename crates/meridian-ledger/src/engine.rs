//! # Ledger Engine
//!
//! Construction, the per-store drain locks, and manual stock adjustments.
//!
//! ## Adjustment Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      apply_adjustment Flow                              │
//! │                                                                         │
//! │  validate ──▶ resolve product ──▶ replay check ──▶ move stock ──▶ audit │
//! │                 (name for errors)   (client_ref)     (debit or    row   │
//! │                                                       credit)           │
//! │                                                                         │
//! │  The movement and the audit row are two statements. If the audit        │
//! │  insert loses a client_ref race, the movement is undone and the         │
//! │  previously recorded adjustment wins.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Drain Locks
//! `process_queue` must not run twice for the same store at once, or two
//! drains would race each other through the same pending entries. The engine
//! keeps one async mutex per (business, store), created on first use.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use meridian_core::validation;
use meridian_core::{AdjustmentOutcome, LedgerError, LedgerResult, NewAdjustment, StockAdjustment};
use meridian_db::{Database, DebitOutcome};

/// The single writer of product stock.
///
/// Holds the database handle and the per-store drain locks. Cheap to share
/// behind an `Arc`; every operation takes `&self`.
pub struct LedgerEngine {
    /// Database connection.
    pub(crate) db: Arc<Database>,

    /// One lock per (business_id, store_id), created on first use.
    store_locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl LedgerEngine {
    /// Creates a new engine over an open database.
    pub fn new(db: Arc<Database>) -> Self {
        LedgerEngine {
            db,
            store_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Gets (or creates) the drain lock for one store.
    ///
    /// The registry mutex is held only long enough to clone the inner
    /// `Arc`; callers await the store lock outside it.
    pub(crate) async fn store_lock(&self, business_id: &str, store_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.store_locks.lock().await;
        locks
            .entry((business_id.to_string(), store_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Applies a manual stock adjustment and records its audit row.
    ///
    /// ## Rules
    /// - `qty_delta` must be non-zero; negative debits, positive credits
    /// - A negative delta larger than the stock on hand is refused
    /// - A `client_ref` seen before replays: stock moves once, the recorded
    ///   adjustment is handed back with `replayed = true`
    ///
    /// ## Returns
    /// The post-movement stock level, so callers can surface a low-stock
    /// warning without a second read.
    pub async fn apply_adjustment(&self, adj: NewAdjustment) -> LedgerResult<AdjustmentOutcome> {
        validation::validate_adjustment(&adj)?;

        let stock = self.db.stock();

        // Resolve up front so shortfall errors carry the product name
        let product = stock
            .find_by_id(&adj.business_id, &adj.store_id, &adj.product_id)
            .await?
            .ok_or_else(|| LedgerError::ProductNotFound(adj.product_id.clone()))?;

        // Offline captures carry their own ref; live calls get a fresh one
        let client_ref = adj
            .client_ref
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if adj.client_ref.is_some() {
            if let Some(prior) = stock
                .find_adjustment_by_client_ref(&adj.business_id, &client_ref)
                .await?
            {
                debug!(client_ref = %client_ref, id = %prior.id, "Adjustment replayed");
                return self.replayed_outcome(&adj).await;
            }
        }

        let level = if adj.qty_delta < 0 {
            let requested = -adj.qty_delta;
            match stock
                .debit(&adj.business_id, &adj.store_id, &adj.product_id, requested)
                .await?
            {
                DebitOutcome::Applied(level) => level,
                DebitOutcome::Insufficient { available } => {
                    return Err(LedgerError::InsufficientStock {
                        name: product.name,
                        available,
                        requested,
                    });
                }
            }
        } else {
            stock
                .credit(&adj.business_id, &adj.store_id, &adj.product_id, adj.qty_delta)
                .await?
        };

        let record = StockAdjustment {
            id: Uuid::new_v4().to_string(),
            business_id: adj.business_id.clone(),
            store_id: adj.store_id.clone(),
            device_id: adj.device_id.clone(),
            product_id: adj.product_id.clone(),
            qty_delta: adj.qty_delta,
            quantity_after: level.quantity,
            reason: adj.reason.clone(),
            client_ref: client_ref.clone(),
            created_at: Utc::now(),
        };

        if let Err(e) = stock.insert_adjustment(&record).await {
            if e.is_unique_violation() {
                // Same capture landed on another path first. Undo our
                // movement; the recorded adjustment wins.
                self.undo_movement(&adj).await;
                debug!(client_ref = %client_ref, "Adjustment lost client_ref race, replaying");
                return self.replayed_outcome(&adj).await;
            }
            return Err(e.into());
        }

        debug!(
            product_id = %adj.product_id,
            qty_delta = adj.qty_delta,
            quantity_after = level.quantity,
            "Adjustment applied"
        );

        Ok(AdjustmentOutcome {
            level,
            replayed: false,
        })
    }

    /// Reverses the stock movement of an adjustment that lost its race.
    ///
    /// Best-effort: a failed undo is logged, not propagated; the caller is
    /// already on the replay path and hands back the recorded adjustment
    /// either way.
    async fn undo_movement(&self, adj: &NewAdjustment) {
        let stock = self.db.stock();
        let qty = adj.qty_delta.abs();

        let result = if adj.qty_delta < 0 {
            stock
                .credit(&adj.business_id, &adj.store_id, &adj.product_id, qty)
                .await
                .map(|_| ())
        } else {
            match stock
                .debit(&adj.business_id, &adj.store_id, &adj.product_id, qty)
                .await
            {
                Ok(DebitOutcome::Applied(_)) => Ok(()),
                Ok(DebitOutcome::Insufficient { available }) => {
                    warn!(
                        product_id = %adj.product_id,
                        qty,
                        available,
                        "Undo debit short; stock consumed since the credit"
                    );
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };

        if let Err(e) = result {
            warn!(product_id = %adj.product_id, error = %e, "Failed to undo adjustment movement");
        }
    }

    /// Builds the replay outcome: current level, `replayed = true`.
    async fn replayed_outcome(&self, adj: &NewAdjustment) -> LedgerResult<AdjustmentOutcome> {
        let level = self
            .db
            .stock()
            .find_by_id(&adj.business_id, &adj.store_id, &adj.product_id)
            .await?
            .ok_or_else(|| LedgerError::ProductNotFound(adj.product_id.clone()))?
            .stock_level();

        Ok(AdjustmentOutcome {
            level,
            replayed: true,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
