//! # Offline Capture & Reconciliation Drain
//!
//! Tills keep selling when the backend is unreachable. Each document they
//! capture lands in the sync queue as a JSON payload; the drain replays
//! them through the ledger once storage is back.
//!
//! ## Drain Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       process_queue Flow                                │
//! │                                                                         │
//! │  acquire store lock ──▶ read pending (oldest first) ──▶ per entry:      │
//! │                                                                         │
//! │    ┌──────────────────────────────────────────────────────────────┐     │
//! │    │ decode payload ─▶ check context ─▶ replay through ledger     │     │
//! │    │                                                              │     │
//! │    │   Ok ───────────────────▶ mark synced                        │     │
//! │    │   Err (rule violation) ─▶ mark failed, keep reason, go on    │     │
//! │    │   Err (storage) ────────▶ STOP; this and the rest stay       │     │
//! │    │                           pending for the next drain         │     │
//! │    └──────────────────────────────────────────────────────────────┘     │
//! │                                                                         │
//! │  One bad capture never blocks the queue behind it; a dead disk          │
//! │  never turns captures into failures.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries default their `client_ref` to the queue entry id, so a drain
//! that crashes between committing a document and settling its entry
//! replays harmlessly on the next run.

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use meridian_core::error::ValidationError;
use meridian_core::validation;
use meridian_core::{
    LedgerResult, NewAdjustment, NewQueueEntry, NewReturn, NewSale, QueueReport, SyncDataType,
    SyncQueueEntry,
};

use crate::engine::LedgerEngine;

impl LedgerEngine {
    /// Accepts a document captured offline into the durable queue.
    ///
    /// The payload must be well-formed JSON; its shape is checked at drain
    /// time against the entry's `data_type`.
    pub async fn enqueue_offline(&self, entry: NewQueueEntry) -> LedgerResult<SyncQueueEntry> {
        validation::validate_queue_entry(&entry)?;

        let id = Uuid::new_v4().to_string();
        let stored = self.db.sync_queue().enqueue(&id, &entry).await?;

        info!(
            seq = stored.seq,
            data_type = stored.data_type.as_str(),
            "Offline capture queued"
        );

        Ok(stored)
    }

    /// Drains every pending entry for one store, oldest first.
    ///
    /// ## Rules
    /// - One drain per store at a time; a second caller waits
    /// - Each entry settles independently: a rule violation fails that
    ///   entry with its reason and the drain continues
    /// - A storage failure stops the drain; unsettled entries stay pending
    ///
    /// ## Returns
    /// How many entries settled as synced (replays included) and failed.
    pub async fn process_queue(
        &self,
        business_id: &str,
        store_id: &str,
    ) -> LedgerResult<QueueReport> {
        let lock = self.store_lock(business_id, store_id).await;
        let _guard = lock.lock().await;

        let queue = self.db.sync_queue();
        let entries = queue.pending(business_id, store_id).await?;

        if entries.is_empty() {
            debug!(business_id = %business_id, store_id = %store_id, "Queue empty");
            return Ok(QueueReport::default());
        }

        info!(count = entries.len(), store_id = %store_id, "Draining offline queue");

        let mut report = QueueReport::default();
        for entry in &entries {
            match self.dispatch_entry(entry).await {
                Ok(()) => {
                    queue.try_mark_synced(&entry.id).await?;
                    report.synced += 1;
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        entry_id = %entry.id,
                        seq = entry.seq,
                        error = %e,
                        "Drain stopped; entry left pending"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let reason = e.to_string();
                    warn!(entry_id = %entry.id, seq = entry.seq, error = %reason, "Entry rejected");
                    queue.try_mark_failed(&entry.id, &reason).await?;
                    report.failed += 1;
                }
            }
        }

        info!(
            synced = report.synced,
            failed = report.failed,
            store_id = %store_id,
            "Drain complete"
        );

        Ok(report)
    }

    /// Replays one queue entry through the matching ledger operation.
    async fn dispatch_entry(&self, entry: &SyncQueueEntry) -> LedgerResult<()> {
        match entry.data_type {
            SyncDataType::Sale => {
                let mut sale: NewSale = decode_payload(&entry.payload)?;
                check_context(entry, &sale.business_id, &sale.store_id)?;
                if sale.client_ref.is_none() {
                    sale.client_ref = Some(entry.id.clone());
                }
                self.commit_sale(sale).await.map(|_| ())
            }
            SyncDataType::Return => {
                let mut ret: NewReturn = decode_payload(&entry.payload)?;
                check_context(entry, &ret.business_id, &ret.store_id)?;
                if ret.client_ref.is_none() {
                    ret.client_ref = Some(entry.id.clone());
                }
                self.commit_return(ret).await.map(|_| ())
            }
            SyncDataType::Adjustment => {
                let mut adj: NewAdjustment = decode_payload(&entry.payload)?;
                check_context(entry, &adj.business_id, &adj.store_id)?;
                if adj.client_ref.is_none() {
                    adj.client_ref = Some(entry.id.clone());
                }
                self.apply_adjustment(adj).await.map(|_| ())
            }
        }
    }
}

/// Decodes a queue payload into the expected document shape.
fn decode_payload<T: DeserializeOwned>(payload: &str) -> LedgerResult<T> {
    serde_json::from_str(payload).map_err(|e| {
        ValidationError::InvalidFormat {
            field: "payload".to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// A payload claiming another store is a capture bug, not a replay target.
fn check_context(entry: &SyncQueueEntry, business_id: &str, store_id: &str) -> LedgerResult<()> {
    if entry.business_id != business_id || entry.store_id != store_id {
        return Err(ValidationError::InvalidFormat {
            field: "payload".to_string(),
            reason: format!(
                "payload addresses {}/{} but the entry was captured for {}/{}",
                business_id, store_id, entry.business_id, entry.store_id
            ),
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
