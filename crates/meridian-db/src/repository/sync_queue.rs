//! # Sync Queue Repository
//!
//! Durable FIFO queue for operations captured while a till was offline.
//!
//! ## Ordering
//! ```text
//!   enqueue ──▶ seq 1 │ sale      │ pending      ┐
//!   enqueue ──▶ seq 2 │ return    │ pending      │ drained oldest-first
//!   enqueue ──▶ seq 3 │ adjustment│ pending      ┘ per (business, store)
//! ```
//! `seq` is AUTOINCREMENT, so arrival order survives restarts and is never
//! reused. The drain reads `pending ORDER BY seq` and settles each entry
//! with a conditional flip, so a crash mid-drain leaves the tail pending
//! and nothing half-settled.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use meridian_core::{NewQueueEntry, SyncQueueEntry};

/// Repository for offline sync queue operations.
#[derive(Debug, Clone)]
pub struct SyncQueueRepository {
    pool: SqlitePool,
}

impl SyncQueueRepository {
    /// Creates a new SyncQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncQueueRepository { pool }
    }

    /// Appends an entry to the queue and returns the stored row.
    pub async fn enqueue(&self, id: &str, entry: &NewQueueEntry) -> DbResult<SyncQueueEntry> {
        let now = Utc::now();

        let stored = sqlx::query_as::<_, SyncQueueEntry>(
            r#"
            INSERT INTO sync_queue (
                id, business_id, store_id, device_id,
                data_type, payload, status, error, created_at, synced_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', NULL, ?7, NULL)
            RETURNING
                seq, id, business_id, store_id, device_id,
                data_type, payload, status, error, created_at, synced_at
            "#,
        )
        .bind(id)
        .bind(&entry.business_id)
        .bind(&entry.store_id)
        .bind(&entry.device_id)
        .bind(entry.data_type)
        .bind(&entry.payload)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        debug!(id = %stored.id, seq = stored.seq, data_type = %stored.data_type.as_str(), "Enqueued");

        Ok(stored)
    }

    /// Gets a queue entry by ID.
    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<SyncQueueEntry>> {
        let entry = sqlx::query_as::<_, SyncQueueEntry>(
            r#"
            SELECT
                seq, id, business_id, store_id, device_id,
                data_type, payload, status, error, created_at, synced_at
            FROM sync_queue
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Gets all pending entries for one store, oldest first.
    pub async fn pending(&self, business_id: &str, store_id: &str) -> DbResult<Vec<SyncQueueEntry>> {
        let entries = sqlx::query_as::<_, SyncQueueEntry>(
            r#"
            SELECT
                seq, id, business_id, store_id, device_id,
                data_type, payload, status, error, created_at, synced_at
            FROM sync_queue
            WHERE business_id = ?1 AND store_id = ?2 AND status = 'pending'
            ORDER BY seq
            "#,
        )
        .bind(business_id)
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Counts pending entries for one store.
    pub async fn count_pending(&self, business_id: &str, store_id: &str) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM sync_queue
            WHERE business_id = ?1 AND store_id = ?2 AND status = 'pending'
            "#,
        )
        .bind(business_id)
        .bind(store_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Settles a pending entry as synced, once.
    ///
    /// ## Returns
    /// * `Ok(true)` - entry settled by this call
    /// * `Ok(false)` - entry missing or already settled
    pub async fn try_mark_synced(&self, id: &str) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE sync_queue
            SET status = 'synced', synced_at = ?2, error = NULL
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Settles a pending entry as failed with the rejection reason, once.
    pub async fn try_mark_failed(&self, id: &str, error: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue
            SET status = 'failed', error = ?2
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
