//! # meridian-ledger: Stock Ledger Engine for Meridian POS
//!
//! This crate is the single writer of product stock. Every movement, from a
//! live terminal sale to a replayed offline adjustment, runs through the
//! [`LedgerEngine`] so the same invariants hold on every path.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ledger Engine Architecture                       │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   LedgerEngine (engine.rs)                       │  │
//! │  │                                                                  │  │
//! │  │  Holds the Database handle and the per-store drain locks.        │  │
//! │  │  Manual adjustments live here; documents live in their modules.  │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ sales.rs       │  │ returns.rs     │  │ queue.rs               │    │
//! │  │                │  │                │  │                        │    │
//! │  │ commit_sale    │  │ commit_return  │  │ enqueue_offline        │    │
//! │  │ cancel_sale    │  │ set_status     │  │ process_queue          │    │
//! │  │                │  │ mark_refunded  │  │                        │    │
//! │  │ Debits lines,  │  │ Credits stock, │  │ Replays captured       │    │
//! │  │ rolls back on  │  │ enforces the   │  │ payloads oldest-first, │    │
//! │  │ any shortfall  │  │ return ceiling │  │ one store at a time    │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  GUARANTEES:                                                           │
//! │  • Stock never goes negative (conditional debit in the database)       │
//! │  • A sale commits all lines or none (compensating credits)             │
//! │  • Replaying a payload twice moves stock once (client_ref keys)        │
//! │  • One drain per (business, store) at a time (async lock registry)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `LedgerEngine` construction, drain locks, stock adjustments
//! - [`sales`] - Sale commit and cancellation
//! - [`returns`] - Return slip lifecycle
//! - [`queue`] - Offline capture and reconciliation drain
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meridian_db::{Database, DbConfig};
//! use meridian_ledger::LedgerEngine;
//!
//! let db = Arc::new(Database::new(DbConfig::new("./meridian.db")).await?);
//! let ledger = LedgerEngine::new(db);
//!
//! // Commit a live sale
//! let outcome = ledger.commit_sale(new_sale).await?;
//! println!("{} ({} low-stock warnings)", outcome.sale.sale_number, outcome.low_stock.len());
//!
//! // Drain whatever a till captured while offline
//! let report = ledger.process_queue("biz-1", "store-1").await?;
//! println!("synced {}, failed {}", report.synced, report.failed);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod engine;
pub mod queue;
pub mod returns;
pub mod sales;

// =============================================================================
// Re-exports
// =============================================================================

pub use engine::LedgerEngine;
