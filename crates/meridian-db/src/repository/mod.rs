//! # Repository Module
//!
//! Database repository implementations for the Meridian ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Ledger operation                                                      │
//! │       │                                                                 │
//! │       │  db.stock().debit(biz, store, product, qty)                    │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  StockRepository                                                       │
//! │  ├── debit(&self, ...)     ← single conditional UPDATE                 │
//! │  ├── credit(&self, ...)                                                │
//! │  ├── find_by_id(&self, ...)                                            │
//! │  └── list_below_alert(&self, ...)                                      │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Clean separation of concerns                                        │
//! │  • SQL is isolated in one place                                        │
//! │  • The engine reads as business steps, not queries                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`stock::StockRepository`] - Stock movements and adjustment audit
//! - [`sale::SaleRepository`] - Sale and sale line persistence
//! - [`sale_return::ReturnRepository`] - Returns, items, status transitions
//! - [`sync_queue::SyncQueueRepository`] - Offline queue management
//! - [`counter::CounterRepository`] - Receipt number allocation

pub mod counter;
pub mod sale;
pub mod sale_return;
pub mod stock;
pub mod sync_queue;
