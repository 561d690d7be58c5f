//! Durable state — the entitlement table and the payment ledger.
//!
//! Each store is a trait carried in `AppState` as an `Arc<dyn ...>`, with
//! a Postgres implementation for production and an in-memory one for the
//! concurrency/idempotency tests. The traits expose *atomic compound
//! operations* (CAS update, conditional settle) rather than bare reads
//! and writes, so the consistency guarantees live at the storage seam.

pub mod entitlement;
#[cfg(test)]
pub mod memory;
pub mod payment;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Order-code collision detected at creation time; the caller
    /// regenerates the code and retries.
    #[error("duplicate order code {0}")]
    DuplicateOrder(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
