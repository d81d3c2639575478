//! Repository layer for database operations
//!
//! Services only see the store traits below. The Postgres implementations back
//! the server; [`memory::MemoryStore`] backs tests and local runs.

pub mod borrows;
pub mod catalog;
pub mod memory;
pub mod payments;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        borrow::NewBorrowRecord,
        payment::NewPayment,
        plan::{CatalogItem, MembershipRequestInfo, PatronInfo},
        BorrowRecord, Payment, PaymentStatus, PlanTerms,
    },
};

/// Persistence of borrow records.
///
/// Every write bumps `version`; writes carrying a stale version fail with
/// `AppError::Conflict` and leave the stored record untouched.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BorrowStore: Send + Sync {
    async fn get(&self, id: i64) -> AppResult<BorrowRecord>;

    async fn insert(&self, new: &NewBorrowRecord) -> AppResult<BorrowRecord>;

    /// Compare-and-swap on `record.version`, returns the stored record
    async fn save(&self, record: &BorrowRecord) -> AppResult<BorrowRecord>;

    /// Push the due date back by `days` and count one renewal
    async fn extend_due_date(&self, id: i64, expected_version: i64, days: i64) -> AppResult<BorrowRecord>;

    async fn list_for_patron(&self, patron_id: i64) -> AppResult<Vec<BorrowRecord>>;

    async fn list_active_borrowed(&self) -> AppResult<Vec<BorrowRecord>>;

    /// Requested or borrowed records counting against the borrowing limit
    async fn count_open_for_patron(&self, patron_id: i64) -> AppResult<i64>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get(&self, id: i64) -> AppResult<Payment>;

    async fn insert(&self, new: &NewPayment) -> AppResult<Payment>;

    /// Move a payment out of `from`; `None` when it no longer is in `from`
    async fn transition(
        &self,
        id: i64,
        from: PaymentStatus,
        to: PaymentStatus,
        received_by: Option<String>,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Payment>>;

    async fn list_for_borrow(&self, borrow_id: i64) -> AppResult<Vec<Payment>>;

    /// Membership payments as raw JSON (snake_case keys)
    async fn membership_payments_raw(&self) -> AppResult<Vec<Value>>;

    /// Fine payments joined to their borrow records, as raw JSON (camelCase keys)
    async fn fine_payments_raw(&self) -> AppResult<Vec<Value>>;
}

/// Read-only catalog, patron and plan data
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn item(&self, id: i64) -> AppResult<CatalogItem>;

    async fn patron(&self, id: i64) -> AppResult<PatronInfo>;

    /// `None` when the patron has no plan on file
    async fn plan_terms(&self, patron_id: i64) -> AppResult<Option<PlanTerms>>;

    async fn membership_request(&self, id: i64) -> AppResult<MembershipRequestInfo>;
}

/// Main repository struct holding the stores
#[derive(Clone)]
pub struct Repository {
    pub borrows: Arc<dyn BorrowStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub catalog: Arc<dyn CatalogProvider>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            borrows: Arc::new(borrows::BorrowsRepository::new(pool.clone())),
            payments: Arc::new(payments::PaymentsRepository::new(pool.clone())),
            catalog: Arc::new(catalog::CatalogRepository::new(pool)),
        }
    }

    /// All three stores served by one in-memory store
    pub fn in_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            borrows: store.clone(),
            payments: store.clone(),
            catalog: store,
        }
    }

    pub fn from_parts(
        borrows: Arc<dyn BorrowStore>,
        payments: Arc<dyn PaymentStore>,
        catalog: Arc<dyn CatalogProvider>,
    ) -> Self {
        Self {
            borrows,
            payments,
            catalog,
        }
    }
}
