//! In-memory store implementation
//!
//! Implements every store trait over one locked state, with switches to make
//! either payment source fail. Raw payment sources emit the same key shapes as
//! the Postgres queries.

use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::{BorrowStore, CatalogProvider, PaymentStore};
use crate::{
    engine::lifecycle::add_days,
    error::{AppError, AppResult},
    models::{
        borrow::NewBorrowRecord,
        payment::NewPayment,
        plan::{CatalogItem, MembershipRequestInfo, PatronInfo},
        BorrowRecord, BorrowStatus, Payment, PaymentCategory, PaymentStatus, PlanTerms,
    },
};

#[derive(Default)]
struct State {
    borrows: BTreeMap<i64, BorrowRecord>,
    payments: BTreeMap<i64, Payment>,
    items: HashMap<i64, CatalogItem>,
    patrons: HashMap<i64, PatronInfo>,
    plans: HashMap<i64, PlanTerms>,
    membership_requests: HashMap<i64, MembershipRequestInfo>,
    extra_membership_raw: Vec<Value>,
    extra_fine_raw: Vec<Value>,
    next_borrow_id: i64,
    next_payment_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    fail_membership_source: AtomicBool,
    fail_fine_source: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_item(&self, id: i64, title: &str) {
        self.state.write().await.items.insert(
            id,
            CatalogItem {
                id,
                title: title.to_string(),
            },
        );
    }

    pub async fn add_patron(&self, id: i64, name: &str, email: Option<&str>) {
        self.state.write().await.patrons.insert(
            id,
            PatronInfo {
                id,
                name: name.to_string(),
                email: email.map(str::to_string),
            },
        );
    }

    pub async fn set_plan(&self, patron_id: i64, terms: PlanTerms) {
        self.state.write().await.plans.insert(patron_id, terms);
    }

    pub async fn add_membership_request(&self, request: MembershipRequestInfo) {
        self.state
            .write()
            .await
            .membership_requests
            .insert(request.id, request);
    }

    /// Extra raw membership payment, emitted as-is by the membership source
    pub async fn push_raw_membership_payment(&self, raw: Value) {
        self.state.write().await.extra_membership_raw.push(raw);
    }

    /// Extra raw fine payment, emitted as-is by the fine source
    pub async fn push_raw_fine_payment(&self, raw: Value) {
        self.state.write().await.extra_fine_raw.push(raw);
    }

    pub fn fail_membership_source(&self, fail: bool) {
        self.fail_membership_source.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fine_source(&self, fail: bool) {
        self.fail_fine_source.store(fail, Ordering::SeqCst);
    }

    /// Overwrite a record without a version check, for test setup
    pub async fn put_borrow(&self, record: BorrowRecord) {
        let mut state = self.state.write().await;
        state.next_borrow_id = state.next_borrow_id.max(record.id);
        state.borrows.insert(record.id, record);
    }

    fn stale(id: i64, expected: i64, found: i64) -> AppError {
        AppError::Conflict(format!(
            "Borrow record {} was modified concurrently (expected version {}, found {})",
            id, expected, found
        ))
    }
}

fn borrow_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Borrow record with id {} not found", id))
}

#[async_trait]
impl BorrowStore for MemoryStore {
    async fn get(&self, id: i64) -> AppResult<BorrowRecord> {
        self.state
            .read()
            .await
            .borrows
            .get(&id)
            .cloned()
            .ok_or_else(|| borrow_not_found(id))
    }

    async fn insert(&self, new: &NewBorrowRecord) -> AppResult<BorrowRecord> {
        let mut state = self.state.write().await;
        state.next_borrow_id += 1;
        let record = BorrowRecord {
            id: state.next_borrow_id,
            item_id: new.item_id,
            patron_id: new.patron_id,
            item_title: new.item_title.clone(),
            borrow_date: new.borrow_date,
            due_date: None,
            return_date: None,
            status: BorrowStatus::Requested,
            renew_count: 0,
            fine_amount: rust_decimal::Decimal::ZERO,
            fine_paid: false,
            fine_waived: false,
            payment_mode: None,
            book_condition: None,
            rejection_reason: None,
            version: 1,
            updated_at: Utc::now(),
        };
        state.borrows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn save(&self, record: &BorrowRecord) -> AppResult<BorrowRecord> {
        let mut state = self.state.write().await;
        let stored = state.borrows.get(&record.id).ok_or_else(|| borrow_not_found(record.id))?;
        if stored.version != record.version {
            return Err(Self::stale(record.id, record.version, stored.version));
        }

        let mut next = record.clone();
        next.version += 1;
        next.updated_at = Utc::now();
        state.borrows.insert(next.id, next.clone());
        Ok(next)
    }

    async fn extend_due_date(&self, id: i64, expected_version: i64, days: i64) -> AppResult<BorrowRecord> {
        let mut state = self.state.write().await;
        let stored = state.borrows.get(&id).ok_or_else(|| borrow_not_found(id))?;
        if stored.version != expected_version {
            return Err(Self::stale(id, expected_version, stored.version));
        }
        let due_date = match (stored.status, stored.due_date) {
            (BorrowStatus::Borrowed, Some(due)) => due,
            _ => {
                return Err(AppError::Conflict(format!(
                    "Borrow record {} cannot be renewed",
                    id
                )))
            }
        };

        let mut next = stored.clone();
        next.due_date = Some(add_days(due_date, days)?);
        next.renew_count += 1;
        next.version += 1;
        next.updated_at = Utc::now();
        state.borrows.insert(id, next.clone());
        Ok(next)
    }

    async fn list_for_patron(&self, patron_id: i64) -> AppResult<Vec<BorrowRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state
            .borrows
            .values()
            .filter(|r| r.patron_id == patron_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn list_active_borrowed(&self) -> AppResult<Vec<BorrowRecord>> {
        Ok(self
            .state
            .read()
            .await
            .borrows
            .values()
            .filter(|r| r.status == BorrowStatus::Borrowed)
            .cloned()
            .collect())
    }

    async fn count_open_for_patron(&self, patron_id: i64) -> AppResult<i64> {
        let count = self
            .state
            .read()
            .await
            .borrows
            .values()
            .filter(|r| {
                r.patron_id == patron_id
                    && matches!(r.status, BorrowStatus::Requested | BorrowStatus::Borrowed)
            })
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn get(&self, id: i64) -> AppResult<Payment> {
        self.state
            .read()
            .await
            .payments
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Payment with id {} not found", id)))
    }

    async fn insert(&self, new: &NewPayment) -> AppResult<Payment> {
        let mut state = self.state.write().await;
        if state
            .payments
            .values()
            .any(|p| p.transaction_id.as_deref() == Some(new.transaction_id.as_str()))
        {
            return Err(AppError::Conflict(format!(
                "Transaction {} already recorded",
                new.transaction_id
            )));
        }
        if new.category == PaymentCategory::Fine && new.status == PaymentStatus::Initiated {
            let open = state.payments.values().any(|p| {
                p.category == PaymentCategory::Fine
                    && p.status == PaymentStatus::Initiated
                    && p.linked_record_id == new.linked_record_id
            });
            if open {
                return Err(AppError::Conflict(format!(
                    "Borrow record {} already has a pending fine payment",
                    new.linked_record_id.unwrap_or_default()
                )));
            }
        }

        state.next_payment_id += 1;
        let payment = Payment {
            id: state.next_payment_id,
            category: new.category,
            transaction_id: Some(new.transaction_id.clone()),
            amount: new.amount,
            status: new.status,
            mode: new.mode,
            patron_id: new.patron_id,
            recorded_by: new.recorded_by.clone(),
            linked_record_id: new.linked_record_id,
            member_name: new.member_name.clone(),
            member_email: new.member_email.clone(),
            book_title: new.book_title.clone(),
            received_by: new.received_by.clone(),
            received_at: new.received_at,
            created_at: new.created_at,
        };
        state.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn transition(
        &self,
        id: i64,
        from: PaymentStatus,
        to: PaymentStatus,
        received_by: Option<String>,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Payment>> {
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Payment with id {} not found", id)))?;
        if payment.status != from {
            return Ok(None);
        }

        payment.status = to;
        if received_by.is_some() {
            payment.received_by = received_by;
        }
        if to == PaymentStatus::Success {
            payment.received_at = Some(at);
        }
        Ok(Some(payment.clone()))
    }

    async fn list_for_borrow(&self, borrow_id: i64) -> AppResult<Vec<Payment>> {
        Ok(self
            .state
            .read()
            .await
            .payments
            .values()
            .filter(|p| p.category == PaymentCategory::Fine && p.linked_record_id == Some(borrow_id))
            .cloned()
            .collect())
    }

    async fn membership_payments_raw(&self) -> AppResult<Vec<Value>> {
        if self.fail_membership_source.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamUnavailable(
                "Membership payments source is unavailable".to_string(),
            ));
        }

        let state = self.state.read().await;
        let mut raws: Vec<Value> = state
            .payments
            .values()
            .filter(|p| p.category == PaymentCategory::Membership)
            .map(|p| {
                json!({
                    "id": p.id,
                    "transaction_id": p.transaction_id,
                    "amount": p.amount.to_string(),
                    "status": p.status.as_str(),
                    "user_id": p.patron_id,
                    "member_name": p.member_name,
                    "member_email": p.member_email,
                    "membership_request_id": p.linked_record_id,
                    "recorded_by": p.recorded_by,
                    "created_at": p.created_at.to_rfc3339(),
                })
            })
            .collect();
        raws.extend(state.extra_membership_raw.iter().cloned());
        Ok(raws)
    }

    async fn fine_payments_raw(&self) -> AppResult<Vec<Value>> {
        if self.fail_fine_source.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamUnavailable(
                "Fine payments source is unavailable".to_string(),
            ));
        }

        let state = self.state.read().await;
        let mut raws: Vec<Value> = state
            .payments
            .values()
            .filter(|p| p.category == PaymentCategory::Fine)
            .filter_map(|p| {
                let borrow = state.borrows.get(&p.linked_record_id?)?;
                Some(json!({
                    "paymentId": p.id,
                    "transactionId": p.transaction_id,
                    "borrowId": borrow.id,
                    "bookTitle": p.book_title.clone().or_else(|| borrow.item_title.clone()),
                    "userId": borrow.patron_id,
                    "userName": p.member_name,
                    "userEmail": p.member_email,
                    "fineAmount": p.amount.to_string(),
                    "paymentStatus": p.status.as_str(),
                    "paymentDate": p.created_at.to_rfc3339(),
                    "recordedByName": p.recorded_by,
                }))
            })
            .collect();
        raws.extend(state.extra_fine_raw.iter().cloned());
        Ok(raws)
    }
}

#[async_trait]
impl CatalogProvider for MemoryStore {
    async fn item(&self, id: i64) -> AppResult<CatalogItem> {
        self.state
            .read()
            .await
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn patron(&self, id: i64) -> AppResult<PatronInfo> {
        self.state
            .read()
            .await
            .patrons
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))
    }

    async fn plan_terms(&self, patron_id: i64) -> AppResult<Option<PlanTerms>> {
        Ok(self.state.read().await.plans.get(&patron_id).cloned())
    }

    async fn membership_request(&self, id: i64) -> AppResult<MembershipRequestInfo> {
        self.state
            .read()
            .await
            .membership_requests
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Membership request with id {} not found", id)))
    }
}
