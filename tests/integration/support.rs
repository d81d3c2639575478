//! Shared fixtures for service-level tests on the in-memory store

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use librario_server::{
    config::AppConfig,
    models::{
        plan::MembershipRequestInfo, BorrowRecord, BorrowStatus, PlanTerms, Role, Session,
    },
    repository::{memory::MemoryStore, Repository},
    services::{LogNotifier, Services},
};
use rust_decimal::Decimal;

pub const ANA: i64 = 100;
pub const BEN: i64 = 200;
pub const DUNE: i64 = 10;
pub const SOLARIS: i64 = 11;
pub const ANA_MEMBERSHIP: i64 = 7;

pub fn librarian() -> Session {
    Session::new(1, "Libby", Role::Librarian)
}

pub fn ana() -> Session {
    Session::new(ANA, "Ana", Role::Member)
}

pub fn ben() -> Session {
    Session::new(BEN, "Ben", Role::Member)
}

/// Ana's plan: 8 per day with a 1.2 surcharge, two open loans at most
pub fn surcharge_plan() -> PlanTerms {
    PlanTerms {
        fine_per_day: Decimal::from(8),
        borrowing_limit: 2,
        fine_multiplier: Decimal::new(12, 1),
        borrow_duration_days: Some(14),
        renewal_days: Some(7),
    }
}

pub async fn setup() -> (Arc<MemoryStore>, Services) {
    let store = Arc::new(MemoryStore::new());
    store.add_item(DUNE, "Dune").await;
    store.add_item(SOLARIS, "Solaris").await;
    store.add_patron(ANA, "Ana", Some("ana@example.org")).await;
    store.add_patron(BEN, "Ben", None).await;
    store.set_plan(ANA, surcharge_plan()).await;
    store
        .add_membership_request(MembershipRequestInfo {
            id: ANA_MEMBERSHIP,
            patron_id: ANA,
            plan_name: Some("Gold".to_string()),
            fee: Some(Decimal::from(300)),
        })
        .await;

    let services = Services::new(
        Repository::in_memory(store.clone()),
        &AppConfig::default(),
        Arc::new(LogNotifier),
    );
    (store, services)
}

/// Active loan of Dune to Ana, stored directly
pub async fn seed_borrowed(store: &MemoryStore, id: i64, due_date: DateTime<Utc>) -> BorrowRecord {
    let record = BorrowRecord {
        id,
        item_id: DUNE,
        patron_id: ANA,
        item_title: Some("Dune".to_string()),
        borrow_date: due_date - Duration::days(14),
        due_date: Some(due_date),
        return_date: None,
        status: BorrowStatus::Borrowed,
        renew_count: 0,
        fine_amount: Decimal::ZERO,
        fine_paid: false,
        fine_waived: false,
        payment_mode: None,
        book_condition: None,
        rejection_reason: None,
        version: 1,
        updated_at: Utc::now(),
    };
    store.put_borrow(record.clone()).await;
    record
}
