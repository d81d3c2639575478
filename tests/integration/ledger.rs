//! Reconciliation ledger over both payment sources

use chrono::{Duration, Utc};
use librario_server::{
    engine::{
        classifier::LedgerSource,
        ledger::{LedgerQuery, LedgerSort, StatusFilter},
    },
    models::{
        payment::{OfflinePaymentTarget, RecordOfflinePayment},
        PaymentCategory, PaymentStatus,
    },
    repository::memory::MemoryStore,
    services::Services,
    AppError,
};
use rust_decimal::Decimal;
use serde_json::json;

use crate::support::{ana, ben, librarian, seed_borrowed, setup, ANA, ANA_MEMBERSHIP, BEN};

/// One received membership payment and one pending fine payment for Ana
async fn seed_payments(store: &MemoryStore, services: &Services) {
    services
        .payments
        .record_offline_payment(
            &librarian(),
            RecordOfflinePayment {
                target: OfflinePaymentTarget::Membership {
                    membership_request_id: ANA_MEMBERSHIP,
                },
                amount: None,
                received: true,
            },
        )
        .await
        .unwrap();

    let record = seed_borrowed(store, 1, Utc::now() - Duration::days(5)).await;
    services.borrows.return_item(&ana(), record.id, None).await.unwrap();
    services
        .payments
        .record_offline_payment(
            &librarian(),
            RecordOfflinePayment {
                target: OfflinePaymentTarget::Fine { borrow_id: record.id },
                amount: None,
                received: false,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_ledger_merges_both_sources() {
    let (store, services) = setup().await;
    seed_payments(&store, &services).await;

    let ledger = services
        .payments
        .get_ledger(&librarian(), &LedgerQuery::default())
        .await
        .unwrap();

    assert!(ledger.warnings.is_empty());
    assert_eq!(ledger.stats.total, 2);
    assert_eq!(ledger.stats.membership_count, 1);
    assert_eq!(ledger.stats.membership_amount, Decimal::from(300));
    assert_eq!(ledger.stats.fine_count, 1);
    assert_eq!(ledger.stats.fine_amount, Decimal::from(48));
    assert_eq!(ledger.stats.success, 1);
    assert_eq!(ledger.stats.initiated, 1);
    assert_eq!(ledger.stats.total_amount, Decimal::from(348));

    // the fine was recorded last, so it sorts first
    let fine = &ledger.entries[0];
    assert_eq!(fine.category, PaymentCategory::Fine);
    assert_eq!(fine.source, LedgerSource::Fine);
    assert_eq!(fine.book_title.as_deref(), Some("Dune"));
    assert_eq!(fine.patron_id, Some(ANA));
    assert_eq!(fine.linked_record_id, Some(1));
    assert_eq!(fine.recorded_by.as_deref(), Some("Libby"));

    let membership = &ledger.entries[1];
    assert_eq!(membership.category, PaymentCategory::Membership);
    assert_eq!(membership.member_name, "Ana");
    assert_eq!(membership.linked_record_id, Some(ANA_MEMBERSHIP));
}

#[tokio::test]
async fn test_ledger_degrades_when_one_source_fails() {
    let (store, services) = setup().await;
    seed_payments(&store, &services).await;
    store.fail_fine_source(true);

    let ledger = services
        .payments
        .get_ledger(&librarian(), &LedgerQuery::default())
        .await
        .unwrap();

    assert_eq!(ledger.warnings.len(), 1);
    assert_eq!(ledger.stats.total, 1);
    assert_eq!(ledger.entries[0].category, PaymentCategory::Membership);

    store.fail_fine_source(false);
    store.fail_membership_source(true);
    let ledger = services
        .payments
        .get_ledger(&librarian(), &LedgerQuery::default())
        .await
        .unwrap();
    assert_eq!(ledger.warnings.len(), 1);
    assert_eq!(ledger.entries.len(), 1);
    assert_eq!(ledger.entries[0].category, PaymentCategory::Fine);
}

#[tokio::test]
async fn test_ledger_fails_when_both_sources_fail() {
    let (store, services) = setup().await;
    seed_payments(&store, &services).await;
    store.fail_fine_source(true);
    store.fail_membership_source(true);

    let result = services
        .payments
        .get_ledger(&librarian(), &LedgerQuery::default())
        .await;
    assert!(matches!(result, Err(AppError::UpstreamUnavailable(_))));
}

#[tokio::test]
async fn test_ledger_classifies_legacy_shapes() {
    let (store, services) = setup().await;

    // nested user and book objects from an older fine export
    store
        .push_raw_fine_payment(json!({
            "_id": "65f0",
            "user": {"id": BEN, "name": "Ben", "email": "ben@example.org"},
            "book": {"title": "Solaris"},
            "fine_amount": "12.50",
            "payment_status": "paid",
            "payment_date": "2024-03-01"
        }))
        .await;
    // membership source row that is really a fine
    store
        .push_raw_membership_payment(json!({
            "transaction_id": "BORROW-77",
            "amount": 15,
            "created_at": 1709251200000_i64
        }))
        .await;
    // unparsable amount and no hints at all
    store
        .push_raw_membership_payment(json!({
            "transactionId": "TXN-1",
            "amount": "n/a"
        }))
        .await;

    let ledger = services
        .payments
        .get_ledger(&librarian(), &LedgerQuery::default())
        .await
        .unwrap();
    assert_eq!(ledger.entries.len(), 3);

    let nested = ledger
        .entries
        .iter()
        .find(|e| e.book_title.as_deref() == Some("Solaris"))
        .unwrap();
    assert_eq!(nested.category, PaymentCategory::Fine);
    assert_eq!(nested.patron_id, Some(BEN));
    assert_eq!(nested.member_email, "ben@example.org");
    assert_eq!(nested.amount, Decimal::new(1250, 2));
    assert_eq!(nested.status, PaymentStatus::Success);

    let relabelled = ledger
        .entries
        .iter()
        .find(|e| e.transaction_id.as_deref() == Some("BORROW-77"))
        .unwrap();
    assert_eq!(relabelled.category, PaymentCategory::Fine);
    assert_eq!(relabelled.source, LedgerSource::Membership);
    assert_eq!(relabelled.book_title.as_deref(), Some("Unknown Book"));

    let bare = ledger
        .entries
        .iter()
        .find(|e| e.transaction_id.as_deref() == Some("TXN-1"))
        .unwrap();
    assert_eq!(bare.category, PaymentCategory::Membership);
    assert_eq!(bare.amount, Decimal::ZERO);
    assert_eq!(bare.member_name, "Unknown");
    assert!(bare.created_at.is_none());

    // undated entries sort last
    assert_eq!(ledger.entries[2].transaction_id.as_deref(), Some("TXN-1"));
    assert_eq!(ledger.stats.fine_count, 2);
}

#[tokio::test]
async fn test_member_sees_only_own_payments() {
    let (store, services) = setup().await;
    seed_payments(&store, &services).await;
    store
        .push_raw_membership_payment(json!({
            "id": 90,
            "user_id": BEN,
            "member_name": "Ben",
            "membership_request_id": 8,
            "amount": "500",
            "status": "SUCCESS"
        }))
        .await;

    let all = services
        .payments
        .get_ledger(&librarian(), &LedgerQuery::default())
        .await
        .unwrap();
    assert_eq!(all.stats.total, 3);

    let own = services
        .payments
        .get_ledger(&ben(), &LedgerQuery::default())
        .await
        .unwrap();
    assert_eq!(own.stats.total, 1);
    assert_eq!(own.stats.total_amount, Decimal::from(500));
    assert_eq!(own.entries[0].patron_id, Some(BEN));
}

#[tokio::test]
async fn test_query_filters_without_changing_stats() {
    let (store, services) = setup().await;
    seed_payments(&store, &services).await;

    let pending = services
        .payments
        .get_ledger(
            &librarian(),
            &LedgerQuery {
                status: StatusFilter::Pending,
                ..LedgerQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(pending.entries.len(), 1);
    assert_eq!(pending.entries[0].category, PaymentCategory::Fine);
    assert_eq!(pending.stats.total, 2);

    let searched = services
        .payments
        .get_ledger(
            &librarian(),
            &LedgerQuery {
                search: Some("  DUNE ".to_string()),
                ..LedgerQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(searched.entries.len(), 1);

    let by_amount = services
        .payments
        .get_ledger(
            &librarian(),
            &LedgerQuery {
                sort: LedgerSort::AmountDesc,
                category: Some(PaymentCategory::Membership),
                ..LedgerQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(by_amount.entries.len(), 1);
    assert_eq!(by_amount.entries[0].amount, Decimal::from(300));
}
