//! Fine and membership payments through the services on the in-memory store

use chrono::{Duration, Utc};
use librario_server::{
    models::{
        payment::{GatewayOutcome, OfflinePaymentTarget, RecordOfflinePayment},
        BorrowRecord, PaymentCategory, PaymentMode, PaymentStatus,
    },
    repository::{memory::MemoryStore, BorrowStore, PaymentStore},
    services::Services,
    AppError,
};
use rust_decimal::Decimal;

use crate::support::{ana, ben, librarian, seed_borrowed, setup, ANA, ANA_MEMBERSHIP};

/// Loan returned five days late on Ana's plan, leaving a fine of 48
async fn returned_late(store: &MemoryStore, services: &Services) -> BorrowRecord {
    let record = seed_borrowed(store, 1, Utc::now() - Duration::days(5)).await;
    services.borrows.return_item(&ana(), record.id, None).await.unwrap()
}

fn fine_payment(borrow_id: i64, received: bool) -> RecordOfflinePayment {
    RecordOfflinePayment {
        target: OfflinePaymentTarget::Fine { borrow_id },
        amount: None,
        received,
    }
}

#[tokio::test]
async fn test_offline_fine_received_at_desk() {
    let (store, services) = setup().await;
    let returned = returned_late(&store, &services).await;

    let payment = services
        .payments
        .record_offline_payment(&librarian(), fine_payment(returned.id, true))
        .await
        .unwrap();

    assert_eq!(payment.category, PaymentCategory::Fine);
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.mode, PaymentMode::Offline);
    assert_eq!(payment.amount, Decimal::from(48));
    assert_eq!(payment.received_by.as_deref(), Some("Libby"));
    assert_eq!(payment.linked_record_id, Some(returned.id));
    assert!(payment.transaction_id.unwrap().starts_with("FINE-OFFLINE-"));

    let record = BorrowStore::get(store.as_ref(), returned.id).await.unwrap();
    assert!(record.fine_paid);
    assert_eq!(record.payment_mode, Some(PaymentMode::Offline));

    let balance = services.borrows.get_balance(&ana(), ANA, Utc::now()).await.unwrap();
    assert_eq!(balance.total_outstanding, Decimal::ZERO);
}

#[tokio::test]
async fn test_pending_offline_payment_marked_received_once() {
    let (store, services) = setup().await;
    let returned = returned_late(&store, &services).await;

    let pending = services
        .payments
        .record_offline_payment(&librarian(), fine_payment(returned.id, false))
        .await
        .unwrap();
    assert_eq!(pending.status, PaymentStatus::Initiated);
    assert!(pending.received_by.is_none());
    assert!(!BorrowStore::get(store.as_ref(), returned.id).await.unwrap().fine_paid);

    let received = services
        .payments
        .mark_payment_received(&librarian(), pending.id)
        .await
        .unwrap();
    assert_eq!(received.status, PaymentStatus::Success);
    assert_eq!(received.received_by.as_deref(), Some("Libby"));
    assert!(received.received_at.is_some());

    let after_first = BorrowStore::get(store.as_ref(), returned.id).await.unwrap();
    assert!(after_first.fine_paid);

    let again = services
        .payments
        .mark_payment_received(&librarian(), pending.id)
        .await
        .unwrap();
    assert_eq!(again, received);
    assert_eq!(BorrowStore::get(store.as_ref(), returned.id).await.unwrap(), after_first);
}

#[tokio::test]
async fn test_online_payment_resolves_exactly_once() {
    let (store, services) = setup().await;
    let returned = returned_late(&store, &services).await;

    let payment = services
        .payments
        .initiate_fine_payment(&ana(), returned.id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Initiated);
    assert_eq!(payment.mode, PaymentMode::Online);
    assert_eq!(payment.amount, Decimal::from(48));

    let settled = services
        .payments
        .record_gateway_result(&ana(), payment.id, GatewayOutcome::Success)
        .await
        .unwrap();
    assert_eq!(settled.status, PaymentStatus::Success);

    let record = BorrowStore::get(store.as_ref(), returned.id).await.unwrap();
    assert!(record.fine_paid);
    assert_eq!(record.payment_mode, Some(PaymentMode::Online));

    let replay = services
        .payments
        .record_gateway_result(&ana(), payment.id, GatewayOutcome::Failed)
        .await;
    assert!(matches!(replay, Err(AppError::Conflict(_))));

    // the settled record refuses another payment
    let second = services.payments.initiate_fine_payment(&ana(), returned.id).await;
    assert!(matches!(second, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_failed_gateway_payment_leaves_fine_open() {
    let (store, services) = setup().await;
    let returned = returned_late(&store, &services).await;

    let payment = services
        .payments
        .initiate_fine_payment(&ana(), returned.id)
        .await
        .unwrap();
    let failed = services
        .payments
        .record_gateway_result(&ana(), payment.id, GatewayOutcome::Failed)
        .await
        .unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert!(!BorrowStore::get(store.as_ref(), returned.id).await.unwrap().fine_paid);

    // a failed payment cannot be rescued at the desk either
    let marked = services.payments.mark_payment_received(&librarian(), payment.id).await;
    assert!(matches!(marked, Err(AppError::Conflict(_))));

    let retry = services
        .payments
        .initiate_fine_payment(&ana(), returned.id)
        .await
        .unwrap();
    assert_ne!(retry.id, payment.id);

    let history = services
        .payments
        .list_for_borrow(&ana(), returned.id)
        .await
        .unwrap();
    let statuses: Vec<_> = history.iter().map(|p| p.status).collect();
    assert_eq!(statuses, vec![PaymentStatus::Failed, PaymentStatus::Initiated]);

    let hidden = services.payments.list_for_borrow(&ben(), returned.id).await;
    assert!(matches!(hidden, Err(AppError::Authorization(_))));
}

#[tokio::test]
async fn test_fine_is_collected_once_with_pending_payment_open() {
    let (store, services) = setup().await;
    let returned = returned_late(&store, &services).await;

    let pending = services
        .payments
        .record_offline_payment(&librarian(), fine_payment(returned.id, false))
        .await
        .unwrap();

    let second_pending = services
        .payments
        .record_offline_payment(&librarian(), fine_payment(returned.id, false))
        .await;
    assert!(matches!(second_pending, Err(AppError::Conflict(_))));

    let online = services.payments.initiate_fine_payment(&ana(), returned.id).await;
    assert!(matches!(online, Err(AppError::Conflict(_))));

    services
        .payments
        .mark_payment_received(&librarian(), pending.id)
        .await
        .unwrap();

    let at_desk = services
        .payments
        .record_offline_payment(&librarian(), fine_payment(returned.id, true))
        .await;
    assert!(matches!(at_desk, Err(AppError::Conflict(_))));

    let history = services
        .payments
        .list_for_borrow(&librarian(), returned.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, PaymentStatus::Success);
    assert!(BorrowStore::get(store.as_ref(), returned.id).await.unwrap().fine_paid);
}

#[tokio::test]
async fn test_second_online_payment_waits_for_first() {
    let (store, services) = setup().await;
    let returned = returned_late(&store, &services).await;

    services
        .payments
        .initiate_fine_payment(&ana(), returned.id)
        .await
        .unwrap();
    let second = services.payments.initiate_fine_payment(&ana(), returned.id).await;
    assert!(matches!(second, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_waived_fine_keeps_online_payment_initiated() {
    let (store, services) = setup().await;
    let returned = returned_late(&store, &services).await;

    let payment = services
        .payments
        .initiate_fine_payment(&ana(), returned.id)
        .await
        .unwrap();
    let waived = services.borrows.waive_fine(&librarian(), returned.id).await.unwrap();

    let result = services
        .payments
        .record_gateway_result(&ana(), payment.id, GatewayOutcome::Success)
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let stored = PaymentStore::get(store.as_ref(), payment.id).await.unwrap();
    assert_eq!(stored.status, PaymentStatus::Initiated);
    assert!(stored.received_at.is_none());
    assert_eq!(BorrowStore::get(store.as_ref(), returned.id).await.unwrap(), waived);

    // the gateway can still report the failure
    let failed = services
        .payments
        .record_gateway_result(&ana(), payment.id, GatewayOutcome::Failed)
        .await
        .unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_waived_fine_keeps_desk_payment_pending() {
    let (store, services) = setup().await;
    let returned = returned_late(&store, &services).await;

    let pending = services
        .payments
        .record_offline_payment(&librarian(), fine_payment(returned.id, false))
        .await
        .unwrap();
    let waived = services.borrows.waive_fine(&librarian(), returned.id).await.unwrap();

    let marked = services.payments.mark_payment_received(&librarian(), pending.id).await;
    assert!(matches!(marked, Err(AppError::Conflict(_))));

    let stored = PaymentStore::get(store.as_ref(), pending.id).await.unwrap();
    assert_eq!(stored.status, PaymentStatus::Initiated);
    assert!(stored.received_by.is_none());
    assert_eq!(BorrowStore::get(store.as_ref(), returned.id).await.unwrap(), waived);
}

#[tokio::test]
async fn test_gateway_result_requires_payment_owner() {
    let (store, services) = setup().await;
    let returned = returned_late(&store, &services).await;
    let payment = services
        .payments
        .initiate_fine_payment(&ana(), returned.id)
        .await
        .unwrap();

    let result = services
        .payments
        .record_gateway_result(&ben(), payment.id, GatewayOutcome::Success)
        .await;
    assert!(matches!(result, Err(AppError::Authorization(_))));
}

#[tokio::test]
async fn test_fine_cannot_be_paid_on_active_loan() {
    let (store, services) = setup().await;
    let record = seed_borrowed(&store, 1, Utc::now() - Duration::days(3)).await;

    let online = services.payments.initiate_fine_payment(&ana(), record.id).await;
    assert!(matches!(online, Err(AppError::Conflict(_))));

    let offline = services
        .payments
        .record_offline_payment(&librarian(), fine_payment(record.id, true))
        .await;
    assert!(matches!(offline, Err(AppError::Conflict(_))));

    assert_eq!(BorrowStore::get(store.as_ref(), record.id).await.unwrap(), record);
}

#[tokio::test]
async fn test_nothing_to_pay_on_time() {
    let (store, services) = setup().await;
    let record = seed_borrowed(&store, 1, Utc::now() + Duration::days(3)).await;
    services.borrows.return_item(&ana(), record.id, None).await.unwrap();

    let result = services.payments.initiate_fine_payment(&ana(), record.id).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_membership_payment_defaults_to_plan_fee() {
    let (_store, services) = setup().await;

    let payment = services
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

    assert_eq!(payment.category, PaymentCategory::Membership);
    assert_eq!(payment.amount, Decimal::from(300));
    assert_eq!(payment.patron_id, ANA);
    assert_eq!(payment.linked_record_id, Some(ANA_MEMBERSHIP));
    assert_eq!(payment.member_email.as_deref(), Some("ana@example.org"));
    assert!(payment.transaction_id.unwrap().starts_with("MEMBER-OFFLINE-"));
}

#[tokio::test]
async fn test_offline_payment_rejects_bad_input() {
    let (store, services) = setup().await;
    let returned = returned_late(&store, &services).await;

    let negative = services
        .payments
        .record_offline_payment(
            &librarian(),
            RecordOfflinePayment {
                amount: Some(Decimal::from(-5)),
                ..fine_payment(returned.id, true)
            },
        )
        .await;
    assert!(matches!(negative, Err(AppError::Validation(_))));

    let by_member = services
        .payments
        .record_offline_payment(&ana(), fine_payment(returned.id, true))
        .await;
    assert!(matches!(by_member, Err(AppError::Authorization(_))));

    let unknown = services
        .payments
        .record_offline_payment(
            &librarian(),
            RecordOfflinePayment {
                target: OfflinePaymentTarget::Membership {
                    membership_request_id: 999,
                },
                amount: None,
                received: true,
            },
        )
        .await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));

    assert!(!BorrowStore::get(store.as_ref(), returned.id).await.unwrap().fine_paid);
}
