//! Borrow lifecycle through the services on the in-memory store

use chrono::{Duration, Utc};
use librario_server::{
    engine::sync::{MergeOutcome, RecordView},
    models::{borrow::CreateBorrowRequest, BookCondition, BorrowStatus, DamageKind, DisplayStatus},
    repository::BorrowStore,
    AppError,
};
use rust_decimal::Decimal;

use crate::support::{ana, ben, librarian, seed_borrowed, setup, ANA, BEN, DUNE, SOLARIS};

fn request(item_id: i64) -> CreateBorrowRequest {
    CreateBorrowRequest {
        item_id,
        patron_id: None,
    }
}

#[tokio::test]
async fn test_request_approve_and_renew_until_capped() {
    let (_store, services) = setup().await;
    let borrows = &services.borrows;

    let requested = borrows.request_borrow(&ana(), request(DUNE)).await.unwrap();
    assert_eq!(requested.status, BorrowStatus::Requested);
    assert_eq!(requested.item_title.as_deref(), Some("Dune"));

    let approved = borrows.approve(&librarian(), requested.id, None).await.unwrap();
    let due = approved.due_date.unwrap();
    assert_eq!(approved.status, BorrowStatus::Borrowed);
    assert_eq!(approved.version, 2);

    let first = borrows.renew(&ana(), approved.id, None).await.unwrap();
    assert_eq!(first.due_date, due + Duration::days(7));
    let second = borrows.renew(&ana(), approved.id, Some(3)).await.unwrap();
    assert_eq!(second.due_date, due + Duration::days(10));
    assert_eq!(second.record.renew_count, 2);

    let third = borrows.renew(&ana(), approved.id, None).await;
    assert!(matches!(third, Err(AppError::Conflict(_))));

    let view = borrows.get(&ana(), approved.id).await.unwrap();
    assert_eq!(view.record.renew_count, 2);
    assert_eq!(view.record.due_date, Some(due + Duration::days(10)));
}

#[tokio::test]
async fn test_borrowing_limit_is_enforced() {
    let (_store, services) = setup().await;
    let borrows = &services.borrows;

    borrows.request_borrow(&ana(), request(DUNE)).await.unwrap();
    borrows.request_borrow(&ana(), request(SOLARIS)).await.unwrap();
    let third = borrows.request_borrow(&ana(), request(DUNE)).await;
    assert!(matches!(third, Err(AppError::Conflict(_))));

    // Ben has no plan on file and falls back to no limit
    for _ in 0..3 {
        borrows.request_borrow(&ben(), request(DUNE)).await.unwrap();
    }
}

#[tokio::test]
async fn test_member_cannot_request_for_someone_else() {
    let (_store, services) = setup().await;
    let result = services
        .borrows
        .request_borrow(
            &ana(),
            CreateBorrowRequest {
                item_id: DUNE,
                patron_id: Some(BEN),
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Authorization(_))));
    assert!(services.borrows.list_for_patron(&ben(), BEN).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_late_return_freezes_plan_adjusted_fine() {
    let (store, services) = setup().await;
    let today = Utc::now();
    let record = seed_borrowed(&store, 1, today - Duration::days(5)).await;

    let view = services.borrows.get(&ana(), record.id).await.unwrap();
    assert_eq!(view.display_status, DisplayStatus::Overdue);
    assert_eq!(view.displayed_fine, Decimal::from(48));

    let returned = services.borrows.return_item(&ana(), record.id, None).await.unwrap();
    assert_eq!(returned.status, BorrowStatus::Returned);
    assert_eq!(returned.fine_amount, Decimal::from(48));
    assert!(returned.return_date.is_some());

    // frozen: a later read does not keep accruing
    let later = services
        .borrows
        .get_fine(&ana(), record.id, today + Duration::days(30))
        .await
        .unwrap();
    assert_eq!(later.displayed, Decimal::from(48));
    assert_eq!(later.status, DisplayStatus::Returned);
}

#[tokio::test]
async fn test_return_with_damaged_condition_is_rejected() {
    let (store, services) = setup().await;
    let record = seed_borrowed(&store, 1, Utc::now() + Duration::days(2)).await;

    let result = services
        .borrows
        .return_item(&ana(), record.id, Some(BookCondition::Damaged))
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(BorrowStore::get(store.as_ref(), record.id).await.unwrap(), record);
}

#[tokio::test]
async fn test_terminal_record_refuses_further_transitions() {
    let (store, services) = setup().await;
    let record = seed_borrowed(&store, 1, Utc::now() + Duration::days(2)).await;

    let lost = services
        .borrows
        .report_damage_or_loss(&librarian(), record.id, DamageKind::Lost, Decimal::from(500))
        .await
        .unwrap();
    assert_eq!(lost.status, BorrowStatus::Lost);
    assert!(lost.return_date.is_none());

    assert!(matches!(
        services.borrows.return_item(&ana(), record.id, None).await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        services.borrows.renew(&ana(), record.id, None).await,
        Err(AppError::Conflict(_))
    ));
    assert_eq!(BorrowStore::get(store.as_ref(), record.id).await.unwrap(), lost);
}

#[tokio::test]
async fn test_other_member_cannot_return_loan() {
    let (store, services) = setup().await;
    let record = seed_borrowed(&store, 1, Utc::now()).await;

    let result = services.borrows.return_item(&ben(), record.id, None).await;
    assert!(matches!(result, Err(AppError::Authorization(_))));
    assert_eq!(BorrowStore::get(store.as_ref(), record.id).await.unwrap(), record);
}

#[tokio::test]
async fn test_reject_stores_reason() {
    let (_store, services) = setup().await;
    let requested = services.borrows.request_borrow(&ana(), request(DUNE)).await.unwrap();

    let rejected = services
        .borrows
        .reject(&librarian(), requested.id, "Reserved for a class")
        .await
        .unwrap();
    assert_eq!(rejected.status, BorrowStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("Reserved for a class"));

    let approve = services.borrows.approve(&librarian(), requested.id, None).await;
    assert!(matches!(approve, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_assessment_raises_and_waive_lowers() {
    let (store, services) = setup().await;
    let today = Utc::now();
    seed_borrowed(&store, 1, today - Duration::days(2)).await;
    seed_borrowed(&store, 2, today + Duration::days(2)).await;

    let assessed = services
        .borrows
        .assess_overdue_fines(&librarian(), today)
        .await
        .unwrap();
    assert_eq!(assessed.len(), 1);
    assert_eq!(assessed[0].fine_amount, Decimal::new(192, 1));

    // running again with an earlier date never lowers the confirmed fine
    let again = services
        .borrows
        .assess_overdue_fines(&librarian(), today - Duration::days(1))
        .await
        .unwrap();
    assert!(again.is_empty());
    let fine = services.borrows.get_fine(&ana(), 1, today - Duration::days(1)).await.unwrap();
    assert_eq!(fine.displayed, Decimal::new(192, 1));

    let waived = services.borrows.waive_fine(&librarian(), 1).await.unwrap();
    assert_eq!(waived.fine_amount, Decimal::ZERO);
    let fine = services.borrows.get_fine(&ana(), 1, today + Duration::days(10)).await.unwrap();
    assert_eq!(fine.displayed, Decimal::ZERO);
    assert!(fine.waived);
}

#[tokio::test]
async fn test_balance_counts_only_unpaid_fines() {
    let (store, services) = setup().await;
    let today = Utc::now();
    seed_borrowed(&store, 1, today - Duration::days(5)).await;
    seed_borrowed(&store, 2, today).await;
    services
        .borrows
        .report_damage_or_loss(&librarian(), 2, DamageKind::Damaged, Decimal::from(150))
        .await
        .unwrap();

    let balance = services.borrows.get_balance(&ana(), ANA, today).await.unwrap();
    assert_eq!(balance.total_outstanding, Decimal::from(198));
    assert_eq!(balance.records.len(), 2);

    assert!(matches!(
        services.borrows.get_balance(&ben(), ANA, today).await,
        Err(AppError::Authorization(_))
    ));
}

#[tokio::test]
async fn test_confirmed_mutation_survives_stale_poll() {
    let (store, services) = setup().await;
    let record = seed_borrowed(&store, 1, Utc::now() + Duration::days(3)).await;

    let mut view = RecordView::new();
    let poll = view.begin_poll();
    let snapshot = services.borrows.list_for_patron(&ana(), ANA).await.unwrap();

    let returned = services.borrows.return_item(&ana(), record.id, None).await.unwrap();
    assert!(view.confirm(returned.clone()));

    let outcome = view.merge_poll(poll, snapshot.into_iter().map(|v| v.record).collect());
    assert_eq!(outcome, MergeOutcome::Applied { replaced: 0, kept: 1 });
    assert_eq!(view.get(record.id).unwrap().record.status, BorrowStatus::Returned);
}
