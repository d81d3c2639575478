//! Record builders shared by engine unit tests

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::{BorrowRecord, BorrowStatus, PlanTerms};

pub fn requested_record() -> BorrowRecord {
    let now = Utc::now();
    BorrowRecord {
        id: 1,
        item_id: 10,
        patron_id: 100,
        item_title: Some("Dune".to_string()),
        borrow_date: now,
        due_date: None,
        return_date: None,
        status: BorrowStatus::Requested,
        renew_count: 0,
        fine_amount: Decimal::ZERO,
        fine_paid: false,
        fine_waived: false,
        payment_mode: None,
        book_condition: None,
        rejection_reason: None,
        version: 1,
        updated_at: now,
    }
}

pub fn borrowed_record(due_date: DateTime<Utc>) -> BorrowRecord {
    BorrowRecord {
        status: BorrowStatus::Borrowed,
        due_date: Some(due_date),
        ..requested_record()
    }
}

pub fn plan(fine_per_day: i64, fine_multiplier: Decimal) -> PlanTerms {
    PlanTerms {
        fine_per_day: Decimal::from(fine_per_day),
        borrowing_limit: 3,
        fine_multiplier,
        borrow_duration_days: Some(14),
        renewal_days: Some(7),
    }
}
