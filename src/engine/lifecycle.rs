//! Borrow record state machine
//!
//! REQUESTED -> BORROWED -> {RETURNED | DAMAGED | LOST}, or REQUESTED -> REJECTED.
//! Each transition takes the current record and returns the next one, leaving
//! the input untouched, so a failed transition never mutates anything. These
//! functions are the only place `fine_amount` is written.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use super::fines;
use crate::{
    error::{AppError, AppResult},
    models::{BookCondition, BorrowRecord, BorrowStatus, DamageKind, PaymentMode, PlanTerms},
};

/// `at` pushed back by `days`, or a Validation error when out of range
pub fn add_days(at: DateTime<Utc>, days: i64) -> AppResult<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or_else(|| AppError::Validation(format!("{} days is out of range", days)))
}

fn ensure_not_terminal(record: &BorrowRecord, action: &str) -> AppResult<()> {
    if record.is_terminal() {
        return Err(AppError::Conflict(format!(
            "Cannot {} borrow record {}: it is already {}",
            action, record.id, record.status
        )));
    }
    Ok(())
}

fn ensure_borrowed(record: &BorrowRecord, action: &str) -> AppResult<()> {
    ensure_not_terminal(record, action)?;
    if record.status != BorrowStatus::Borrowed {
        return Err(AppError::Conflict(format!(
            "Cannot {} borrow record {}: it has not been approved",
            action, record.id
        )));
    }
    Ok(())
}

/// REQUESTED -> BORROWED, due `duration_days` after `now`
pub fn approve(record: &BorrowRecord, duration_days: i64, now: DateTime<Utc>) -> AppResult<BorrowRecord> {
    if duration_days <= 0 {
        return Err(AppError::Validation(
            "Loan duration must be at least one day".to_string(),
        ));
    }
    if record.status != BorrowStatus::Requested {
        return Err(AppError::Conflict(format!(
            "Cannot approve borrow record {}: it is {}",
            record.id, record.status
        )));
    }

    let mut next = record.clone();
    next.status = BorrowStatus::Borrowed;
    next.borrow_date = now;
    next.due_date = Some(add_days(now, duration_days)?);
    Ok(next)
}

/// REQUESTED -> REJECTED; no fine applies
pub fn reject(record: &BorrowRecord, reason: &str) -> AppResult<BorrowRecord> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation("A rejection reason is required".to_string()));
    }
    if record.status != BorrowStatus::Requested {
        return Err(AppError::Conflict(format!(
            "Cannot reject borrow record {}: it is {}",
            record.id, record.status
        )));
    }

    let mut next = record.clone();
    next.status = BorrowStatus::Rejected;
    next.rejection_reason = Some(reason.to_string());
    next.fine_amount = Decimal::ZERO;
    Ok(next)
}

/// BORROWED -> RETURNED at `at`, freezing the fine computed at that instant
pub fn mark_returned(
    record: &BorrowRecord,
    at: DateTime<Utc>,
    condition: Option<BookCondition>,
    plan: &PlanTerms,
) -> AppResult<BorrowRecord> {
    if matches!(condition, Some(BookCondition::Damaged | BookCondition::Lost)) {
        return Err(AppError::Validation(
            "Damaged or lost items must be reported, not returned".to_string(),
        ));
    }
    ensure_borrowed(record, "return")?;

    let mut next = record.clone();
    next.fine_amount = fines::displayed_fine(record, at, plan);
    next.status = BorrowStatus::Returned;
    next.return_date = Some(at);
    next.book_condition = Some(condition.unwrap_or(BookCondition::Good));
    Ok(next)
}

/// BORROWED -> DAMAGED | LOST with a fine supplied by the librarian.
///
/// The supplied amount is authoritative immediately; no return date is set.
pub fn report_damage_or_loss(
    record: &BorrowRecord,
    kind: DamageKind,
    fine_amount: Decimal,
) -> AppResult<BorrowRecord> {
    if fine_amount < Decimal::ZERO {
        return Err(AppError::Validation("Fine amount cannot be negative".to_string()));
    }
    ensure_borrowed(record, "report")?;

    let mut next = record.clone();
    next.status = kind.status();
    next.book_condition = Some(kind.condition());
    next.fine_amount = fine_amount.round_dp(2);
    next.return_date = None;
    Ok(next)
}

/// Confirm the accrued fine of an active loan; only ever raises it
pub fn confirm_accrued_fine(record: &BorrowRecord, accrued: Decimal) -> AppResult<BorrowRecord> {
    ensure_borrowed(record, "assess")?;

    let mut next = record.clone();
    if !record.fine_waived {
        next.fine_amount = record.fine_amount.max(accrued).max(Decimal::ZERO);
    }
    Ok(next)
}

/// Explicitly waive the fine; the only way to lower a confirmed amount
pub fn waive_fine(record: &BorrowRecord) -> AppResult<BorrowRecord> {
    if matches!(record.status, BorrowStatus::Requested | BorrowStatus::Rejected) {
        return Err(AppError::Conflict(format!(
            "Borrow record {} has no fine to waive",
            record.id
        )));
    }
    if record.fine_paid && !record.fine_waived {
        return Err(AppError::Conflict(format!(
            "Fine of borrow record {} is already paid",
            record.id
        )));
    }

    let mut next = record.clone();
    next.fine_amount = Decimal::ZERO;
    next.fine_paid = true;
    next.fine_waived = true;
    Ok(next)
}

/// Attach a payment to a resolved record, marking the fine paid when `settled`
pub fn record_fine_payment(record: &BorrowRecord, mode: PaymentMode, settled: bool) -> AppResult<BorrowRecord> {
    if !matches!(
        record.status,
        BorrowStatus::Returned | BorrowStatus::Damaged | BorrowStatus::Lost
    ) {
        return Err(AppError::Conflict(format!(
            "Fine of borrow record {} can only be paid once the loan is resolved",
            record.id
        )));
    }
    if record.fine_paid {
        return Err(AppError::Conflict(format!(
            "Fine of borrow record {} is already settled",
            record.id
        )));
    }

    let mut next = record.clone();
    next.payment_mode = Some(mode);
    next.fine_paid = settled;
    Ok(next)
}
