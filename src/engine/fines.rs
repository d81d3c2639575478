//! Overdue fine computation
//!
//! Everything here is a pure function of its inputs: the same record, date and
//! plan always yield the same amount, and nothing is mutated. Stored fines only
//! change through the transitions in [`super::lifecycle`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{BorrowRecord, BorrowStatus, DisplayStatus, PlanTerms};

/// Backend-side knowledge about a record's fine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthoritativeFine {
    /// Nothing confirmed yet, the estimate stands alone
    None,
    /// Confirmed non-zero amount; estimates may raise it but never lower it
    Confirmed(Decimal),
    /// Explicitly waived, displayed as zero
    Waived,
}

/// Authoritative fine carried by a stored record
pub fn authoritative_fine(record: &BorrowRecord) -> AuthoritativeFine {
    if record.fine_waived {
        AuthoritativeFine::Waived
    } else if record.fine_amount > Decimal::ZERO {
        AuthoritativeFine::Confirmed(record.fine_amount)
    } else {
        AuthoritativeFine::None
    }
}

/// Whole days past the due date at `today`, never negative
pub fn days_late(record: &BorrowRecord, today: DateTime<Utc>) -> i64 {
    match record.due_date {
        Some(due) => (today - due).num_days().max(0),
        None => 0,
    }
}

/// Date-based estimate of the fine at `today`.
///
/// Terminal records return their stored amount, which is frozen at resolution.
pub fn compute_fine(record: &BorrowRecord, today: DateTime<Utc>, plan: &PlanTerms) -> Decimal {
    if record.is_terminal() {
        return record.fine_amount.max(Decimal::ZERO);
    }
    if record.due_date.is_none() {
        return Decimal::ZERO;
    }

    let late = Decimal::from(days_late(record, today));
    (late * plan.fine_per_day * plan.fine_multiplier)
        .round_dp(2)
        .max(Decimal::ZERO)
}

/// Merge an estimate with what the backend already confirmed
pub fn reconcile(authoritative: AuthoritativeFine, computed: Decimal) -> Decimal {
    match authoritative {
        AuthoritativeFine::Waived => Decimal::ZERO,
        AuthoritativeFine::Confirmed(confirmed) => confirmed.max(computed),
        AuthoritativeFine::None => computed.max(Decimal::ZERO),
    }
}

/// Fine shown to users for `record` at `today`
pub fn displayed_fine(record: &BorrowRecord, today: DateTime<Utc>, plan: &PlanTerms) -> Decimal {
    reconcile(authoritative_fine(record), compute_fine(record, today, plan))
}

/// Persisted status, or OVERDUE for an active loan past its due date
pub fn display_status(record: &BorrowRecord, today: DateTime<Utc>) -> DisplayStatus {
    match (record.status, record.due_date) {
        (BorrowStatus::Borrowed, Some(due)) if due < today => DisplayStatus::Overdue,
        (status, _) => status.into(),
    }
}

/// Full fine picture for one record
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FineAssessment {
    pub record_id: i64,
    pub status: DisplayStatus,
    pub days_late: i64,
    #[schema(value_type = String)]
    pub computed: Decimal,
    #[schema(value_type = Option<String>)]
    pub authoritative: Option<Decimal>,
    pub waived: bool,
    #[schema(value_type = String)]
    pub displayed: Decimal,
    pub fine_paid: bool,
    /// What is still owed on this record
    #[schema(value_type = String)]
    pub outstanding: Decimal,
}

pub fn assess(record: &BorrowRecord, today: DateTime<Utc>, plan: &PlanTerms) -> FineAssessment {
    let authoritative = authoritative_fine(record);
    let computed = compute_fine(record, today, plan);
    let displayed = reconcile(authoritative, computed);

    FineAssessment {
        record_id: record.id,
        status: display_status(record, today),
        days_late: if record.is_terminal() { 0 } else { days_late(record, today) },
        computed,
        authoritative: match authoritative {
            AuthoritativeFine::Confirmed(amount) => Some(amount),
            _ => None,
        },
        waived: authoritative == AuthoritativeFine::Waived,
        displayed,
        fine_paid: record.fine_paid,
        outstanding: if record.fine_paid { Decimal::ZERO } else { displayed },
    }
}

/// What a patron owes right now
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PatronBalance {
    pub patron_id: i64,
    #[schema(value_type = String)]
    pub total_outstanding: Decimal,
    /// Records with something still owed
    pub records: Vec<FineAssessment>,
}

pub fn balance(patron_id: i64, records: &[BorrowRecord], today: DateTime<Utc>, plan: &PlanTerms) -> PatronBalance {
    let records: Vec<FineAssessment> = records
        .iter()
        .filter(|r| r.patron_id == patron_id && !r.fine_paid)
        .map(|r| assess(r, today, plan))
        .filter(|a| a.outstanding > Decimal::ZERO)
        .collect();

    PatronBalance {
        patron_id,
        total_outstanding: records.iter().map(|a| a.outstanding).sum(),
        records,
    }
}
