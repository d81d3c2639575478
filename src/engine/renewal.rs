//! Renewal policy
//!
//! A renewal is checked and planned locally, then persisted by the store, which
//! owns the new due date. The locally computed date is only a provisional value
//! for optimistic display until the store's answer replaces it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::lifecycle::add_days;
use crate::{
    error::{AppError, AppResult},
    models::{BorrowRecord, BorrowStatus},
};

/// Hard cap on renewals per loan
pub const MAX_RENEWALS: i32 = 2;

/// A renewal that passed the policy checks and awaits confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalPlan {
    pub record_id: i64,
    /// Version the store must still hold for the renewal to apply
    pub expected_version: i64,
    pub extension_days: i64,
    pub provisional_due_date: DateTime<Utc>,
    pub next_renew_count: i32,
}

/// Confirmed renewal
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Renewal {
    pub record: crate::models::BorrowRecord,
    pub provisional_due_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Effective cap: configuration may lower it, never raise it
pub fn renewal_cap(configured: i32) -> i32 {
    configured.clamp(0, MAX_RENEWALS)
}

pub fn plan_renewal(record: &BorrowRecord, extension_days: i64, max_renewals: i32) -> AppResult<RenewalPlan> {
    if extension_days <= 0 {
        return Err(AppError::Validation(
            "Renewal extension must be at least one day".to_string(),
        ));
    }
    if record.is_terminal() {
        return Err(AppError::Conflict(format!(
            "Cannot renew borrow record {}: it is already {}",
            record.id, record.status
        )));
    }
    if record.status != BorrowStatus::Borrowed {
        return Err(AppError::Conflict(format!(
            "Cannot renew borrow record {}: it has not been approved",
            record.id
        )));
    }

    let cap = renewal_cap(max_renewals);
    if record.renew_count >= cap {
        return Err(AppError::Conflict(format!(
            "Maximum renewals reached ({}/{})",
            record.renew_count, cap
        )));
    }

    let due_date = record.due_date.ok_or_else(|| {
        AppError::Conflict(format!("Borrow record {} has no due date to extend", record.id))
    })?;

    Ok(RenewalPlan {
        record_id: record.id,
        expected_version: record.version,
        extension_days,
        provisional_due_date: add_days(due_date, extension_days)?,
        next_renew_count: record.renew_count + 1,
    })
}

/// Accept the store's answer for a planned renewal
pub fn confirm_renewal(plan: &RenewalPlan, confirmed: BorrowRecord) -> AppResult<Renewal> {
    if confirmed.id != plan.record_id
        || confirmed.renew_count != plan.next_renew_count
        || confirmed.renew_count > MAX_RENEWALS
    {
        return Err(AppError::Conflict(format!(
            "Renewal of borrow record {} was not applied as planned",
            plan.record_id
        )));
    }

    let due_date = confirmed.due_date.ok_or_else(|| {
        AppError::Internal(format!("Renewed borrow record {} has no due date", confirmed.id))
    })?;

    Ok(Renewal {
        record: confirmed,
        provisional_due_date: plan.provisional_due_date,
        due_date,
    })
}
