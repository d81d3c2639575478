//! Reconciliation ledger: merged, sorted view of fine and membership payments

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use utoipa::{IntoParams, ToSchema};

use super::classifier::{normalize, LedgerEntry, LedgerSource};
use crate::{
    error::{AppError, AppResult},
    models::{PaymentCategory, PaymentStatus},
};

/// Aggregates over every merged entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct LedgerStats {
    pub total: usize,
    pub initiated: usize,
    pub success: usize,
    pub failed: usize,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    pub fine_count: usize,
    #[schema(value_type = String)]
    pub fine_amount: Decimal,
    pub membership_count: usize,
    #[schema(value_type = String)]
    pub membership_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Ledger {
    pub entries: Vec<LedgerEntry>,
    pub stats: LedgerStats,
    /// One line per source that could not be fetched
    pub warnings: Vec<String>,
}

pub fn compute_stats(entries: &[LedgerEntry]) -> LedgerStats {
    entries.iter().fold(LedgerStats::default(), |mut stats, entry| {
        stats.total += 1;
        stats.total_amount += entry.amount;
        match entry.status {
            PaymentStatus::Initiated => stats.initiated += 1,
            PaymentStatus::Success => stats.success += 1,
            PaymentStatus::Failed => stats.failed += 1,
        }
        match entry.category {
            PaymentCategory::Fine => {
                stats.fine_count += 1;
                stats.fine_amount += entry.amount;
            }
            PaymentCategory::Membership => {
                stats.membership_count += 1;
                stats.membership_amount += entry.amount;
            }
        }
        stats
    })
}

/// Newest first; entries without a date go last, ties keep fetch order
fn newest_first(a: &LedgerEntry, b: &LedgerEntry) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Merge both payment collections into one ledger.
///
/// A failed source degrades the ledger to the other one plus a warning; only
/// when both fail is the error surfaced.
pub fn build_ledger(
    membership_payments: AppResult<Vec<Value>>,
    fine_payments: AppResult<Vec<Value>>,
) -> AppResult<Ledger> {
    let mut warnings = Vec::new();
    let mut entries = Vec::new();
    let mut failures = 0;

    for (source, fetched) in [
        (LedgerSource::Membership, membership_payments),
        (LedgerSource::Fine, fine_payments),
    ] {
        match fetched {
            Ok(raws) => entries.extend(raws.iter().map(|raw| normalize(raw, source))),
            Err(e) => {
                failures += 1;
                warnings.push(format!("{:?} payments unavailable: {}", source, e));
            }
        }
    }

    if failures == 2 {
        return Err(AppError::UpstreamUnavailable(
            "Neither membership nor fine payments could be fetched".to_string(),
        ));
    }

    entries.sort_by(newest_first);
    let stats = compute_stats(&entries);

    Ok(Ledger {
        entries,
        stats,
        warnings,
    })
}

/// Status filter used by the payment screens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Received,
    Failed,
}

impl StatusFilter {
    fn matches(&self, status: PaymentStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => status == PaymentStatus::Initiated,
            StatusFilter::Received => status == PaymentStatus::Success,
            StatusFilter::Failed => status == PaymentStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerSort {
    #[default]
    DateDesc,
    DateAsc,
    AmountDesc,
    AmountAsc,
}

/// Display projection over ledger entries
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LedgerQuery {
    /// Matches member name/email, book title, transaction id or category
    pub search: Option<String>,
    #[serde(default)]
    pub status: StatusFilter,
    pub category: Option<PaymentCategory>,
    #[serde(default)]
    pub sort: LedgerSort,
}

fn matches_search(entry: &LedgerEntry, needle: &str) -> bool {
    let contains = |s: &str| s.to_lowercase().contains(needle);
    contains(&entry.member_name)
        || contains(&entry.member_email)
        || entry.book_title.as_deref().map_or(false, contains)
        || entry.transaction_id.as_deref().map_or(false, contains)
        || contains(entry.category.as_str())
}

/// Filter and order entries without touching the ledger
pub fn project<'a>(entries: &'a [LedgerEntry], query: &LedgerQuery) -> Vec<&'a LedgerEntry> {
    let needle = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut selected: Vec<&LedgerEntry> = entries
        .iter()
        .filter(|e| query.status.matches(e.status))
        .filter(|e| query.category.map_or(true, |c| e.category == c))
        .filter(|e| needle.as_deref().map_or(true, |n| matches_search(e, n)))
        .collect();

    match query.sort {
        LedgerSort::DateDesc => selected.sort_by(|a, b| newest_first(a, b)),
        LedgerSort::DateAsc => selected.sort_by(|a, b| match (a.created_at, b.created_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
        LedgerSort::AmountDesc => selected.sort_by(|a, b| b.amount.cmp(&a.amount)),
        LedgerSort::AmountAsc => selected.sort_by(|a, b| a.amount.cmp(&b.amount)),
    }

    selected
}
