//! Payment classification and normalization
//!
//! Payment records arrive from two collections with inconsistent shapes
//! (snake_case or camelCase keys, nested objects, missing fields). Every
//! canonical field is resolved through one ordered alias table; the first
//! non-empty alias wins.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::models::{PaymentCategory, PaymentStatus};

/// Canonical payment fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalField {
    Id,
    TransactionId,
    PatronId,
    MemberName,
    MemberEmail,
    BookTitle,
    Amount,
    Status,
    CreatedAt,
    RecordedBy,
    BorrowId,
    MembershipRequestId,
}

impl CanonicalField {
    /// Source keys in priority order; dotted keys reach into nested objects
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            CanonicalField::Id => &["id", "paymentId", "payment_id"],
            CanonicalField::TransactionId => &["transactionId", "transaction_id"],
            CanonicalField::PatronId => &["patronId", "patron_id", "userId", "user_id", "user.id"],
            CanonicalField::MemberName => &["memberName", "member_name", "userName", "user.name"],
            CanonicalField::MemberEmail => &["memberEmail", "member_email", "userEmail", "user.email"],
            CanonicalField::BookTitle => &["bookTitle", "book_title", "book.title"],
            CanonicalField::Amount => &["amount", "fineAmount", "fine_amount"],
            CanonicalField::Status => &["status", "payment_status", "paymentStatus"],
            CanonicalField::CreatedAt => &[
                "createdAt",
                "created_at",
                "paymentDate",
                "payment_date",
                "returnDate",
                "return_date",
            ],
            CanonicalField::RecordedBy => &[
                "recordedBy",
                "recorded_by",
                "recorded_by_name",
                "recordedByName",
            ],
            CanonicalField::BorrowId => &["borrowId", "borrow_id", "borrowRecordId", "borrow_record_id"],
            CanonicalField::MembershipRequestId => &["membershipRequestId", "membership_request_id"],
        }
    }
}

fn lookup<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(raw, |value, key| value.get(key))
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First non-empty alias value, as text
pub fn resolve(raw: &Value, field: CanonicalField) -> Option<String> {
    field
        .aliases()
        .iter()
        .find_map(|alias| lookup(raw, alias).and_then(as_text))
}

/// Whether any alias key is present with a non-null value, even a blank one
fn is_present(raw: &Value, field: CanonicalField) -> bool {
    field
        .aliases()
        .iter()
        .any(|alias| lookup(raw, alias).map_or(false, |v| !v.is_null()))
}

fn resolve_id(raw: &Value, field: CanonicalField) -> Option<i64> {
    resolve(raw, field)
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|id| *id > 0)
}

/// Coerce an amount; anything unparsable or negative counts as zero
pub fn coerce_amount(value: Option<&str>) -> Decimal {
    value
        .and_then(|s| {
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()
        })
        .filter(|amount| *amount >= Decimal::ZERO)
        .unwrap_or(Decimal::ZERO)
}

/// Parse the timestamp shapes the two sources emit
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(millis) = value.as_i64() {
        return Utc.timestamp_millis_opt(millis).single();
    }

    let s = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Infer what a raw payment settles; first matching rule wins
pub fn classify(raw: &Value) -> PaymentCategory {
    if resolve(raw, CanonicalField::BookTitle).is_some()
        || resolve_id(raw, CanonicalField::BorrowId).is_some()
    {
        return PaymentCategory::Fine;
    }
    if resolve_id(raw, CanonicalField::MembershipRequestId).is_some() {
        return PaymentCategory::Membership;
    }

    let transaction = resolve(raw, CanonicalField::TransactionId)
        .unwrap_or_default()
        .to_lowercase();
    if transaction.contains("fine") || transaction.contains("borrow") {
        return PaymentCategory::Fine;
    }
    if transaction.contains("member") || transaction.contains("plan") {
        return PaymentCategory::Membership;
    }

    let amount = coerce_amount(resolve(raw, CanonicalField::Amount).as_deref());
    if amount > Decimal::ZERO && is_present(raw, CanonicalField::BookTitle) {
        return PaymentCategory::Fine;
    }

    PaymentCategory::Membership
}

/// Collection a ledger entry was fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LedgerSource {
    Membership,
    Fine,
}

/// Canonical payment entity shown in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LedgerEntry {
    pub id: Option<i64>,
    pub category: PaymentCategory,
    pub transaction_id: Option<String>,
    pub patron_id: Option<i64>,
    pub member_name: String,
    pub member_email: String,
    pub book_title: Option<String>,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub recorded_by: Option<String>,
    /// Borrow record id for fines, membership request id for memberships
    pub linked_record_id: Option<i64>,
    pub source: LedgerSource,
}

/// Map one raw payment into the canonical entity
pub fn normalize(raw: &Value, source: LedgerSource) -> LedgerEntry {
    let category = classify(raw);
    let amount = coerce_amount(resolve(raw, CanonicalField::Amount).as_deref());

    let status = CanonicalField::Status
        .aliases()
        .iter()
        .filter_map(|alias| lookup(raw, alias).and_then(as_text))
        .find_map(|s| PaymentStatus::from_str(&s).ok())
        .unwrap_or(if amount > Decimal::ZERO {
            PaymentStatus::Success
        } else {
            PaymentStatus::Initiated
        });

    let created_at = CanonicalField::CreatedAt
        .aliases()
        .iter()
        .filter_map(|alias| lookup(raw, alias))
        .find_map(parse_timestamp);

    let book_title = resolve(raw, CanonicalField::BookTitle).or_else(|| {
        (category == PaymentCategory::Fine).then(|| "Unknown Book".to_string())
    });

    let linked_record_id = match category {
        PaymentCategory::Fine => resolve_id(raw, CanonicalField::BorrowId),
        PaymentCategory::Membership => resolve_id(raw, CanonicalField::MembershipRequestId),
    };

    LedgerEntry {
        id: resolve_id(raw, CanonicalField::Id),
        category,
        transaction_id: resolve(raw, CanonicalField::TransactionId),
        patron_id: resolve_id(raw, CanonicalField::PatronId),
        member_name: resolve(raw, CanonicalField::MemberName).unwrap_or_else(|| "Unknown".to_string()),
        member_email: resolve(raw, CanonicalField::MemberEmail).unwrap_or_default(),
        book_title,
        amount,
        status,
        created_at,
        recorded_by: resolve(raw, CanonicalField::RecordedBy),
        linked_record_id,
        source,
    }
}
