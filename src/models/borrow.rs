//! Borrow record model and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::payment::PaymentMode;
use crate::error::AppError;

// ---------------------------------------------------------------------------
// BorrowStatus
// ---------------------------------------------------------------------------

/// Persisted lifecycle status of a borrow record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BorrowStatus {
    Requested,
    Borrowed,
    Returned,
    Damaged,
    Lost,
    Rejected,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Requested => "REQUESTED",
            BorrowStatus::Borrowed => "BORROWED",
            BorrowStatus::Returned => "RETURNED",
            BorrowStatus::Damaged => "DAMAGED",
            BorrowStatus::Lost => "LOST",
            BorrowStatus::Rejected => "REJECTED",
        }
    }

    /// No lifecycle transition may leave a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BorrowStatus::Returned | BorrowStatus::Damaged | BorrowStatus::Lost | BorrowStatus::Rejected
        )
    }
}

impl std::fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "REQUESTED" => Ok(BorrowStatus::Requested),
            "BORROWED" => Ok(BorrowStatus::Borrowed),
            "RETURNED" => Ok(BorrowStatus::Returned),
            "DAMAGED" => Ok(BorrowStatus::Damaged),
            "LOST" => Ok(BorrowStatus::Lost),
            "REJECTED" => Ok(BorrowStatus::Rejected),
            _ => Err(format!("Invalid borrow status: {}", s)),
        }
    }
}

/// Status shown to users; OVERDUE is derived and never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayStatus {
    Requested,
    Borrowed,
    Overdue,
    Returned,
    Damaged,
    Lost,
    Rejected,
}

impl From<BorrowStatus> for DisplayStatus {
    fn from(status: BorrowStatus) -> Self {
        match status {
            BorrowStatus::Requested => DisplayStatus::Requested,
            BorrowStatus::Borrowed => DisplayStatus::Borrowed,
            BorrowStatus::Returned => DisplayStatus::Returned,
            BorrowStatus::Damaged => DisplayStatus::Damaged,
            BorrowStatus::Lost => DisplayStatus::Lost,
            BorrowStatus::Rejected => DisplayStatus::Rejected,
        }
    }
}

// ---------------------------------------------------------------------------
// BookCondition / DamageKind
// ---------------------------------------------------------------------------

/// Condition of the item as recorded at resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookCondition {
    Good,
    Bad,
    Damaged,
    Lost,
}

impl BookCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookCondition::Good => "GOOD",
            BookCondition::Bad => "BAD",
            BookCondition::Damaged => "DAMAGED",
            BookCondition::Lost => "LOST",
        }
    }
}

impl std::str::FromStr for BookCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GOOD" => Ok(BookCondition::Good),
            "BAD" => Ok(BookCondition::Bad),
            "DAMAGED" => Ok(BookCondition::Damaged),
            "LOST" => Ok(BookCondition::Lost),
            _ => Err(format!("Invalid book condition: {}", s)),
        }
    }
}

/// What a librarian reports instead of a regular return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DamageKind {
    Damaged,
    Lost,
}

impl DamageKind {
    pub fn status(&self) -> BorrowStatus {
        match self {
            DamageKind::Damaged => BorrowStatus::Damaged,
            DamageKind::Lost => BorrowStatus::Lost,
        }
    }

    pub fn condition(&self) -> BookCondition {
        match self {
            DamageKind::Damaged => BookCondition::Damaged,
            DamageKind::Lost => BookCondition::Lost,
        }
    }
}

// ---------------------------------------------------------------------------
// BorrowRecord
// ---------------------------------------------------------------------------

/// One loan of one catalog item to one patron
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BorrowRecord {
    pub id: i64,
    pub item_id: i64,
    pub patron_id: i64,
    pub item_title: Option<String>,
    pub borrow_date: DateTime<Utc>,
    /// Unset until approval
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub renew_count: i32,
    #[schema(value_type = String)]
    pub fine_amount: Decimal,
    pub fine_paid: bool,
    pub fine_waived: bool,
    pub payment_mode: Option<PaymentMode>,
    pub book_condition: Option<BookCondition>,
    pub rejection_reason: Option<String>,
    /// Incremented by the store on every persisted write
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl BorrowRecord {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Borrow record row as stored in database
#[derive(Debug, Clone, FromRow)]
pub struct BorrowRecordRow {
    pub id: i64,
    pub item_id: i64,
    pub patron_id: i64,
    pub item_title: Option<String>,
    pub borrow_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: String,
    pub renew_count: i32,
    pub fine_amount: Decimal,
    pub fine_paid: bool,
    pub fine_waived: bool,
    pub payment_mode: Option<String>,
    pub book_condition: Option<String>,
    pub rejection_reason: Option<String>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BorrowRecordRow> for BorrowRecord {
    type Error = AppError;

    fn try_from(row: BorrowRecordRow) -> Result<Self, Self::Error> {
        Ok(BorrowRecord {
            id: row.id,
            item_id: row.item_id,
            patron_id: row.patron_id,
            item_title: row.item_title,
            borrow_date: row.borrow_date,
            due_date: row.due_date,
            return_date: row.return_date,
            status: row.status.parse().map_err(AppError::Internal)?,
            renew_count: row.renew_count,
            fine_amount: row.fine_amount,
            fine_paid: row.fine_paid,
            fine_waived: row.fine_waived,
            payment_mode: row
                .payment_mode
                .map(|m| m.parse())
                .transpose()
                .map_err(AppError::Internal)?,
            book_condition: row
                .book_condition
                .map(|c| c.parse())
                .transpose()
                .map_err(AppError::Internal)?,
            rejection_reason: row.rejection_reason,
            version: row.version,
            updated_at: row.updated_at,
        })
    }
}

/// New borrow request to insert
#[derive(Debug, Clone)]
pub struct NewBorrowRecord {
    pub item_id: i64,
    pub patron_id: i64,
    pub item_title: Option<String>,
    pub borrow_date: DateTime<Utc>,
}

/// Borrow record as shown to users
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BorrowView {
    #[serde(flatten)]
    pub record: BorrowRecord,
    pub display_status: DisplayStatus,
    #[schema(value_type = String)]
    pub displayed_fine: Decimal,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Borrow request body
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBorrowRequest {
    #[validate(range(min = 1, message = "Invalid item id"))]
    pub item_id: i64,
    /// Defaults to the caller; staff may request on behalf of a patron
    pub patron_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct ApproveBorrow {
    /// Defaults to the patron's plan, then to the configured duration
    #[validate(range(min = 1, max = 365, message = "Loan duration must be between 1 and 365 days"))]
    pub duration_days: Option<i64>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RejectBorrow {
    #[validate(length(min = 1, message = "A rejection reason is required"))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReturnBorrow {
    pub condition: Option<BookCondition>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportDamageOrLoss {
    pub kind: DamageKind,
    #[schema(value_type = String)]
    pub fine_amount: Decimal,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct RenewBorrow {
    #[validate(range(min = 1, max = 90, message = "Renewal extension must be between 1 and 90 days"))]
    pub extension_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AssessFines {
    /// Defaults to now
    pub today: Option<DateTime<Utc>>,
}
