//! Payment model and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::AppError;

/// What a payment settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum PaymentCategory {
    Fine,
    Membership,
}

impl PaymentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentCategory::Fine => "Fine",
            PaymentCategory::Membership => "Membership",
        }
    }
}

impl std::fmt::Display for PaymentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fine" => Ok(PaymentCategory::Fine),
            "membership" => Ok(PaymentCategory::Membership),
            _ => Err(format!("Invalid payment category: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Initiated,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Initiated => "INITIATED",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    /// Accepts the labels the payment screens use ("PENDING", "RECEIVED") as aliases
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INITIATED" | "PENDING" => Ok(PaymentStatus::Initiated),
            "SUCCESS" | "RECEIVED" | "PAID" => Ok(PaymentStatus::Success),
            "FAILED" => Ok(PaymentStatus::Failed),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

/// Channel a payment went through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    Online,
    Offline,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Online => "ONLINE",
            PaymentMode::Offline => "OFFLINE",
        }
    }
}

impl std::str::FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ONLINE" => Ok(PaymentMode::Online),
            "OFFLINE" => Ok(PaymentMode::Offline),
            _ => Err(format!("Invalid payment mode: {}", s)),
        }
    }
}

/// Payment entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: i64,
    pub category: PaymentCategory,
    pub transaction_id: Option<String>,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub mode: PaymentMode,
    pub patron_id: i64,
    /// Patron for self-service payments, librarian for offline entries
    pub recorded_by: Option<String>,
    /// Borrow record id for fines, membership request id for memberships
    pub linked_record_id: Option<i64>,
    pub member_name: Option<String>,
    pub member_email: Option<String>,
    pub book_title: Option<String>,
    pub received_by: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Payment row as stored in database
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: i64,
    pub category: String,
    pub transaction_id: Option<String>,
    pub amount: Decimal,
    pub status: String,
    pub mode: String,
    pub patron_id: i64,
    pub recorded_by: Option<String>,
    pub borrow_record_id: Option<i64>,
    pub membership_request_id: Option<i64>,
    pub member_name: Option<String>,
    pub member_email: Option<String>,
    pub book_title: Option<String>,
    pub received_by: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let category: PaymentCategory = row.category.parse().map_err(AppError::Internal)?;
        let linked_record_id = match category {
            PaymentCategory::Fine => row.borrow_record_id,
            PaymentCategory::Membership => row.membership_request_id,
        };

        Ok(Payment {
            id: row.id,
            category,
            transaction_id: row.transaction_id,
            amount: row.amount,
            status: row.status.parse().map_err(AppError::Internal)?,
            mode: row.mode.parse().map_err(AppError::Internal)?,
            patron_id: row.patron_id,
            recorded_by: row.recorded_by,
            linked_record_id,
            member_name: row.member_name,
            member_email: row.member_email,
            book_title: row.book_title,
            received_by: row.received_by,
            received_at: row.received_at,
            created_at: row.created_at,
        })
    }
}

/// New payment to insert
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub category: PaymentCategory,
    pub transaction_id: String,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub mode: PaymentMode,
    pub patron_id: i64,
    pub recorded_by: Option<String>,
    pub linked_record_id: Option<i64>,
    pub member_name: Option<String>,
    pub member_email: Option<String>,
    pub book_title: Option<String>,
    pub received_by: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Status reported back by the payment gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayOutcome {
    Success,
    Failed,
}

/// What an offline payment settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "category")]
pub enum OfflinePaymentTarget {
    Fine { borrow_id: i64 },
    Membership { membership_request_id: i64 },
}

/// Offline payment recorded at the desk by a librarian
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RecordOfflinePayment {
    pub target: OfflinePaymentTarget,
    /// Fines default to the currently displayed fine
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    /// Cash already collected; otherwise left pending until marked received
    #[serde(default)]
    pub received: bool,
}

/// Gateway verification result posted back after checkout
#[derive(Debug, Deserialize, ToSchema)]
pub struct GatewayResult {
    pub outcome: GatewayOutcome,
}

/// Online fine payment request
#[derive(Debug, Deserialize, ToSchema)]
pub struct InitiateFinePayment {
    pub borrow_id: i64,
}
