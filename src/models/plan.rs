//! Read-only catalog, patron and plan data supplied by external providers

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::FinesConfig;

/// Per-membership-tier parameters that shape loans and fines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlanTerms {
    #[schema(value_type = String)]
    pub fine_per_day: Decimal,
    pub borrowing_limit: i32,
    /// 0.5 for discounted tiers, 1.2 for surcharge tiers
    #[schema(value_type = String)]
    pub fine_multiplier: Decimal,
    pub borrow_duration_days: Option<i64>,
    pub renewal_days: Option<i64>,
}

impl PlanTerms {
    /// Terms for a patron whose plan is unknown; no borrowing limit is enforced
    pub fn fallback(fines: &FinesConfig) -> Self {
        Self {
            fine_per_day: fines.default_fine_per_day,
            borrowing_limit: i32::MAX,
            fine_multiplier: fines.default_fine_multiplier,
            borrow_duration_days: None,
            renewal_days: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatronInfo {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipRequestInfo {
    pub id: i64,
    pub patron_id: i64,
    pub plan_name: Option<String>,
    pub fee: Option<Decimal>,
}
