//! Payment reconciliation ledger endpoint

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    engine::ledger::{Ledger, LedgerQuery},
    error::AppResult,
    AppState,
};

use super::AuthenticatedUser;

/// Merged fine and membership payments.
///
/// Staff see every entry, members only their own. When one payment source is
/// down the response carries what is available plus a warning.
#[utoipa::path(
    get,
    path = "/ledger",
    tag = "ledger",
    security(("bearer_auth" = [])),
    params(LedgerQuery),
    responses(
        (status = 200, description = "Ledger entries and stats", body = Ledger),
        (status = 503, description = "No payment source reachable")
    )
)]
pub async fn get_ledger(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Query(query): Query<LedgerQuery>,
) -> AppResult<Json<Ledger>> {
    Ok(Json(state.services.payments.get_ledger(&session, &query).await?))
}
