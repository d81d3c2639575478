//! Borrow lifecycle and fine endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    engine::{
        fines::{FineAssessment, PatronBalance},
        renewal::Renewal,
    },
    error::AppResult,
    models::{
        borrow::{
            ApproveBorrow, AssessFines, CreateBorrowRequest, RejectBorrow, RenewBorrow, ReportDamageOrLoss,
            ReturnBorrow,
        },
        BorrowRecord, BorrowView,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Request a loan
#[utoipa::path(
    post,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = CreateBorrowRequest,
    responses(
        (status = 201, description = "Borrow requested", body = BorrowRecord),
        (status = 403, description = "Not allowed to borrow for this patron"),
        (status = 404, description = "Book or member not found"),
        (status = 409, description = "Borrowing limit reached")
    )
)]
pub async fn request_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Json(request): Json<CreateBorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowRecord>)> {
    request.validate()?;
    let record = state.services.borrows.request_borrow(&session, request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    get,
    path = "/borrows/{id}",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow record ID")),
    responses(
        (status = 200, description = "Borrow record", body = BorrowView),
        (status = 404, description = "Borrow record not found")
    )
)]
pub async fn get_borrow(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<BorrowView>> {
    Ok(Json(state.services.borrows.get(&session, id).await?))
}

/// Approve a borrow request
#[utoipa::path(
    post,
    path = "/borrows/{id}/approve",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow record ID")),
    request_body = ApproveBorrow,
    responses(
        (status = 200, description = "Borrow approved", body = BorrowRecord),
        (status = 409, description = "Record is not a pending request")
    )
)]
pub async fn approve(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<ApproveBorrow>,
) -> AppResult<Json<BorrowRecord>> {
    request.validate()?;
    let record = state
        .services
        .borrows
        .approve(&session, id, request.duration_days)
        .await?;
    Ok(Json(record))
}

#[utoipa::path(
    post,
    path = "/borrows/{id}/reject",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow record ID")),
    request_body = RejectBorrow,
    responses(
        (status = 200, description = "Borrow rejected", body = BorrowRecord),
        (status = 409, description = "Record is not a pending request")
    )
)]
pub async fn reject(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<RejectBorrow>,
) -> AppResult<Json<BorrowRecord>> {
    request.validate()?;
    let record = state.services.borrows.reject(&session, id, &request.reason).await?;
    Ok(Json(record))
}

/// Return a borrowed item; the fine is frozen at return time
#[utoipa::path(
    post,
    path = "/borrows/{id}/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow record ID")),
    request_body = ReturnBorrow,
    responses(
        (status = 200, description = "Item returned", body = BorrowRecord),
        (status = 409, description = "Loan already resolved")
    )
)]
pub async fn return_item(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(id): Path<i64>,
    request: Option<Json<ReturnBorrow>>,
) -> AppResult<Json<BorrowRecord>> {
    let condition = request.and_then(|Json(r)| r.condition);
    let record = state.services.borrows.return_item(&session, id, condition).await?;
    Ok(Json(record))
}

#[utoipa::path(
    post,
    path = "/borrows/{id}/report",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow record ID")),
    request_body = ReportDamageOrLoss,
    responses(
        (status = 200, description = "Damage or loss recorded", body = BorrowRecord),
        (status = 400, description = "Negative fine"),
        (status = 409, description = "Loan already resolved")
    )
)]
pub async fn report_damage_or_loss(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<ReportDamageOrLoss>,
) -> AppResult<Json<BorrowRecord>> {
    let record = state
        .services
        .borrows
        .report_damage_or_loss(&session, id, request.kind, request.fine_amount)
        .await?;
    Ok(Json(record))
}

#[utoipa::path(
    post,
    path = "/borrows/{id}/renew",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow record ID")),
    request_body = RenewBorrow,
    responses(
        (status = 200, description = "Loan renewed", body = Renewal),
        (status = 409, description = "Renewal limit reached or loan resolved")
    )
)]
pub async fn renew(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(id): Path<i64>,
    request: Option<Json<RenewBorrow>>,
) -> AppResult<Json<Renewal>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;
    let renewal = state
        .services
        .borrows
        .renew(&session, id, request.extension_days)
        .await?;
    Ok(Json(renewal))
}

#[utoipa::path(
    post,
    path = "/borrows/{id}/waive",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow record ID")),
    responses(
        (status = 200, description = "Fine waived", body = BorrowRecord),
        (status = 409, description = "Nothing to waive")
    )
)]
pub async fn waive_fine(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<BorrowRecord>> {
    Ok(Json(state.services.borrows.waive_fine(&session, id).await?))
}

#[utoipa::path(
    get,
    path = "/borrows/{id}/fine",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow record ID")),
    responses(
        (status = 200, description = "Current fine", body = FineAssessment)
    )
)]
pub async fn get_fine(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<FineAssessment>> {
    Ok(Json(state.services.borrows.get_fine(&session, id, Utc::now()).await?))
}

/// Confirm accrued fines of overdue loans
#[utoipa::path(
    post,
    path = "/fines/assess",
    tag = "fines",
    security(("bearer_auth" = [])),
    request_body = AssessFines,
    responses(
        (status = 200, description = "Records whose fine was raised", body = Vec<BorrowRecord>)
    )
)]
pub async fn assess_overdue_fines(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    request: Option<Json<AssessFines>>,
) -> AppResult<Json<Vec<BorrowRecord>>> {
    let today = request.and_then(|Json(r)| r.today).unwrap_or_else(Utc::now);
    Ok(Json(state.services.borrows.assess_overdue_fines(&session, today).await?))
}

#[utoipa::path(
    get,
    path = "/patrons/{id}/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Member ID")),
    responses(
        (status = 200, description = "Patron's borrow records", body = Vec<BorrowView>)
    )
)]
pub async fn list_patron_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(patron_id): Path<i64>,
) -> AppResult<Json<Vec<BorrowView>>> {
    Ok(Json(state.services.borrows.list_for_patron(&session, patron_id).await?))
}

/// Outstanding fines of a patron
#[utoipa::path(
    get,
    path = "/patrons/{id}/balance",
    tag = "fines",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Member ID")),
    responses(
        (status = 200, description = "Outstanding balance", body = PatronBalance)
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(patron_id): Path<i64>,
) -> AppResult<Json<PatronBalance>> {
    Ok(Json(
        state
            .services
            .borrows
            .get_balance(&session, patron_id, Utc::now())
            .await?,
    ))
}
