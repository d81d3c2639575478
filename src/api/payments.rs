//! Payment endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        payment::{GatewayResult, InitiateFinePayment, RecordOfflinePayment},
        Payment,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Record a fine or membership payment collected at the desk
#[utoipa::path(
    post,
    path = "/payments/offline",
    tag = "payments",
    security(("bearer_auth" = [])),
    request_body = RecordOfflinePayment,
    responses(
        (status = 201, description = "Payment recorded", body = Payment),
        (status = 400, description = "Invalid amount"),
        (status = 403, description = "Librarian privileges required"),
        (status = 409, description = "Fine already settled or loan not resolved")
    )
)]
pub async fn record_offline_payment(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Json(request): Json<RecordOfflinePayment>,
) -> AppResult<(StatusCode, Json<Payment>)> {
    let payment = state
        .services
        .payments
        .record_offline_payment(&session, request)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

#[utoipa::path(
    put,
    path = "/payments/{id}/mark-received",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment received", body = Payment),
        (status = 409, description = "Online or failed payment")
    )
)]
pub async fn mark_payment_received(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Payment>> {
    Ok(Json(
        state
            .services
            .payments
            .mark_payment_received(&session, id)
            .await?,
    ))
}

/// Start an online payment for a fine
#[utoipa::path(
    post,
    path = "/payments/fine",
    tag = "payments",
    security(("bearer_auth" = [])),
    request_body = InitiateFinePayment,
    responses(
        (status = 201, description = "Payment initiated", body = Payment),
        (status = 400, description = "No fine due"),
        (status = 409, description = "Fine already settled or loan not resolved")
    )
)]
pub async fn initiate_fine_payment(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Json(request): Json<InitiateFinePayment>,
) -> AppResult<(StatusCode, Json<Payment>)> {
    let payment = state
        .services
        .payments
        .initiate_fine_payment(&session, request.borrow_id)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

#[utoipa::path(
    post,
    path = "/payments/{id}/gateway-result",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Payment ID")),
    request_body = GatewayResult,
    responses(
        (status = 200, description = "Result recorded", body = Payment),
        (status = 409, description = "Payment already resolved")
    )
)]
pub async fn record_gateway_result(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(request): Json<GatewayResult>,
) -> AppResult<Json<Payment>> {
    Ok(Json(
        state
            .services
            .payments
            .record_gateway_result(&session, id, request.outcome)
            .await?,
    ))
}

/// Payments made against one loan's fine, oldest first
#[utoipa::path(
    get,
    path = "/borrows/{id}/payments",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(("id" = i64, Path, description = "Borrow record ID")),
    responses(
        (status = 200, description = "Fine payments for the loan", body = Vec<Payment>),
        (status = 404, description = "Borrow record not found")
    )
)]
pub async fn list_borrow_payments(
    State(state): State<AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<Payment>>> {
    Ok(Json(state.services.payments.list_for_borrow(&session, id).await?))
}
