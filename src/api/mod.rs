//! API handlers for Librario REST endpoints

pub mod borrows;
pub mod health;
pub mod ledger;
pub mod openapi;
pub mod payments;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post, put},
    Router,
};

use crate::{
    error::AppError,
    models::{session::SessionClaims, Session},
    AppState,
};

/// Extractor for the caller's session from a JWT bearer token
pub struct AuthenticatedUser(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = SessionClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims.into()))
    }
}

/// Routes mounted under `/api/v1`
pub fn routes(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Borrow lifecycle
        .route("/borrows", post(borrows::request_borrow))
        .route("/borrows/:id", get(borrows::get_borrow))
        .route("/borrows/:id/approve", post(borrows::approve))
        .route("/borrows/:id/reject", post(borrows::reject))
        .route("/borrows/:id/return", post(borrows::return_item))
        .route("/borrows/:id/report", post(borrows::report_damage_or_loss))
        .route("/borrows/:id/renew", post(borrows::renew))
        .route("/borrows/:id/waive", post(borrows::waive_fine))
        .route("/borrows/:id/fine", get(borrows::get_fine))
        .route("/borrows/:id/payments", get(payments::list_borrow_payments))
        .route("/fines/assess", post(borrows::assess_overdue_fines))
        // Patrons
        .route("/patrons/:id/borrows", get(borrows::list_patron_borrows))
        .route("/patrons/:id/balance", get(borrows::get_balance))
        // Payments
        .route("/payments/offline", post(payments::record_offline_payment))
        .route("/payments/:id/mark-received", put(payments::mark_payment_received))
        .route("/payments/fine", post(payments::initiate_fine_payment))
        .route("/payments/:id/gateway-result", post(payments::record_gateway_result))
        // Ledger
        .route("/ledger", get(ledger::get_ledger))
        .with_state(state)
}
