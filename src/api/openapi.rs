//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{borrows, health, ledger, payments};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Librario API",
        version = "0.3.0",
        description = "Borrow lifecycle, fines and payment reconciliation",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        // Borrows
        borrows::request_borrow,
        borrows::get_borrow,
        borrows::approve,
        borrows::reject,
        borrows::return_item,
        borrows::report_damage_or_loss,
        borrows::renew,
        borrows::list_patron_borrows,
        // Fines
        borrows::waive_fine,
        borrows::get_fine,
        borrows::assess_overdue_fines,
        borrows::get_balance,
        // Payments
        payments::record_offline_payment,
        payments::mark_payment_received,
        payments::initiate_fine_payment,
        payments::record_gateway_result,
        payments::list_borrow_payments,
        // Ledger
        ledger::get_ledger,
    ),
    components(
        schemas(
            // Borrows
            crate::models::BorrowRecord,
            crate::models::BorrowView,
            crate::models::BorrowStatus,
            crate::models::DisplayStatus,
            crate::models::BookCondition,
            crate::models::DamageKind,
            crate::models::borrow::CreateBorrowRequest,
            crate::models::borrow::ApproveBorrow,
            crate::models::borrow::RejectBorrow,
            crate::models::borrow::ReturnBorrow,
            crate::models::borrow::ReportDamageOrLoss,
            crate::models::borrow::RenewBorrow,
            crate::models::borrow::AssessFines,
            crate::engine::renewal::Renewal,
            // Fines
            crate::engine::fines::FineAssessment,
            crate::engine::fines::PatronBalance,
            // Payments
            crate::models::Payment,
            crate::models::PaymentCategory,
            crate::models::PaymentStatus,
            crate::models::PaymentMode,
            crate::models::payment::GatewayOutcome,
            crate::models::payment::GatewayResult,
            crate::models::payment::InitiateFinePayment,
            crate::models::payment::OfflinePaymentTarget,
            crate::models::payment::RecordOfflinePayment,
            // Ledger
            crate::engine::ledger::Ledger,
            crate::engine::ledger::LedgerStats,
            crate::engine::ledger::StatusFilter,
            crate::engine::ledger::LedgerSort,
            crate::engine::classifier::LedgerEntry,
            crate::engine::classifier::LedgerSource,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
            crate::error::ErrorKind,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check"),
        (name = "borrows", description = "Borrow lifecycle"),
        (name = "fines", description = "Fine computation and waivers"),
        (name = "payments", description = "Fine and membership payments"),
        (name = "ledger", description = "Payment reconciliation")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
