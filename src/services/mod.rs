//! Business logic services

pub mod borrows;
pub mod notifications;
pub mod payments;

use std::sync::Arc;

use crate::{
    config::{AppConfig, FinesConfig},
    error::AppResult,
    models::PlanTerms,
    repository::Repository,
};

pub use notifications::{LogNotifier, Notifier};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub borrows: borrows::BorrowsService,
    pub payments: payments::PaymentsService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            borrows: borrows::BorrowsService::new(
                repository.clone(),
                config.lending.clone(),
                config.fines.clone(),
                notifier.clone(),
            ),
            payments: payments::PaymentsService::new(repository, config.fines.clone(), notifier),
        }
    }
}

/// Plan terms of a patron, or the configured defaults when none is on file
pub(crate) async fn plan_terms(repository: &Repository, fines: &FinesConfig, patron_id: i64) -> AppResult<PlanTerms> {
    Ok(repository
        .catalog
        .plan_terms(patron_id)
        .await?
        .unwrap_or_else(|| PlanTerms::fallback(fines)))
}
