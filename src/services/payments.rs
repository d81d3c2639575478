//! Fine and membership payments, and the reconciliation ledger

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{plan_terms, Notifier};
use crate::{
    config::FinesConfig,
    engine::{
        fines,
        ledger::{self, Ledger, LedgerQuery},
        lifecycle,
    },
    error::{AppError, AppResult},
    models::{
        payment::{GatewayOutcome, NewPayment, OfflinePaymentTarget, RecordOfflinePayment},
        BorrowRecord, Payment, PaymentCategory, PaymentMode, PaymentStatus, Session,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct PaymentsService {
    repository: Repository,
    fines: FinesConfig,
    notifier: Arc<dyn Notifier>,
}

impl PaymentsService {
    pub fn new(repository: Repository, fines: FinesConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repository,
            fines,
            notifier,
        }
    }

    async fn ensure_no_open_fine_payment(&self, borrow_id: i64) -> AppResult<()> {
        let open = self
            .repository
            .payments
            .list_for_borrow(borrow_id)
            .await?
            .into_iter()
            .find(|p| p.status == PaymentStatus::Initiated);
        match open {
            Some(pending) => Err(AppError::Conflict(format!(
                "Borrow record {} already has pending payment {}",
                borrow_id, pending.id
            ))),
            None => Ok(()),
        }
    }

    /// Attach a payment to a borrow record, returning the record before and after
    async fn settle_fine(
        &self,
        borrow_id: i64,
        mode: PaymentMode,
        settled: bool,
    ) -> AppResult<(BorrowRecord, BorrowRecord)> {
        let record = self.repository.borrows.get(borrow_id).await?;
        let next = lifecycle::record_fine_payment(&record, mode, settled)?;
        let saved = self.repository.borrows.save(&next).await?;
        Ok((record, saved))
    }

    /// Put back a settlement whose payment was never written
    async fn undo_settlement(&self, before: &BorrowRecord, saved: BorrowRecord) {
        let restored = BorrowRecord {
            fine_paid: before.fine_paid,
            payment_mode: before.payment_mode,
            ..saved
        };
        if let Err(e) = self.repository.borrows.save(&restored).await {
            tracing::error!(borrow_id = before.id, error = %e, "Failed to undo fine settlement");
        }
    }

    /// Settle the linked fine, then move the payment out of INITIATED.
    ///
    /// A record that refuses the settlement leaves the payment INITIATED.
    async fn confirm_payment(
        &self,
        payment: &Payment,
        mode: PaymentMode,
        received_by: Option<String>,
    ) -> AppResult<Payment> {
        let settlement = match (payment.category, payment.linked_record_id) {
            (PaymentCategory::Fine, Some(borrow_id)) => Some(self.settle_fine(borrow_id, mode, true).await?),
            _ => None,
        };

        let failure = match self
            .repository
            .payments
            .transition(
                payment.id,
                PaymentStatus::Initiated,
                PaymentStatus::Success,
                received_by,
                Utc::now(),
            )
            .await
        {
            Ok(Some(updated)) => return Ok(updated),
            Ok(None) => AppError::Conflict(format!("Payment {} is already resolved", payment.id)),
            Err(e) => e,
        };

        if let Some((before, saved)) = settlement {
            self.undo_settlement(&before, saved).await;
        }
        Err(failure)
    }

    /// Record a payment collected at the desk
    pub async fn record_offline_payment(&self, session: &Session, request: RecordOfflinePayment) -> AppResult<Payment> {
        session.require_staff()?;
        if request.amount.map_or(false, |amount| amount < Decimal::ZERO) {
            return Err(AppError::Validation("Payment amount cannot be negative".to_string()));
        }

        let now = Utc::now();
        let status = if request.received {
            PaymentStatus::Success
        } else {
            PaymentStatus::Initiated
        };
        let (received_by, received_at) = if request.received {
            (Some(session.name.clone()), Some(now))
        } else {
            (None, None)
        };

        let payment = match request.target {
            OfflinePaymentTarget::Fine { borrow_id } => {
                let record = self.repository.borrows.get(borrow_id).await?;
                let plan = plan_terms(&self.repository, &self.fines, record.patron_id).await?;
                let amount = request
                    .amount
                    .unwrap_or_else(|| fines::displayed_fine(&record, now, &plan));
                lifecycle::record_fine_payment(&record, PaymentMode::Offline, request.received)?;
                self.ensure_no_open_fine_payment(borrow_id).await?;
                let patron = self.repository.catalog.patron(record.patron_id).await?;

                let (before, saved) = self
                    .settle_fine(borrow_id, PaymentMode::Offline, request.received)
                    .await?;
                let inserted = self
                    .repository
                    .payments
                    .insert(&NewPayment {
                        category: PaymentCategory::Fine,
                        transaction_id: format!("FINE-OFFLINE-{}", Uuid::new_v4()),
                        amount,
                        status,
                        mode: PaymentMode::Offline,
                        patron_id: record.patron_id,
                        recorded_by: Some(session.name.clone()),
                        linked_record_id: Some(record.id),
                        member_name: Some(patron.name),
                        member_email: patron.email,
                        book_title: record.item_title.clone(),
                        received_by,
                        received_at,
                        created_at: now,
                    })
                    .await;
                match inserted {
                    Ok(payment) => payment,
                    Err(e) => {
                        self.undo_settlement(&before, saved).await;
                        return Err(e);
                    }
                }
            }
            OfflinePaymentTarget::Membership { membership_request_id } => {
                let membership = self
                    .repository
                    .catalog
                    .membership_request(membership_request_id)
                    .await?;
                let amount = request.amount.or(membership.fee).ok_or_else(|| {
                    AppError::Validation("An amount is required for this membership payment".to_string())
                })?;
                let patron = self.repository.catalog.patron(membership.patron_id).await?;

                self.repository
                    .payments
                    .insert(&NewPayment {
                        category: PaymentCategory::Membership,
                        transaction_id: format!("MEMBER-OFFLINE-{}", Uuid::new_v4()),
                        amount,
                        status,
                        mode: PaymentMode::Offline,
                        patron_id: membership.patron_id,
                        recorded_by: Some(session.name.clone()),
                        linked_record_id: Some(membership.id),
                        member_name: Some(patron.name),
                        member_email: patron.email,
                        book_title: None,
                        received_by,
                        received_at,
                        created_at: now,
                    })
                    .await?
            }
        };

        tracing::info!(
            payment_id = payment.id,
            category = %payment.category,
            amount = %payment.amount,
            status = %payment.status,
            recorded_by = %session.name,
            "Offline payment recorded"
        );
        Ok(payment)
    }

    /// Confirm cash was received for a pending offline payment.
    ///
    /// Marking an already received payment returns it unchanged.
    pub async fn mark_payment_received(&self, session: &Session, payment_id: i64) -> AppResult<Payment> {
        session.require_staff()?;
        let payment = self.repository.payments.get(payment_id).await?;
        if payment.mode != PaymentMode::Offline {
            return Err(AppError::Conflict(format!(
                "Payment {} is an online payment and settles through the gateway",
                payment_id
            )));
        }

        match payment.status {
            PaymentStatus::Success => return Ok(payment),
            PaymentStatus::Failed => {
                return Err(AppError::Conflict(format!("Payment {} has failed", payment_id)))
            }
            PaymentStatus::Initiated => {}
        }

        let updated = match self
            .confirm_payment(&payment, PaymentMode::Offline, Some(session.name.clone()))
            .await
        {
            Ok(updated) => updated,
            Err(AppError::Conflict(message)) => {
                // Lost a race with another librarian
                let current = self.repository.payments.get(payment_id).await?;
                if current.status == PaymentStatus::Success {
                    return Ok(current);
                }
                return Err(AppError::Conflict(message));
            }
            Err(e) => return Err(e),
        };

        tracing::info!(payment_id, received_by = %session.name, "Offline payment marked received");
        self.notifier.notify(
            updated.patron_id,
            &format!("Your payment of {} was received", updated.amount),
        );
        Ok(updated)
    }

    /// Start an online payment for the displayed fine of a resolved loan
    pub async fn initiate_fine_payment(&self, session: &Session, borrow_id: i64) -> AppResult<Payment> {
        let record = self.repository.borrows.get(borrow_id).await?;
        session.require_owner_or_staff(record.patron_id)?;

        // only validated here, the record changes once the gateway confirms
        lifecycle::record_fine_payment(&record, PaymentMode::Online, false)?;
        self.ensure_no_open_fine_payment(borrow_id).await?;

        let now = Utc::now();
        let plan = plan_terms(&self.repository, &self.fines, record.patron_id).await?;
        let amount = fines::displayed_fine(&record, now, &plan);
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Borrow record {} has no fine to pay",
                borrow_id
            )));
        }
        let patron = self.repository.catalog.patron(record.patron_id).await?;

        let payment = self
            .repository
            .payments
            .insert(&NewPayment {
                category: PaymentCategory::Fine,
                transaction_id: format!("FINE-{}", Uuid::new_v4()),
                amount,
                status: PaymentStatus::Initiated,
                mode: PaymentMode::Online,
                patron_id: record.patron_id,
                recorded_by: Some(session.name.clone()),
                linked_record_id: Some(record.id),
                member_name: Some(patron.name),
                member_email: patron.email,
                book_title: record.item_title.clone(),
                received_by: None,
                received_at: None,
                created_at: now,
            })
            .await?;

        tracing::info!(payment_id = payment.id, borrow_id, amount = %amount, "Fine payment initiated");
        Ok(payment)
    }

    /// Apply the gateway's verdict; a payment is resolved exactly once
    pub async fn record_gateway_result(
        &self,
        session: &Session,
        payment_id: i64,
        outcome: GatewayOutcome,
    ) -> AppResult<Payment> {
        let payment = self.repository.payments.get(payment_id).await?;
        session.require_owner_or_staff(payment.patron_id)?;
        if payment.mode != PaymentMode::Online {
            return Err(AppError::Conflict(format!(
                "Payment {} was not made through the gateway",
                payment_id
            )));
        }

        if payment.status != PaymentStatus::Initiated {
            return Err(AppError::Conflict(format!("Payment {} is already resolved", payment_id)));
        }

        let updated = match outcome {
            GatewayOutcome::Success => self.confirm_payment(&payment, PaymentMode::Online, None).await?,
            GatewayOutcome::Failed => self
                .repository
                .payments
                .transition(payment_id, PaymentStatus::Initiated, PaymentStatus::Failed, None, Utc::now())
                .await?
                .ok_or_else(|| AppError::Conflict(format!("Payment {} is already resolved", payment_id)))?,
        };

        if updated.status == PaymentStatus::Success {
            self.notifier.notify(
                updated.patron_id,
                &format!("Your payment of {} succeeded", updated.amount),
            );
        } else {
            self.notifier.notify(updated.patron_id, "Your payment failed, please try again");
        }

        tracing::info!(payment_id, status = %updated.status, "Gateway result recorded");
        Ok(updated)
    }

    pub async fn list_for_borrow(&self, session: &Session, borrow_id: i64) -> AppResult<Vec<Payment>> {
        let record = self.repository.borrows.get(borrow_id).await?;
        session.require_owner_or_staff(record.patron_id)?;
        let mut payments = self.repository.payments.list_for_borrow(borrow_id).await?;
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(payments)
    }

    /// Reconciliation ledger, scoped to the caller
    pub async fn get_ledger(&self, session: &Session, query: &LedgerQuery) -> AppResult<Ledger> {
        let (membership, fine) = tokio::join!(
            self.repository.payments.membership_payments_raw(),
            self.repository.payments.fine_payments_raw(),
        );

        let mut merged = ledger::build_ledger(membership, fine)?;
        for warning in &merged.warnings {
            tracing::warn!("Ledger degraded: {}", warning);
        }

        if !session.is_staff() {
            merged.entries.retain(|e| e.patron_id == Some(session.user_id));
            merged.stats = ledger::compute_stats(&merged.entries);
        }

        let entries = ledger::project(&merged.entries, query)
            .into_iter()
            .cloned()
            .collect();

        Ok(Ledger {
            entries,
            stats: merged.stats,
            warnings: merged.warnings,
        })
    }
}
