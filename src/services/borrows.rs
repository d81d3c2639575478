//! Borrow lifecycle service

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{plan_terms, Notifier};
use crate::{
    config::{FinesConfig, LendingConfig},
    engine::{
        fines::{self, FineAssessment, PatronBalance},
        lifecycle,
        renewal::{self, Renewal},
    },
    error::{AppError, AppResult},
    models::{
        borrow::{CreateBorrowRequest, NewBorrowRecord},
        BookCondition, BorrowRecord, BorrowView, DamageKind, PlanTerms, Session,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct BorrowsService {
    repository: Repository,
    lending: LendingConfig,
    fines: FinesConfig,
    notifier: Arc<dyn Notifier>,
}

impl BorrowsService {
    pub fn new(
        repository: Repository,
        lending: LendingConfig,
        fines: FinesConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            repository,
            lending,
            fines,
            notifier,
        }
    }

    async fn plan_for(&self, patron_id: i64) -> AppResult<PlanTerms> {
        plan_terms(&self.repository, &self.fines, patron_id).await
    }

    fn view(record: BorrowRecord, today: DateTime<Utc>, plan: &PlanTerms) -> BorrowView {
        BorrowView {
            display_status: fines::display_status(&record, today),
            displayed_fine: fines::displayed_fine(&record, today, plan),
            record,
        }
    }

    /// Request a loan; counts against the patron's borrowing limit
    pub async fn request_borrow(&self, session: &Session, request: CreateBorrowRequest) -> AppResult<BorrowRecord> {
        let patron_id = request.patron_id.unwrap_or(session.user_id);
        if patron_id != session.user_id {
            session.require_staff()?;
        }

        let patron = self.repository.catalog.patron(patron_id).await?;
        let item = self.repository.catalog.item(request.item_id).await?;
        let plan = self.plan_for(patron_id).await?;

        let open = self.repository.borrows.count_open_for_patron(patron_id).await?;
        if open >= i64::from(plan.borrowing_limit) {
            return Err(AppError::Conflict(format!(
                "Borrowing limit reached ({}/{})",
                open, plan.borrowing_limit
            )));
        }

        let record = self
            .repository
            .borrows
            .insert(&NewBorrowRecord {
                item_id: item.id,
                patron_id,
                item_title: Some(item.title),
                borrow_date: Utc::now(),
            })
            .await?;

        tracing::info!(record_id = record.id, patron_id, item_id = record.item_id, "Borrow requested");
        self.notifier.notify(
            patron.id,
            &format!("Your request for \"{}\" was received", record.item_title.as_deref().unwrap_or("")),
        );
        Ok(record)
    }

    pub async fn get(&self, session: &Session, id: i64) -> AppResult<BorrowView> {
        let record = self.repository.borrows.get(id).await?;
        session.require_owner_or_staff(record.patron_id)?;
        let plan = self.plan_for(record.patron_id).await?;
        Ok(Self::view(record, Utc::now(), &plan))
    }

    pub async fn list_for_patron(&self, session: &Session, patron_id: i64) -> AppResult<Vec<BorrowView>> {
        session.require_owner_or_staff(patron_id)?;
        let plan = self.plan_for(patron_id).await?;
        let now = Utc::now();
        Ok(self
            .repository
            .borrows
            .list_for_patron(patron_id)
            .await?
            .into_iter()
            .map(|record| Self::view(record, now, &plan))
            .collect())
    }

    /// Approve a request; the duration falls back to the plan, then to config
    pub async fn approve(&self, session: &Session, id: i64, duration_days: Option<i64>) -> AppResult<BorrowRecord> {
        session.require_staff()?;
        let record = self.repository.borrows.get(id).await?;
        let plan = self.plan_for(record.patron_id).await?;
        let duration = duration_days
            .or(plan.borrow_duration_days)
            .unwrap_or(self.lending.default_borrow_days);

        let next = lifecycle::approve(&record, duration, Utc::now())?;
        let saved = self.repository.borrows.save(&next).await?;

        tracing::info!(record_id = id, approved_by = %session.name, "Borrow approved");
        if let Some(due) = saved.due_date {
            self.notifier.notify(
                saved.patron_id,
                &format!("Your loan is approved, due on {}", due.format("%Y-%m-%d")),
            );
        }
        Ok(saved)
    }

    pub async fn reject(&self, session: &Session, id: i64, reason: &str) -> AppResult<BorrowRecord> {
        session.require_staff()?;
        let record = self.repository.borrows.get(id).await?;
        let next = lifecycle::reject(&record, reason)?;
        let saved = self.repository.borrows.save(&next).await?;

        tracing::info!(record_id = id, rejected_by = %session.name, "Borrow rejected");
        self.notifier
            .notify(saved.patron_id, &format!("Your borrow request was rejected: {}", reason.trim()));
        Ok(saved)
    }

    pub async fn return_item(
        &self,
        session: &Session,
        id: i64,
        condition: Option<BookCondition>,
    ) -> AppResult<BorrowRecord> {
        let record = self.repository.borrows.get(id).await?;
        session.require_owner_or_staff(record.patron_id)?;
        let plan = self.plan_for(record.patron_id).await?;

        let next = lifecycle::mark_returned(&record, Utc::now(), condition, &plan)?;
        let saved = self.repository.borrows.save(&next).await?;

        tracing::info!(record_id = id, fine = %saved.fine_amount, "Borrow returned");
        if saved.fine_amount > Decimal::ZERO {
            self.notifier.notify(
                saved.patron_id,
                &format!("Item returned late, a fine of {} applies", saved.fine_amount),
            );
        }
        Ok(saved)
    }

    pub async fn report_damage_or_loss(
        &self,
        session: &Session,
        id: i64,
        kind: DamageKind,
        fine_amount: Decimal,
    ) -> AppResult<BorrowRecord> {
        session.require_staff()?;
        let record = self.repository.borrows.get(id).await?;
        let next = lifecycle::report_damage_or_loss(&record, kind, fine_amount)?;
        let saved = self.repository.borrows.save(&next).await?;

        tracing::info!(record_id = id, status = %saved.status, fine = %saved.fine_amount, "Damage or loss reported");
        self.notifier.notify(
            saved.patron_id,
            &format!("Your loan was marked {}, a fine of {} applies", saved.status, saved.fine_amount),
        );
        Ok(saved)
    }

    /// Renew a loan; the store computes the new due date
    pub async fn renew(&self, session: &Session, id: i64, extension_days: Option<i64>) -> AppResult<Renewal> {
        let record = self.repository.borrows.get(id).await?;
        session.require_owner_or_staff(record.patron_id)?;
        let plan = self.plan_for(record.patron_id).await?;
        let days = extension_days
            .or(plan.renewal_days)
            .unwrap_or(self.lending.default_renewal_days);

        let planned = renewal::plan_renewal(&record, days, self.lending.max_renewals)?;
        let confirmed = self
            .repository
            .borrows
            .extend_due_date(planned.record_id, planned.expected_version, planned.extension_days)
            .await?;
        let renewal = renewal::confirm_renewal(&planned, confirmed)?;

        tracing::info!(
            record_id = id,
            renew_count = renewal.record.renew_count,
            due_date = %renewal.due_date,
            "Borrow renewed"
        );
        Ok(renewal)
    }

    pub async fn waive_fine(&self, session: &Session, id: i64) -> AppResult<BorrowRecord> {
        session.require_staff()?;
        let record = self.repository.borrows.get(id).await?;
        let next = lifecycle::waive_fine(&record)?;
        let saved = self.repository.borrows.save(&next).await?;

        tracing::info!(record_id = id, waived_by = %session.name, "Fine waived");
        self.notifier.notify(saved.patron_id, "Your fine has been waived");
        Ok(saved)
    }

    /// Confirm the accrued fine of every overdue loan.
    ///
    /// Records changed concurrently are skipped; the next run picks them up.
    pub async fn assess_overdue_fines(&self, session: &Session, today: DateTime<Utc>) -> AppResult<Vec<BorrowRecord>> {
        session.require_staff()?;
        let mut updated = Vec::new();

        for record in self.repository.borrows.list_active_borrowed().await? {
            if record.fine_waived || fines::days_late(&record, today) == 0 {
                continue;
            }
            let plan = self.plan_for(record.patron_id).await?;
            let accrued = fines::compute_fine(&record, today, &plan);
            if accrued <= record.fine_amount {
                continue;
            }

            let next = lifecycle::confirm_accrued_fine(&record, accrued)?;
            match self.repository.borrows.save(&next).await {
                Ok(saved) => updated.push(saved),
                Err(AppError::Conflict(msg)) => {
                    tracing::warn!(record_id = record.id, "Skipping fine assessment: {}", msg);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(count = updated.len(), "Overdue fines assessed");
        Ok(updated)
    }

    pub async fn get_fine(&self, session: &Session, id: i64, today: DateTime<Utc>) -> AppResult<FineAssessment> {
        let record = self.repository.borrows.get(id).await?;
        session.require_owner_or_staff(record.patron_id)?;
        let plan = self.plan_for(record.patron_id).await?;
        Ok(fines::assess(&record, today, &plan))
    }

    /// How much the patron owes right now
    pub async fn get_balance(&self, session: &Session, patron_id: i64, today: DateTime<Utc>) -> AppResult<PatronBalance> {
        session.require_owner_or_staff(patron_id)?;
        let plan = self.plan_for(patron_id).await?;
        let records = self.repository.borrows.list_for_patron(patron_id).await?;
        Ok(fines::balance(patron_id, &records, today, &plan))
    }
}
