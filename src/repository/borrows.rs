//! Borrow records repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::BorrowStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        borrow::{BorrowRecordRow, NewBorrowRecord},
        BorrowRecord, BorrowStatus,
    },
};

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Tell a stale version apart from a missing record after a failed CAS
    async fn cas_failure(&self, id: i64, expected_version: i64) -> AppError {
        let current: Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT version FROM borrow_records WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(Some(version)) => AppError::Conflict(format!(
                "Borrow record {} was modified concurrently (expected version {}, found {})",
                id, expected_version, version
            )),
            Ok(None) => AppError::NotFound(format!("Borrow record with id {} not found", id)),
            Err(e) => e.into(),
        }
    }

    async fn renewal_failure(&self, id: i64, expected_version: i64) -> AppError {
        let current: Result<Option<(i64, String, bool)>, sqlx::Error> =
            sqlx::query_as("SELECT version, status, due_date IS NOT NULL FROM borrow_records WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(current) => renewal_conflict(id, expected_version, current),
            Err(e) => e.into(),
        }
    }
}

/// Explain a renewal that matched no row from the record's current `(version, status, has due date)`
fn renewal_conflict(id: i64, expected_version: i64, current: Option<(i64, String, bool)>) -> AppError {
    match current {
        None => AppError::NotFound(format!("Borrow record with id {} not found", id)),
        Some((version, _, _)) if version != expected_version => AppError::Conflict(format!(
            "Borrow record {} was modified concurrently (expected version {}, found {})",
            id, expected_version, version
        )),
        Some((_, status, false)) if status == BorrowStatus::Borrowed.as_str() => {
            AppError::Conflict(format!("Borrow record {} has no due date to extend", id))
        }
        Some((_, status, _)) => AppError::Conflict(format!(
            "Borrow record {} is {} and cannot be renewed",
            id, status
        )),
    }
}

#[async_trait]
impl BorrowStore for BorrowsRepository {
    async fn get(&self, id: i64) -> AppResult<BorrowRecord> {
        sqlx::query_as::<_, BorrowRecordRow>("SELECT * FROM borrow_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow record with id {} not found", id)))?
            .try_into()
    }

    async fn insert(&self, new: &NewBorrowRecord) -> AppResult<BorrowRecord> {
        sqlx::query_as::<_, BorrowRecordRow>(
            r#"
            INSERT INTO borrow_records (item_id, patron_id, item_title, borrow_date, status,
                                        renew_count, fine_amount, fine_paid, fine_waived, version, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, 0, FALSE, FALSE, 1, NOW())
            RETURNING *
            "#,
        )
        .bind(new.item_id)
        .bind(new.patron_id)
        .bind(&new.item_title)
        .bind(new.borrow_date)
        .bind(BorrowStatus::Requested.as_str())
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn save(&self, record: &BorrowRecord) -> AppResult<BorrowRecord> {
        let row = sqlx::query_as::<_, BorrowRecordRow>(
            r#"
            UPDATE borrow_records SET
                borrow_date = $2, due_date = $3, return_date = $4, status = $5,
                renew_count = $6, fine_amount = $7, fine_paid = $8, fine_waived = $9,
                payment_mode = $10, book_condition = $11, rejection_reason = $12,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $13
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(record.borrow_date)
        .bind(record.due_date)
        .bind(record.return_date)
        .bind(record.status.as_str())
        .bind(record.renew_count)
        .bind(record.fine_amount)
        .bind(record.fine_paid)
        .bind(record.fine_waived)
        .bind(record.payment_mode.map(|m| m.as_str()))
        .bind(record.book_condition.map(|c| c.as_str()))
        .bind(&record.rejection_reason)
        .bind(record.version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.cas_failure(record.id, record.version).await),
        }
    }

    async fn extend_due_date(&self, id: i64, expected_version: i64, days: i64) -> AppResult<BorrowRecord> {
        let days = i32::try_from(days)
            .map_err(|_| AppError::Validation(format!("Renewal of {} days is out of range", days)))?;

        let row = sqlx::query_as::<_, BorrowRecordRow>(
            r#"
            UPDATE borrow_records SET
                due_date = due_date + make_interval(days => $3),
                renew_count = renew_count + 1,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2 AND status = $4 AND due_date IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(days)
        .bind(BorrowStatus::Borrowed.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.renewal_failure(id, expected_version).await),
        }
    }

    async fn list_for_patron(&self, patron_id: i64) -> AppResult<Vec<BorrowRecord>> {
        sqlx::query_as::<_, BorrowRecordRow>(
            "SELECT * FROM borrow_records WHERE patron_id = $1 ORDER BY borrow_date DESC, id DESC",
        )
        .bind(patron_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(BorrowRecord::try_from)
        .collect()
    }

    async fn list_active_borrowed(&self) -> AppResult<Vec<BorrowRecord>> {
        sqlx::query_as::<_, BorrowRecordRow>("SELECT * FROM borrow_records WHERE status = $1 ORDER BY id")
            .bind(BorrowStatus::Borrowed.as_str())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(BorrowRecord::try_from)
            .collect()
    }

    async fn count_open_for_patron(&self, patron_id: i64) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM borrow_records WHERE patron_id = $1 AND status IN ($2, $3)",
        )
        .bind(patron_id)
        .bind(BorrowStatus::Requested.as_str())
        .bind(BorrowStatus::Borrowed.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
