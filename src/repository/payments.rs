//! Payments repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Pool, Postgres};

use super::PaymentStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        payment::{NewPayment, PaymentRow},
        Payment, PaymentCategory, PaymentStatus,
    },
};

#[derive(Clone)]
pub struct PaymentsRepository {
    pool: Pool<Postgres>,
}

impl PaymentsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PaymentsRepository {
    async fn get(&self, id: i64) -> AppResult<Payment> {
        sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment with id {} not found", id)))?
            .try_into()
    }

    async fn insert(&self, new: &NewPayment) -> AppResult<Payment> {
        let (borrow_record_id, membership_request_id) = match new.category {
            PaymentCategory::Fine => (new.linked_record_id, None),
            PaymentCategory::Membership => (None, new.linked_record_id),
        };

        sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO payments (category, transaction_id, amount, status, mode, patron_id,
                                  recorded_by, borrow_record_id, membership_request_id,
                                  member_name, member_email, book_title,
                                  received_by, received_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(new.category.as_str())
        .bind(&new.transaction_id)
        .bind(new.amount)
        .bind(new.status.as_str())
        .bind(new.mode.as_str())
        .bind(new.patron_id)
        .bind(&new.recorded_by)
        .bind(borrow_record_id)
        .bind(membership_request_id)
        .bind(&new.member_name)
        .bind(&new.member_email)
        .bind(&new.book_title)
        .bind(&new.received_by)
        .bind(new.received_at)
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn transition(
        &self,
        id: i64,
        from: PaymentStatus,
        to: PaymentStatus,
        received_by: Option<String>,
        at: DateTime<Utc>,
    ) -> AppResult<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            UPDATE payments SET
                status = $3,
                received_by = COALESCE($4, received_by),
                received_at = CASE WHEN $3 = 'SUCCESS' THEN $5 ELSE received_at END
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(received_by)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Payment::try_from).transpose()
    }

    async fn list_for_borrow(&self, borrow_id: i64) -> AppResult<Vec<Payment>> {
        sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE borrow_record_id = $1 ORDER BY created_at, id",
        )
        .bind(borrow_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Payment::try_from)
        .collect()
    }

    async fn membership_payments_raw(&self) -> AppResult<Vec<Value>> {
        let rows = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT row_to_json(m) FROM (
                SELECT p.id, p.transaction_id, p.amount, p.status, p.patron_id AS user_id,
                       COALESCE(p.member_name, mb.name) AS member_name,
                       COALESCE(p.member_email, mb.email) AS member_email,
                       p.membership_request_id, p.recorded_by, p.created_at
                FROM payments p
                LEFT JOIN members mb ON mb.id = p.patron_id
                WHERE p.category = 'Membership'
                ORDER BY p.created_at DESC
            ) m
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn fine_payments_raw(&self) -> AppResult<Vec<Value>> {
        let rows = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT json_build_object(
                'paymentId', p.id,
                'transactionId', p.transaction_id,
                'borrowId', b.id,
                'bookTitle', COALESCE(p.book_title, b.item_title),
                'userId', b.patron_id,
                'userName', COALESCE(p.member_name, mb.name),
                'userEmail', COALESCE(p.member_email, mb.email),
                'fineAmount', p.amount,
                'paymentStatus', p.status,
                'paymentDate', p.created_at,
                'recordedByName', p.recorded_by
            )
            FROM payments p
            JOIN borrow_records b ON b.id = p.borrow_record_id
            LEFT JOIN members mb ON mb.id = b.patron_id
            WHERE p.category = 'Fine'
            ORDER BY p.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
