//! Read-only access to books, members and membership plans

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres, Row};

use super::CatalogProvider;
use crate::{
    error::{AppError, AppResult},
    models::{
        plan::{CatalogItem, MembershipRequestInfo, PatronInfo},
        PlanTerms,
    },
};

#[derive(Clone)]
pub struct CatalogRepository {
    pool: Pool<Postgres>,
}

impl CatalogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogProvider for CatalogRepository {
    async fn item(&self, id: i64) -> AppResult<CatalogItem> {
        let row = sqlx::query("SELECT id, title FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        Ok(CatalogItem {
            id: row.get("id"),
            title: row.get("title"),
        })
    }

    async fn patron(&self, id: i64) -> AppResult<PatronInfo> {
        let row = sqlx::query("SELECT id, name, email FROM members WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))?;

        Ok(PatronInfo {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
        })
    }

    async fn plan_terms(&self, patron_id: i64) -> AppResult<Option<PlanTerms>> {
        let row = sqlx::query(
            r#"
            SELECT mp.fine_per_day, mp.fine_multiplier, mp.borrowing_limit,
                   mp.borrow_duration_days, mp.renewal_days
            FROM members m
            JOIN membership_plans mp ON mp.id = m.plan_id
            WHERE m.id = $1
            "#,
        )
        .bind(patron_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PlanTerms {
            fine_per_day: row.get::<Decimal, _>("fine_per_day"),
            borrowing_limit: row.get("borrowing_limit"),
            fine_multiplier: row.get::<Decimal, _>("fine_multiplier"),
            borrow_duration_days: row.get::<Option<i32>, _>("borrow_duration_days").map(i64::from),
            renewal_days: row.get::<Option<i32>, _>("renewal_days").map(i64::from),
        }))
    }

    async fn membership_request(&self, id: i64) -> AppResult<MembershipRequestInfo> {
        let row = sqlx::query(
            r#"
            SELECT r.id, r.member_id, mp.name AS plan_name, mp.fee
            FROM membership_requests r
            LEFT JOIN membership_plans mp ON mp.id = r.plan_id
            WHERE r.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Membership request with id {} not found", id)))?;

        Ok(MembershipRequestInfo {
            id: row.get("id"),
            patron_id: row.get("member_id"),
            plan_name: row.get("plan_name"),
            fee: row.get("fee"),
        })
    }
}
