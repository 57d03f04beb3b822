/// Payment model
///
/// One row per gateway transaction. The amount is captured from the course
/// price when the payment is initiated and never changes afterwards.
///
/// # State Machine
///
/// ```text
/// pending → paid
/// pending → failed
/// ```
///
/// Both outcomes are terminal. [`Payment::settle`] is the only way out of
/// `pending` and is conditional on the current status, which is what makes
/// duplicate webhook deliveries and webhook/callback races harmless.
///
/// At most one payment per enrollment is `pending` at a time.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE payment_status AS ENUM ('pending', 'paid', 'failed');
///
/// CREATE TABLE payments (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     enrollment_id UUID NOT NULL REFERENCES enrollments(id) ON DELETE CASCADE,
///     transaction_id VARCHAR(128) NOT NULL UNIQUE,
///     amount BIGINT NOT NULL CHECK (amount >= 0),
///     currency VARCHAR(8) NOT NULL DEFAULT 'XOF',
///     status payment_status NOT NULL DEFAULT 'pending',
///     payment_url TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     settled_at TIMESTAMPTZ
/// );
///
/// CREATE UNIQUE INDEX payments_one_pending_per_enrollment
///     ON payments (enrollment_id) WHERE status = 'pending';
/// ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        matches!(
            (self, target),
            (PaymentStatus::Pending, PaymentStatus::Paid)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub enrollment_id: Uuid,

    /// Gateway transaction id (`free-<uuid>` for zero-priced courses)
    pub transaction_id: String,

    /// Whole XOF captured at initiation
    pub amount: i64,

    pub currency: String,
    pub status: PaymentStatus,

    /// Hosted checkout link returned by the gateway
    pub payment_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePayment {
    pub enrollment_id: Uuid,
    pub transaction_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_url: Option<String>,
}

/// Payment joined with student and course, for the manager view
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentOverview {
    pub id: Uuid,
    pub transaction_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub enrollment_id: Uuid,
    pub student_id: Uuid,
    pub student_email: String,
    pub course_id: Uuid,
    pub course_title: String,
}

/// Partial unique index allowing one open checkout per enrollment
pub const ONE_PENDING_PER_ENROLLMENT: &str = "payments_one_pending_per_enrollment";

const PAYMENT_COLUMNS: &str = "id, enrollment_id, transaction_id, amount, currency, status, \
                               payment_url, created_at, settled_at";

impl Payment {
    /// Inserts a payment
    ///
    /// A settled status (free courses) also stamps `settled_at`.
    pub async fn create<'e, E>(executor: E, data: CreatePayment) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            r#"
            INSERT INTO payments (enrollment_id, transaction_id, amount, currency, status,
                                  payment_url, settled_at)
            VALUES ($1, $2, $3, $4, $5, $6, CASE WHEN $5 = 'pending'::payment_status THEN NULL ELSE NOW() END)
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );

        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(data.enrollment_id)
            .bind(data.transaction_id)
            .bind(data.amount)
            .bind(data.currency)
            .bind(data.status)
            .bind(data.payment_url)
            .fetch_one(executor)
            .await?;

        Ok(payment)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);

        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(payment)
    }

    pub async fn find_by_transaction_id<'e, E>(
        executor: E,
        transaction_id: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {} FROM payments WHERE transaction_id = $1",
            PAYMENT_COLUMNS
        );

        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(transaction_id)
            .fetch_optional(executor)
            .await?;

        Ok(payment)
    }

    /// Most recent payment of an enrollment
    pub async fn latest_for_enrollment(
        pool: &PgPool,
        enrollment_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {}
            FROM payments
            WHERE enrollment_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            PAYMENT_COLUMNS
        );

        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(enrollment_id)
            .fetch_optional(pool)
            .await?;

        Ok(payment)
    }

    /// The enrollment's open checkout, if any
    pub async fn pending_for_enrollment(
        pool: &PgPool,
        enrollment_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM payments WHERE enrollment_id = $1 AND status = 'pending'",
            PAYMENT_COLUMNS
        );

        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(enrollment_id)
            .fetch_optional(pool)
            .await?;

        Ok(payment)
    }

    /// Moves a pending payment to a terminal status
    ///
    /// Returns `None` if the payment was already settled, in which case the
    /// caller must treat the delivery as a no-op.
    pub async fn settle<'e, E>(
        executor: E,
        transaction_id: &str,
        status: PaymentStatus,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            r#"
            UPDATE payments
            SET status = $2, settled_at = NOW()
            WHERE transaction_id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );

        let payment = sqlx::query_as::<_, Payment>(&query)
            .bind(transaction_id)
            .bind(status)
            .fetch_optional(executor)
            .await?;

        Ok(payment)
    }

    /// Payments with student and course, newest first
    pub async fn list_overview(
        pool: &PgPool,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentOverview>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PaymentOverview>(
            r#"
            SELECT p.id, p.transaction_id, p.amount, p.currency, p.status, p.created_at,
                   p.settled_at, p.enrollment_id, u.id AS student_id, u.email AS student_email,
                   c.id AS course_id, c.title AS course_title
            FROM payments p
            JOIN enrollments e ON e.id = p.enrollment_id
            JOIN users u ON u.id = e.student_id
            JOIN courses c ON c.id = e.course_id
            WHERE ($1::payment_status IS NULL OR p.status = $1)
            ORDER BY p.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Sum of all paid amounts
    pub async fn total_revenue(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payments WHERE status = 'paid'",
        )
        .fetch_one(pool)
        .await?;

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_transitions_are_monotonic() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Paid));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Paid));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Pending));
    }

    #[test]
    fn test_terminal() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Paid.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }
}
