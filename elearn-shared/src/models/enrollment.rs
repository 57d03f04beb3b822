/// Enrollment model and state transitions
///
/// An enrollment links one student to one course. The pair is unique, so a
/// repeated enroll request returns the existing row.
///
/// # State Machine
///
/// ```text
/// pending → paid          (terminal)
/// pending → failed
/// failed  → pending       (new payment attempt only)
/// ```
///
/// State changes use conditional `UPDATE ... WHERE status = ...` statements so
/// that concurrent reconciliations cannot move an enrollment backwards. The
/// transition functions accept any executor so they can run inside the
/// reconciliation transaction.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE enrollment_status AS ENUM ('pending', 'paid', 'failed');
///
/// CREATE TABLE enrollments (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     student_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     course_id UUID NOT NULL REFERENCES courses(id) ON DELETE RESTRICT,
///     status enrollment_status NOT NULL DEFAULT 'pending',
///     enrolled_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (student_id, course_id)
/// );
/// ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "enrollment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    /// Awaiting payment
    Pending,

    /// Paid; the student has access to the content
    Paid,

    /// Last payment attempt failed
    Failed,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Paid => "paid",
            EnrollmentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EnrollmentStatus::Paid)
    }

    pub fn can_transition_to(&self, target: EnrollmentStatus) -> bool {
        matches!(
            (self, target),
            (EnrollmentStatus::Pending, EnrollmentStatus::Paid)
                | (EnrollmentStatus::Pending, EnrollmentStatus::Failed)
                | (EnrollmentStatus::Failed, EnrollmentStatus::Pending)
                | (EnrollmentStatus::Failed, EnrollmentStatus::Paid)
        )
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn is_paid(&self) -> bool {
        self.status == EnrollmentStatus::Paid
    }
}

/// Enrollment joined with its course, for the student dashboard
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnrollmentWithCourse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub price: i64,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
}

/// Enrollment joined with its student, for instructors
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseStudent {
    pub enrollment_id: Uuid,
    pub student_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
}

const ENROLLMENT_COLUMNS: &str = "id, student_id, course_id, status, enrolled_at, updated_at";

impl Enrollment {
    /// Creates a pending enrollment, or returns the existing one
    ///
    /// The boolean is `true` when a new row was inserted.
    pub async fn create_or_get(
        pool: &PgPool,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<(Self, bool), sqlx::Error> {
        let insert = format!(
            r#"
            INSERT INTO enrollments (student_id, course_id)
            VALUES ($1, $2)
            ON CONFLICT (student_id, course_id) DO NOTHING
            RETURNING {}
            "#,
            ENROLLMENT_COLUMNS
        );

        let created = sqlx::query_as::<_, Enrollment>(&insert)
            .bind(student_id)
            .bind(course_id)
            .fetch_optional(pool)
            .await?;

        if let Some(enrollment) = created {
            return Ok((enrollment, true));
        }

        let existing = Self::find_by_student_and_course(pool, student_id, course_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        Ok((existing, false))
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {} FROM enrollments WHERE id = $1", ENROLLMENT_COLUMNS);

        let enrollment = sqlx::query_as::<_, Enrollment>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(enrollment)
    }

    pub async fn find_by_student_and_course(
        pool: &PgPool,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM enrollments WHERE student_id = $1 AND course_id = $2",
            ENROLLMENT_COLUMNS
        );

        let enrollment = sqlx::query_as::<_, Enrollment>(&query)
            .bind(student_id)
            .bind(course_id)
            .fetch_optional(pool)
            .await?;

        Ok(enrollment)
    }

    pub async fn list_by_student(
        pool: &PgPool,
        student_id: Uuid,
    ) -> Result<Vec<EnrollmentWithCourse>, sqlx::Error> {
        let rows = sqlx::query_as::<_, EnrollmentWithCourse>(
            r#"
            SELECT e.id, e.course_id, c.title AS course_title, c.price, e.status, e.enrolled_at
            FROM enrollments e
            JOIN courses c ON c.id = e.course_id
            WHERE e.student_id = $1
            ORDER BY e.enrolled_at DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn list_students(
        pool: &PgPool,
        course_id: Uuid,
    ) -> Result<Vec<CourseStudent>, sqlx::Error> {
        let rows = sqlx::query_as::<_, CourseStudent>(
            r#"
            SELECT e.id AS enrollment_id, u.id AS student_id, u.first_name, u.last_name,
                   u.email, e.status, e.enrolled_at
            FROM enrollments e
            JOIN users u ON u.id = e.student_id
            WHERE e.course_id = $1
            ORDER BY e.enrolled_at
            "#,
        )
        .bind(course_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Marks an enrollment paid unless it already is
    ///
    /// Returns `None` when the enrollment was already paid (no-op).
    pub async fn mark_paid<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            r#"
            UPDATE enrollments
            SET status = 'paid', updated_at = NOW()
            WHERE id = $1 AND status <> 'paid'
            RETURNING {}
            "#,
            ENROLLMENT_COLUMNS
        );

        let enrollment = sqlx::query_as::<_, Enrollment>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(enrollment)
    }

    /// Marks a pending enrollment failed
    ///
    /// A paid enrollment is never downgraded, and an enrollment with another
    /// checkout still open stays pending; returns `None` in both cases.
    pub async fn mark_failed<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            r#"
            UPDATE enrollments
            SET status = 'failed', updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'
              AND NOT EXISTS (
                  SELECT 1 FROM payments WHERE enrollment_id = $1 AND status = 'pending'
              )
            RETURNING {}
            "#,
            ENROLLMENT_COLUMNS
        );

        let enrollment = sqlx::query_as::<_, Enrollment>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(enrollment)
    }

    /// Moves a failed enrollment back to pending for a new payment attempt
    pub async fn reopen<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            r#"
            UPDATE enrollments
            SET status = 'pending', updated_at = NOW()
            WHERE id = $1 AND status = 'failed'
            RETURNING {}
            "#,
            ENROLLMENT_COLUMNS
        );

        let enrollment = sqlx::query_as::<_, Enrollment>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(enrollment)
    }

    pub async fn count_by_status(
        pool: &PgPool,
        status: EnrollmentStatus,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM enrollments WHERE status = $1")
            .bind(status)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paid_is_terminal() {
        assert!(EnrollmentStatus::Paid.is_terminal());
        assert!(!EnrollmentStatus::Failed.is_terminal());

        for target in [
            EnrollmentStatus::Pending,
            EnrollmentStatus::Failed,
            EnrollmentStatus::Paid,
        ] {
            assert!(!EnrollmentStatus::Paid.can_transition_to(target));
        }
    }

    #[test]
    fn test_failed_can_reopen() {
        assert!(EnrollmentStatus::Failed.can_transition_to(EnrollmentStatus::Pending));
        assert!(EnrollmentStatus::Pending.can_transition_to(EnrollmentStatus::Failed));
        assert!(!EnrollmentStatus::Pending.can_transition_to(EnrollmentStatus::Pending));
    }
}
