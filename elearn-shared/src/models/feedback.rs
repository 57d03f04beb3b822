/// Course feedback left by students
///
/// One row per (student, course); giving feedback again replaces the rating
/// and comment.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE course_feedback (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     student_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     course_id UUID NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
///     rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
///     comment TEXT NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (student_id, course_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Feedback {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,

    /// 1 to 5
    pub rating: i16,

    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Feedback joined with student and course, for staff views
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedbackEntry {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub student_id: Uuid,
    pub student_name: String,
    pub rating: i16,
    pub comment: String,
    pub updated_at: DateTime<Utc>,
}

const FEEDBACK_COLUMNS: &str =
    "id, student_id, course_id, rating, comment, created_at, updated_at";

impl Feedback {
    /// Records a student's feedback, replacing an earlier one for the course
    pub async fn upsert(
        pool: &PgPool,
        student_id: Uuid,
        course_id: Uuid,
        rating: i16,
        comment: &str,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO course_feedback (student_id, course_id, rating, comment)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (student_id, course_id)
            DO UPDATE SET rating = EXCLUDED.rating,
                          comment = EXCLUDED.comment,
                          updated_at = NOW()
            RETURNING {}
            "#,
            FEEDBACK_COLUMNS
        );

        let feedback = sqlx::query_as::<_, Feedback>(&query)
            .bind(student_id)
            .bind(course_id)
            .bind(rating)
            .bind(comment)
            .fetch_one(pool)
            .await?;

        Ok(feedback)
    }

    /// Feedback entries, newest first, optionally for one course
    pub async fn list_entries(
        pool: &PgPool,
        course_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FeedbackEntry>, sqlx::Error> {
        let entries = sqlx::query_as::<_, FeedbackEntry>(
            r#"
            SELECT f.id, f.course_id, c.title AS course_title, f.student_id,
                   u.first_name || ' ' || u.last_name AS student_name,
                   f.rating, f.comment, f.updated_at
            FROM course_feedback f
            JOIN courses c ON c.id = f.course_id
            JOIN users u ON u.id = f.student_id
            WHERE ($1::uuid IS NULL OR f.course_id = $1)
            ORDER BY f.updated_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(course_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }

    /// Mean rating and number of ratings, optionally for one course
    pub async fn average_rating(
        pool: &PgPool,
        course_id: Option<Uuid>,
    ) -> Result<(Option<f64>, i64), sqlx::Error> {
        let row: (Option<f64>, i64) = sqlx::query_as(
            r#"
            SELECT AVG(rating)::DOUBLE PRECISION, COUNT(*)
            FROM course_feedback
            WHERE ($1::uuid IS NULL OR course_id = $1)
            "#,
        )
        .bind(course_id)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }
}
