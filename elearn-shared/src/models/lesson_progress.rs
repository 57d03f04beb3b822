/// Lesson completion records
///
/// A completion is written once per (student, lesson) and never removed,
/// which keeps course progress monotonic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LessonProgress {
    pub student_id: Uuid,
    pub lesson_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

impl LessonProgress {
    /// Records a completion
    ///
    /// Returns `true` when this call created the record, `false` when the
    /// lesson was already complete.
    pub async fn mark_complete(
        pool: &PgPool,
        student_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO lesson_progress (student_id, lesson_id)
            VALUES ($1, $2)
            ON CONFLICT (student_id, lesson_id) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(lesson_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Ids of the lessons of `course_id` the student completed
    pub async fn completed_lesson_ids(
        pool: &PgPool,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT lp.lesson_id
            FROM lesson_progress lp
            JOIN lessons l ON l.id = lp.lesson_id
            WHERE lp.student_id = $1 AND l.course_id = $2
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
