/// Lesson model
///
/// Lessons hold the Markdown body of a course, displayed in `position` order.
/// Rendering to HTML happens in `content::markdown` at read time; the stored
/// text is always the raw Markdown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,

    /// Markdown source
    pub content: String,

    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLesson {
    pub course_id: Uuid,
    pub title: String,
    pub content: String,

    /// Appended after the last lesson when `None`
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLesson {
    pub title: Option<String>,
    pub content: Option<String>,
    pub position: Option<i32>,
}

impl Lesson {
    pub async fn create(pool: &PgPool, data: CreateLesson) -> Result<Self, sqlx::Error> {
        let lesson = sqlx::query_as::<_, Lesson>(
            r#"
            INSERT INTO lessons (course_id, title, content, position)
            VALUES (
                $1, $2, $3,
                COALESCE($4, (SELECT COALESCE(MAX(position), 0) + 1 FROM lessons WHERE course_id = $1))
            )
            RETURNING id, course_id, title, content, position, created_at, updated_at
            "#,
        )
        .bind(data.course_id)
        .bind(data.title)
        .bind(data.content)
        .bind(data.position)
        .fetch_one(pool)
        .await?;

        Ok(lesson)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let lesson = sqlx::query_as::<_, Lesson>(
            r#"
            SELECT id, course_id, title, content, position, created_at, updated_at
            FROM lessons
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(lesson)
    }

    /// Lessons of a course in display order
    pub async fn list_by_course(pool: &PgPool, course_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let lessons = sqlx::query_as::<_, Lesson>(
            r#"
            SELECT id, course_id, title, content, position, created_at, updated_at
            FROM lessons
            WHERE course_id = $1
            ORDER BY position, created_at
            "#,
        )
        .bind(course_id)
        .fetch_all(pool)
        .await?;

        Ok(lessons)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateLesson,
    ) -> Result<Option<Self>, sqlx::Error> {
        let lesson = sqlx::query_as::<_, Lesson>(
            r#"
            UPDATE lessons
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                position = COALESCE($4, position),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, course_id, title, content, position, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(data.title)
        .bind(data.content)
        .bind(data.position)
        .fetch_optional(pool)
        .await?;

        Ok(lesson)
    }
}
