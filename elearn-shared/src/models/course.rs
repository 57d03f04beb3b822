/// Course model and database operations
///
/// # Lifecycle
///
/// ```text
/// draft → published → archived
/// ```
///
/// Only published courses accept enrollments. A course that has enrollments
/// is archived instead of deleted so payments and certificates keep their
/// reference.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE courses (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     instructor_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     title VARCHAR(255) NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     content TEXT NOT NULL DEFAULT '',             -- Markdown overview
///     price BIGINT NOT NULL DEFAULT 0 CHECK (price >= 0),
///     difficulty course_difficulty NOT NULL DEFAULT 'beginner',
///     duration_weeks INTEGER NOT NULL DEFAULT 1,
///     status course_status NOT NULL DEFAULT 'draft',
///     completion_threshold SMALLINT,                -- 1..=100
///     min_passing_score SMALLINT,                   -- 0..=100
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Publication state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "course_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Draft,
    Published,
    Archived,
}

impl CourseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::Draft => "draft",
            CourseStatus::Published => "published",
            CourseStatus::Archived => "archived",
        }
    }

    pub fn can_transition_to(&self, target: CourseStatus) -> bool {
        matches!(
            (self, target),
            (CourseStatus::Draft, CourseStatus::Published)
                | (CourseStatus::Draft, CourseStatus::Archived)
                | (CourseStatus::Published, CourseStatus::Archived)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "course_difficulty", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: Uuid,

    /// Owning instructor; `None` once the instructor account is removed
    pub instructor_id: Option<Uuid>,

    pub title: String,
    pub description: String,

    /// Markdown overview
    pub content: String,

    /// Price in whole XOF
    pub price: i64,

    pub difficulty: Difficulty,
    pub duration_weeks: i32,
    pub status: CourseStatus,

    /// Overrides the platform certificate threshold (percent)
    pub completion_threshold: Option<i16>,

    /// Minimum score (percent) every graded component must reach
    pub min_passing_score: Option<i16>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn is_free(&self) -> bool {
        self.price == 0
    }

    pub fn is_published(&self) -> bool {
        self.status == CourseStatus::Published
    }

    /// Whether `user_id` owns this course
    pub fn is_taught_by(&self, user_id: Uuid) -> bool {
        self.instructor_id == Some(user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCourse {
    pub instructor_id: Uuid,
    pub title: String,
    pub description: String,
    pub content: String,
    pub price: i64,
    pub difficulty: Difficulty,
    pub duration_weeks: i32,
    pub completion_threshold: Option<i16>,
    pub min_passing_score: Option<i16>,
}

/// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCourse {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub price: Option<i64>,
    pub difficulty: Option<Difficulty>,
    pub duration_weeks: Option<i32>,

    /// `Some(None)` clears the override
    pub completion_threshold: Option<Option<i16>>,

    /// `Some(None)` clears the minimum
    pub min_passing_score: Option<Option<i16>>,
}

impl UpdateCourse {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.content.is_none()
            && self.price.is_none()
            && self.difficulty.is_none()
            && self.duration_weeks.is_none()
            && self.completion_threshold.is_none()
            && self.min_passing_score.is_none()
    }
}

/// Per-course numbers for manager analytics
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseStats {
    pub course_id: Uuid,
    pub title: String,
    pub status: CourseStatus,
    pub enrollments: i64,
    pub paid_enrollments: i64,
    pub revenue: i64,
}

const COURSE_COLUMNS: &str = "id, instructor_id, title, description, content, price, difficulty, \
                              duration_weeks, status, completion_threshold, min_passing_score, \
                              created_at, updated_at";

impl Course {
    pub async fn create(pool: &PgPool, data: CreateCourse) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO courses (instructor_id, title, description, content, price, difficulty,
                                 duration_weeks, completion_threshold, min_passing_score)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            COURSE_COLUMNS
        );

        let course = sqlx::query_as::<_, Course>(&query)
            .bind(data.instructor_id)
            .bind(data.title)
            .bind(data.description)
            .bind(data.content)
            .bind(data.price)
            .bind(data.difficulty)
            .bind(data.duration_weeks)
            .bind(data.completion_threshold)
            .bind(data.min_passing_score)
            .fetch_one(pool)
            .await?;

        Ok(course)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM courses WHERE id = $1", COURSE_COLUMNS);

        let course = sqlx::query_as::<_, Course>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(course)
    }

    /// Published catalogue, newest first
    pub async fn list_published(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {}
            FROM courses
            WHERE status = 'published'
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
            COURSE_COLUMNS
        );

        let courses = sqlx::query_as::<_, Course>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok(courses)
    }

    /// Every course owned by an instructor, any status
    pub async fn list_by_instructor(
        pool: &PgPool,
        instructor_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM courses WHERE instructor_id = $1 ORDER BY created_at DESC",
            COURSE_COLUMNS
        );

        let courses = sqlx::query_as::<_, Course>(&query)
            .bind(instructor_id)
            .fetch_all(pool)
            .await?;

        Ok(courses)
    }

    /// Applies a partial update
    ///
    /// Returns `None` if the course does not exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateCourse,
    ) -> Result<Option<Self>, sqlx::Error> {
        // Build the SET list from the fields that are present
        let mut query = String::from("UPDATE courses SET updated_at = NOW()");
        let mut bind_count = 1;

        let mut push = |column: &str, present: bool| {
            if present {
                bind_count += 1;
                query.push_str(&format!(", {} = ${}", column, bind_count));
            }
        };
        push("title", data.title.is_some());
        push("description", data.description.is_some());
        push("content", data.content.is_some());
        push("price", data.price.is_some());
        push("difficulty", data.difficulty.is_some());
        push("duration_weeks", data.duration_weeks.is_some());
        push("completion_threshold", data.completion_threshold.is_some());
        push("min_passing_score", data.min_passing_score.is_some());

        query.push_str(&format!(" WHERE id = $1 RETURNING {}", COURSE_COLUMNS));

        let mut q = sqlx::query_as::<_, Course>(&query).bind(id);

        if let Some(title) = data.title {
            q = q.bind(title);
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(content) = data.content {
            q = q.bind(content);
        }
        if let Some(price) = data.price {
            q = q.bind(price);
        }
        if let Some(difficulty) = data.difficulty {
            q = q.bind(difficulty);
        }
        if let Some(weeks) = data.duration_weeks {
            q = q.bind(weeks);
        }
        if let Some(threshold) = data.completion_threshold {
            q = q.bind(threshold);
        }
        if let Some(min_score) = data.min_passing_score {
            q = q.bind(min_score);
        }

        let course = q.fetch_optional(pool).await?;

        Ok(course)
    }

    /// Hands a course over to another instructor
    pub async fn assign_instructor(
        pool: &PgPool,
        id: Uuid,
        instructor_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE courses SET instructor_id = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            COURSE_COLUMNS
        );

        let course = sqlx::query_as::<_, Course>(&query)
            .bind(id)
            .bind(instructor_id)
            .fetch_optional(pool)
            .await?;

        Ok(course)
    }

    /// Moves a draft course to published
    ///
    /// Returns `None` if the course is not a draft.
    pub async fn publish(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE courses
            SET status = 'published', updated_at = NOW()
            WHERE id = $1 AND status = 'draft'
            RETURNING {}
            "#,
            COURSE_COLUMNS
        );

        let course = sqlx::query_as::<_, Course>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(course)
    }

    /// Archives a draft or published course
    pub async fn archive(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE courses
            SET status = 'archived', updated_at = NOW()
            WHERE id = $1 AND status <> 'archived'
            RETURNING {}
            "#,
            COURSE_COLUMNS
        );

        let course = sqlx::query_as::<_, Course>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(course)
    }

    /// Deletes a course only if nobody ever enrolled
    ///
    /// Returns `false` when enrollments exist (archive instead) or the course
    /// is missing.
    pub async fn delete_if_unenrolled(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM courses
            WHERE id = $1
              AND NOT EXISTS (SELECT 1 FROM enrollments WHERE course_id = $1)
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM courses")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    /// Enrollment and revenue figures per course
    ///
    /// `instructor_id` restricts the result to one instructor's courses.
    pub async fn stats(
        pool: &PgPool,
        instructor_id: Option<Uuid>,
    ) -> Result<Vec<CourseStats>, sqlx::Error> {
        let stats = sqlx::query_as::<_, CourseStats>(
            r#"
            SELECT c.id AS course_id,
                   c.title,
                   c.status,
                   COUNT(DISTINCT e.id) AS enrollments,
                   COUNT(DISTINCT e.id) FILTER (WHERE e.status = 'paid') AS paid_enrollments,
                   COALESCE((
                       SELECT SUM(p.amount)
                       FROM payments p
                       JOIN enrollments pe ON pe.id = p.enrollment_id
                       WHERE pe.course_id = c.id AND p.status = 'paid'
                   ), 0)::BIGINT AS revenue
            FROM courses c
            LEFT JOIN enrollments e ON e.course_id = c.id
            WHERE ($1::UUID IS NULL OR c.instructor_id = $1)
            GROUP BY c.id, c.title, c.status
            ORDER BY c.title
            "#,
        )
        .bind(instructor_id)
        .fetch_all(pool)
        .await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(CourseStatus::Draft.can_transition_to(CourseStatus::Published));
        assert!(CourseStatus::Published.can_transition_to(CourseStatus::Archived));
        assert!(!CourseStatus::Archived.can_transition_to(CourseStatus::Published));
        assert!(!CourseStatus::Published.can_transition_to(CourseStatus::Draft));
    }

    #[test]
    fn test_update_course_is_empty() {
        assert!(UpdateCourse::default().is_empty());

        let update = UpdateCourse {
            min_passing_score: Some(None),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_difficulty_default() {
        assert_eq!(Difficulty::default(), Difficulty::Beginner);
        assert_eq!(
            serde_json::to_string(&Difficulty::Advanced).unwrap(),
            "\"advanced\""
        );
    }
}
