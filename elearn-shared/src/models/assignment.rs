/// Assignments and submissions
///
/// A submission is unique per (assignment, student). Resubmitting replaces
/// the content as long as the submission has not been graded yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Assignment {
    pub id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub title: String,
    pub instructions: String,
    pub max_marks: i32,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAssignment {
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub title: String,
    pub instructions: String,
    pub max_marks: i32,
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Submission {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub student_id: Uuid,
    pub content: String,
    pub submitted_at: DateTime<Utc>,
    pub marks_obtained: Option<i32>,
    pub feedback: Option<String>,
    pub graded_at: Option<DateTime<Utc>>,
}

impl Submission {
    pub fn is_graded(&self) -> bool {
        self.graded_at.is_some()
    }
}

/// A student's standing on one assignment of a course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssignmentStanding {
    pub assignment_id: Uuid,
    pub max_marks: i32,
    pub submitted: bool,

    /// `None` until graded
    pub marks_obtained: Option<i32>,
}

impl AssignmentStanding {
    /// Graded mark as a percentage of `max_marks`
    pub fn percent(&self) -> Option<f64> {
        let marks = self.marks_obtained?;
        if self.max_marks <= 0 {
            return None;
        }
        Some(f64::from(marks) * 100.0 / f64::from(self.max_marks))
    }
}

const SUBMISSION_COLUMNS: &str = "id, assignment_id, student_id, content, submitted_at, \
                                  marks_obtained, feedback, graded_at";

impl Assignment {
    pub async fn create(pool: &PgPool, data: CreateAssignment) -> Result<Self, sqlx::Error> {
        let assignment = sqlx::query_as::<_, Assignment>(
            r#"
            INSERT INTO assignments (course_id, lesson_id, title, instructions, max_marks, due_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, course_id, lesson_id, title, instructions, max_marks, due_at, created_at
            "#,
        )
        .bind(data.course_id)
        .bind(data.lesson_id)
        .bind(data.title)
        .bind(data.instructions)
        .bind(data.max_marks)
        .bind(data.due_at)
        .fetch_one(pool)
        .await?;

        Ok(assignment)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let assignment = sqlx::query_as::<_, Assignment>(
            r#"
            SELECT id, course_id, lesson_id, title, instructions, max_marks, due_at, created_at
            FROM assignments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(assignment)
    }

    pub async fn list_by_course(pool: &PgPool, course_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let assignments = sqlx::query_as::<_, Assignment>(
            r#"
            SELECT id, course_id, lesson_id, title, instructions, max_marks, due_at, created_at
            FROM assignments
            WHERE course_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(course_id)
        .fetch_all(pool)
        .await?;

        Ok(assignments)
    }

    /// Submission and grade per assignment of a course for one student
    pub async fn standings(
        pool: &PgPool,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Vec<AssignmentStanding>, sqlx::Error> {
        let standings = sqlx::query_as::<_, AssignmentStanding>(
            r#"
            SELECT a.id AS assignment_id,
                   a.max_marks,
                   (s.id IS NOT NULL) AS submitted,
                   s.marks_obtained
            FROM assignments a
            LEFT JOIN assignment_submissions s
                   ON s.assignment_id = a.id AND s.student_id = $1
            WHERE a.course_id = $2
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_all(pool)
        .await?;

        Ok(standings)
    }
}

impl Submission {
    /// Creates or replaces a student's submission
    ///
    /// Returns `None` when the existing submission is already graded.
    pub async fn upsert(
        pool: &PgPool,
        assignment_id: Uuid,
        student_id: Uuid,
        content: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO assignment_submissions (assignment_id, student_id, content)
            VALUES ($1, $2, $3)
            ON CONFLICT (assignment_id, student_id) DO UPDATE
                SET content = EXCLUDED.content, submitted_at = NOW()
                WHERE assignment_submissions.graded_at IS NULL
            RETURNING {}
            "#,
            SUBMISSION_COLUMNS
        );

        let submission = sqlx::query_as::<_, Submission>(&query)
            .bind(assignment_id)
            .bind(student_id)
            .bind(content)
            .fetch_optional(pool)
            .await?;

        Ok(submission)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM assignment_submissions WHERE id = $1",
            SUBMISSION_COLUMNS
        );

        let submission = sqlx::query_as::<_, Submission>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(submission)
    }

    pub async fn list_by_assignment(
        pool: &PgPool,
        assignment_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM assignment_submissions WHERE assignment_id = $1 ORDER BY submitted_at",
            SUBMISSION_COLUMNS
        );

        let submissions = sqlx::query_as::<_, Submission>(&query)
            .bind(assignment_id)
            .fetch_all(pool)
            .await?;

        Ok(submissions)
    }

    /// Records a grade; grading again overwrites the previous mark
    pub async fn grade(
        pool: &PgPool,
        id: Uuid,
        marks_obtained: i32,
        feedback: Option<String>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE assignment_submissions
            SET marks_obtained = $2, feedback = $3, graded_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SUBMISSION_COLUMNS
        );

        let submission = sqlx::query_as::<_, Submission>(&query)
            .bind(id)
            .bind(marks_obtained)
            .bind(feedback)
            .fetch_optional(pool)
            .await?;

        Ok(submission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standing_percent() {
        let standing = AssignmentStanding {
            assignment_id: Uuid::new_v4(),
            max_marks: 20,
            submitted: true,
            marks_obtained: Some(15),
        };
        assert_eq!(standing.percent(), Some(75.0));

        let ungraded = AssignmentStanding {
            marks_obtained: None,
            ..standing
        };
        assert_eq!(ungraded.percent(), None);
    }
}
