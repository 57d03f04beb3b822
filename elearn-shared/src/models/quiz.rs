/// Quizzes, questions, choices and attempts
///
/// A quiz belongs to a course (optionally attached to a lesson) and is made
/// of single- or multiple-choice questions worth a number of points. Grading
/// lives in `services::grading`; this module only persists.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE quizzes (
///     id UUID PRIMARY KEY,
///     course_id UUID NOT NULL REFERENCES courses(id),
///     lesson_id UUID REFERENCES lessons(id),
///     title VARCHAR(255) NOT NULL,
///     pass_mark SMALLINT NOT NULL DEFAULT 50,
///     max_attempts INTEGER NOT NULL DEFAULT 1,
///     created_at TIMESTAMPTZ NOT NULL
/// );
///
/// CREATE TABLE quiz_questions (id, quiz_id, prompt, kind question_kind, points, position);
/// CREATE TABLE quiz_choices (id, question_id, label, is_correct);
/// CREATE TABLE quiz_attempts (id, quiz_id, student_id, score DOUBLE PRECISION, passed, attempted_at);
/// ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "question_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    #[default]
    Single,
    Multiple,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Quiz {
    pub id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub title: String,

    /// Minimum score (percent) for an attempt to pass
    pub pass_mark: i16,

    pub max_attempts: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Question {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub prompt: String,
    pub kind: QuestionKind,
    pub points: i32,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Choice {
    pub id: Uuid,
    pub question_id: Uuid,
    pub label: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionWithChoices {
    #[serde(flatten)]
    pub question: Question,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChoice {
    pub label: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuestion {
    pub prompt: String,
    pub kind: QuestionKind,
    pub points: i32,
    pub choices: Vec<CreateChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuiz {
    pub course_id: Uuid,
    pub lesson_id: Option<Uuid>,
    pub title: String,
    pub pass_mark: i16,
    pub max_attempts: i32,
    pub questions: Vec<CreateQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub student_id: Uuid,

    /// Percentage in [0, 100]
    pub score: f64,

    pub passed: bool,
    pub attempted_at: DateTime<Utc>,
}

/// A student's standing on one quiz of a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QuizStanding {
    pub quiz_id: Uuid,
    pub pass_mark: i16,

    /// Best score over all attempts, `None` before the first attempt
    pub best_score: Option<f64>,

    /// Whether any attempt passed
    pub passed: bool,
}

impl Quiz {
    /// Creates a quiz with its questions and choices in one transaction
    pub async fn create(
        pool: &PgPool,
        data: CreateQuiz,
    ) -> Result<(Self, Vec<QuestionWithChoices>), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            INSERT INTO quizzes (course_id, lesson_id, title, pass_mark, max_attempts)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, course_id, lesson_id, title, pass_mark, max_attempts, created_at
            "#,
        )
        .bind(data.course_id)
        .bind(data.lesson_id)
        .bind(&data.title)
        .bind(data.pass_mark)
        .bind(data.max_attempts)
        .fetch_one(&mut *tx)
        .await?;

        let mut questions = Vec::with_capacity(data.questions.len());
        for (position, new_question) in data.questions.into_iter().enumerate() {
            let question = sqlx::query_as::<_, Question>(
                r#"
                INSERT INTO quiz_questions (quiz_id, prompt, kind, points, position)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, quiz_id, prompt, kind, points, position
                "#,
            )
            .bind(quiz.id)
            .bind(&new_question.prompt)
            .bind(new_question.kind)
            .bind(new_question.points)
            .bind(position as i32)
            .fetch_one(&mut *tx)
            .await?;

            let mut choices = Vec::with_capacity(new_question.choices.len());
            for new_choice in new_question.choices {
                let choice = sqlx::query_as::<_, Choice>(
                    r#"
                    INSERT INTO quiz_choices (question_id, label, is_correct)
                    VALUES ($1, $2, $3)
                    RETURNING id, question_id, label, is_correct
                    "#,
                )
                .bind(question.id)
                .bind(new_choice.label)
                .bind(new_choice.is_correct)
                .fetch_one(&mut *tx)
                .await?;
                choices.push(choice);
            }

            questions.push(QuestionWithChoices { question, choices });
        }

        tx.commit().await?;

        Ok((quiz, questions))
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let quiz = sqlx::query_as::<_, Quiz>(
            r#"
            SELECT id, course_id, lesson_id, title, pass_mark, max_attempts, created_at
            FROM quizzes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(quiz)
    }

    pub async fn list_by_course(pool: &PgPool, course_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let quizzes = sqlx::query_as::<_, Quiz>(
            r#"
            SELECT id, course_id, lesson_id, title, pass_mark, max_attempts, created_at
            FROM quizzes
            WHERE course_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(course_id)
        .fetch_all(pool)
        .await?;

        Ok(quizzes)
    }

    /// Questions of a quiz in order, each with its choices
    pub async fn load_questions(
        pool: &PgPool,
        quiz_id: Uuid,
    ) -> Result<Vec<QuestionWithChoices>, sqlx::Error> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, quiz_id, prompt, kind, points, position
            FROM quiz_questions
            WHERE quiz_id = $1
            ORDER BY position
            "#,
        )
        .bind(quiz_id)
        .fetch_all(pool)
        .await?;

        let choices = sqlx::query_as::<_, Choice>(
            r#"
            SELECT c.id, c.question_id, c.label, c.is_correct
            FROM quiz_choices c
            JOIN quiz_questions q ON q.id = c.question_id
            WHERE q.quiz_id = $1
            ORDER BY c.id
            "#,
        )
        .bind(quiz_id)
        .fetch_all(pool)
        .await?;

        let mut by_question: HashMap<Uuid, Vec<Choice>> = HashMap::new();
        for choice in choices {
            by_question.entry(choice.question_id).or_default().push(choice);
        }

        Ok(questions
            .into_iter()
            .map(|question| {
                let choices = by_question.remove(&question.id).unwrap_or_default();
                QuestionWithChoices { question, choices }
            })
            .collect())
    }

    /// Best score and pass flag per quiz of a course for one student
    pub async fn standings(
        pool: &PgPool,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Vec<QuizStanding>, sqlx::Error> {
        let standings = sqlx::query_as::<_, QuizStanding>(
            r#"
            SELECT q.id AS quiz_id,
                   q.pass_mark,
                   MAX(a.score) AS best_score,
                   COALESCE(BOOL_OR(a.passed), FALSE) AS passed
            FROM quizzes q
            LEFT JOIN quiz_attempts a ON a.quiz_id = q.id AND a.student_id = $1
            WHERE q.course_id = $2
            GROUP BY q.id, q.pass_mark
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_all(pool)
        .await?;

        Ok(standings)
    }
}

impl QuizAttempt {
    /// Records an attempt unless the student has used up `max_attempts`
    ///
    /// Returns `None` when the attempt limit is already reached. The quiz row
    /// is locked for the duration of the count and insert, so concurrent
    /// attempts on the same quiz are counted one after another.
    pub async fn create_within_limit(
        pool: &PgPool,
        quiz: &Quiz,
        student_id: Uuid,
        score: f64,
        passed: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT id FROM quizzes WHERE id = $1 FOR UPDATE")
            .bind(quiz.id)
            .fetch_optional(&mut *tx)
            .await?;

        let attempt = sqlx::query_as::<_, QuizAttempt>(
            r#"
            INSERT INTO quiz_attempts (quiz_id, student_id, score, passed)
            SELECT $1, $2, $3, $4
            WHERE (
                SELECT COUNT(*) FROM quiz_attempts WHERE quiz_id = $1 AND student_id = $2
            ) < $5
            RETURNING id, quiz_id, student_id, score, passed, attempted_at
            "#,
        )
        .bind(quiz.id)
        .bind(student_id)
        .bind(score)
        .bind(passed)
        .bind(i64::from(quiz.max_attempts))
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(attempt)
    }

    pub async fn list_for_student(
        pool: &PgPool,
        quiz_id: Uuid,
        student_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let attempts = sqlx::query_as::<_, QuizAttempt>(
            r#"
            SELECT id, quiz_id, student_id, score, passed, attempted_at
            FROM quiz_attempts
            WHERE quiz_id = $1 AND student_id = $2
            ORDER BY attempted_at
            "#,
        )
        .bind(quiz_id)
        .bind(student_id)
        .fetch_all(pool)
        .await?;

        Ok(attempts)
    }
}
