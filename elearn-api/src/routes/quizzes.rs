/// Quizzes and graded attempts
///
/// Students never see which choices are correct. An attempt is graded on the
/// server, counted against `max_attempts` and may trigger certificate
/// issuance.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use elearn_shared::{
    auth::{authorization::CourseAccess, context::AuthContext},
    models::{
        certificate::Certificate,
        lesson::Lesson,
        quiz::{
            CreateChoice, CreateQuestion, CreateQuiz, QuestionKind, QuestionWithChoices, Quiz,
            QuizAttempt,
        },
    },
    services::{grading::grade_quiz, grading::QuizResult, ProgressReport, ProgressSnapshot},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{authored_course, readable_course};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

#[derive(Debug, Serialize)]
pub struct QuizSummary {
    #[serde(flatten)]
    pub quiz: Quiz,

    /// Learner's best score so far
    pub best_score: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Serialize)]
pub struct ChoiceView {
    pub id: Uuid,
    pub label: String,

    /// Only revealed to the course's staff
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: Uuid,
    pub prompt: String,
    pub kind: QuestionKind,
    pub points: i32,
    pub choices: Vec<ChoiceView>,
}

impl QuestionView {
    fn new(entry: QuestionWithChoices, reveal: bool) -> Self {
        Self {
            id: entry.question.id,
            prompt: entry.question.prompt,
            kind: entry.question.kind,
            points: entry.question.points,
            choices: entry
                .choices
                .into_iter()
                .map(|c| ChoiceView {
                    id: c.id,
                    label: c.label,
                    is_correct: reveal.then_some(c.is_correct),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateChoiceRequest {
    #[validate(length(min = 1, message = "Choice label cannot be empty"))]
    pub label: String,

    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, message = "Prompt cannot be empty"))]
    pub prompt: String,

    #[serde(default)]
    pub kind: QuestionKind,

    #[validate(range(min = 1, max = 100, message = "Points must be between 1 and 100"))]
    #[serde(default = "default_points")]
    pub points: i32,

    #[validate(length(min = 2, message = "A question needs at least two choices"), nested)]
    pub choices: Vec<CreateChoiceRequest>,
}

fn default_points() -> i32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: String,

    pub lesson_id: Option<Uuid>,

    #[validate(range(min = 0, max = 100, message = "Pass mark must be between 0 and 100"))]
    #[serde(default = "default_pass_mark")]
    pub pass_mark: i16,

    #[validate(range(min = 1, max = 100, message = "Attempts must be between 1 and 100"))]
    #[serde(default = "default_attempts")]
    pub max_attempts: i32,

    #[validate(length(min = 1, message = "A quiz needs at least one question"), nested)]
    pub questions: Vec<CreateQuestionRequest>,
}

fn default_pass_mark() -> i16 {
    50
}

fn default_attempts() -> i32 {
    1
}

impl CreateQuestionRequest {
    /// Choice count rules the derive cannot express
    fn check_answer_key(&self, index: usize) -> ApiResult<()> {
        let correct = self.choices.iter().filter(|c| c.is_correct).count();
        let valid = match self.kind {
            QuestionKind::Single => correct == 1,
            QuestionKind::Multiple => correct >= 1,
        };

        if valid {
            Ok(())
        } else {
            Err(ApiError::invalid(
                &format!("questions[{}].choices", index),
                match self.kind {
                    QuestionKind::Single => "Single-choice questions need exactly one correct choice",
                    QuestionKind::Multiple => "Multiple-choice questions need a correct choice",
                },
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AttemptRequest {
    /// Question id to selected choice ids
    #[serde(default)]
    pub answers: HashMap<Uuid, Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct AttemptResponse {
    pub attempt: QuizAttempt,
    pub result: QuizResult,
    pub attempts_remaining: i32,
    pub progress: ProgressReport,
    pub certificate: Option<Certificate>,
}

async fn load_quiz(state: &AppState, quiz_id: Uuid) -> ApiResult<Quiz> {
    Quiz::find_by_id(&state.db, quiz_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Quiz {} not found", quiz_id)))
}

pub async fn list_quizzes(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Vec<QuizSummary>>> {
    let (course, access) = readable_course(&state, &auth, course_id).await?;

    let standings = match &access {
        CourseAccess::Learner(enrollment) => {
            Quiz::standings(&state.db, enrollment.student_id, course.id).await?
        }
        CourseAccess::Staff => Vec::new(),
    };

    let quizzes = Quiz::list_by_course(&state.db, course.id)
        .await?
        .into_iter()
        .map(|quiz| {
            let standing = standings.iter().find(|s| s.quiz_id == quiz.id);
            QuizSummary {
                best_score: standing.and_then(|s| s.best_score),
                passed: standing.map_or(false, |s| s.passed),
                quiz,
            }
        })
        .collect();

    Ok(Json(quizzes))
}

pub async fn create_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateQuizRequest>,
) -> ApiResult<(StatusCode, Json<QuizDetail>)> {
    authored_course(&state, &auth, course_id).await?;
    req.validate()?;

    for (index, question) in req.questions.iter().enumerate() {
        question.check_answer_key(index)?;
    }

    if let Some(lesson_id) = req.lesson_id {
        let belongs = Lesson::find_by_id(&state.db, lesson_id)
            .await?
            .map_or(false, |l| l.course_id == course_id);
        if !belongs {
            return Err(ApiError::invalid("lesson_id", "Lesson is not part of this course"));
        }
    }

    let (quiz, questions) = Quiz::create(
        &state.db,
        CreateQuiz {
            course_id,
            lesson_id: req.lesson_id,
            title: req.title.trim().to_string(),
            pass_mark: req.pass_mark,
            max_attempts: req.max_attempts,
            questions: req
                .questions
                .into_iter()
                .map(|q| CreateQuestion {
                    prompt: q.prompt,
                    kind: q.kind,
                    points: q.points,
                    choices: q
                        .choices
                        .into_iter()
                        .map(|c| CreateChoice {
                            label: c.label,
                            is_correct: c.is_correct,
                        })
                        .collect(),
                })
                .collect(),
        },
    )
    .await?;

    tracing::info!(%course_id, quiz_id = %quiz.id, questions = questions.len(), "Quiz created");

    Ok((
        StatusCode::CREATED,
        Json(QuizDetail {
            quiz,
            questions: questions.into_iter().map(|q| QuestionView::new(q, true)).collect(),
        }),
    ))
}

pub async fn get_quiz(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
) -> ApiResult<Json<QuizDetail>> {
    let quiz = load_quiz(&state, quiz_id).await?;
    let (_, access) = readable_course(&state, &auth, quiz.course_id).await?;
    let reveal = matches!(access, CourseAccess::Staff);

    let questions = Quiz::load_questions(&state.db, quiz.id)
        .await?
        .into_iter()
        .map(|q| QuestionView::new(q, reveal))
        .collect();

    Ok(Json(QuizDetail { quiz, questions }))
}

/// Grades and records an attempt
///
/// # Errors
///
/// - `403` for staff or students without a paid enrollment
/// - `409` once `max_attempts` is used up
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
    Json(req): Json<AttemptRequest>,
) -> ApiResult<(StatusCode, Json<AttemptResponse>)> {
    let quiz = load_quiz(&state, quiz_id).await?;
    let (course, access) = readable_course(&state, &auth, quiz.course_id).await?;

    let student_id = match access {
        CourseAccess::Learner(enrollment) => enrollment.student_id,
        CourseAccess::Staff => {
            return Err(ApiError::Forbidden("Only enrolled students take quizzes".to_string()))
        }
    };

    let questions = Quiz::load_questions(&state.db, quiz.id).await?;
    let result = grade_quiz(&questions, &req.answers, quiz.pass_mark);

    let attempt =
        QuizAttempt::create_within_limit(&state.db, &quiz, student_id, result.score, result.passed)
            .await?
            .ok_or_else(|| ApiError::Conflict {
                code: "attempt_limit",
                message: format!("All {} attempts have been used", quiz.max_attempts),
            })?;

    let used = QuizAttempt::list_for_student(&state.db, quiz.id, student_id)
        .await?
        .len();
    let attempts_remaining = quiz
        .max_attempts
        .saturating_sub(i32::try_from(used).unwrap_or(i32::MAX))
        .max(0);

    tracing::info!(
        %student_id,
        %quiz_id,
        score = result.score,
        passed = result.passed,
        "Quiz attempt graded"
    );

    let progress = ProgressSnapshot::load(&state.db, student_id, course.id)
        .await?
        .report();

    let certificate = state
        .certificates()
        .issue_if_eligible(student_id, course.id)
        .await?
        .certificate()
        .cloned();

    Ok((
        StatusCode::CREATED,
        Json(AttemptResponse {
            attempt,
            result,
            attempts_remaining,
            progress,
            certificate,
        }),
    ))
}

pub async fn list_attempts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(quiz_id): Path<Uuid>,
) -> ApiResult<Json<Vec<QuizAttempt>>> {
    let quiz = load_quiz(&state, quiz_id).await?;
    readable_course(&state, &auth, quiz.course_id).await?;

    Ok(Json(
        QuizAttempt::list_for_student(&state.db, quiz.id, auth.user_id).await?,
    ))
}
