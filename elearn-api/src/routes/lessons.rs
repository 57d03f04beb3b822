/// Lessons: authoring, rendered reading and completion
///
/// Students read lessons only with a paid enrollment. Completing a lesson
/// returns the updated progress and issues the certificate as soon as the
/// student becomes eligible.

use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use elearn_shared::{
    auth::{authorization::CourseAccess, context::AuthContext},
    content::markdown::render_markdown,
    models::{
        certificate::Certificate,
        lesson::{CreateLesson, Lesson, UpdateLesson},
        lesson_progress::LessonProgress,
    },
    services::{ProgressReport, ProgressSnapshot},
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
pub struct LessonListItem {
    pub id: Uuid,
    pub title: String,
    pub position: i32,

    /// Always `false` for staff
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct LessonView {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,

    /// Sanitized HTML rendered from the Markdown source
    pub content_html: String,

    /// Raw Markdown, only for the course's staff
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_markdown: Option<String>,

    pub completed: bool,
    pub previous_lesson_id: Option<Uuid>,
    pub next_lesson_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLessonRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: String,

    #[serde(default)]
    pub content: String,

    /// Appended after the last lesson when omitted
    #[validate(range(min = 0, message = "Position cannot be negative"))]
    pub position: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLessonRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: Option<String>,
    pub content: Option<String>,

    #[validate(range(min = 0, message = "Position cannot be negative"))]
    pub position: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub lesson_id: Uuid,

    /// `false` when the lesson was already complete
    pub newly_completed: bool,

    pub progress: ProgressReport,

    /// Set once the student holds the course certificate
    pub certificate: Option<Certificate>,
}

async fn load_lesson(state: &AppState, lesson_id: Uuid) -> ApiResult<Lesson> {
    Lesson::find_by_id(&state.db, lesson_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Lesson {} not found", lesson_id)))
}

async fn completed_set(
    state: &AppState,
    access: &CourseAccess,
    course_id: Uuid,
) -> ApiResult<HashSet<Uuid>> {
    match access {
        CourseAccess::Learner(enrollment) => Ok(LessonProgress::completed_lesson_ids(
            &state.db,
            enrollment.student_id,
            course_id,
        )
        .await?
        .into_iter()
        .collect()),
        CourseAccess::Staff => Ok(HashSet::new()),
    }
}

pub async fn list_lessons(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Vec<LessonListItem>>> {
    let (course, access) = readable_course(&state, &auth, course_id).await?;
    let completed = completed_set(&state, &access, course.id).await?;

    let lessons = Lesson::list_by_course(&state.db, course.id)
        .await?
        .into_iter()
        .map(|l| LessonListItem {
            completed: completed.contains(&l.id),
            id: l.id,
            title: l.title,
            position: l.position,
        })
        .collect();

    Ok(Json(lessons))
}

pub async fn create_lesson(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateLessonRequest>,
) -> ApiResult<(StatusCode, Json<Lesson>)> {
    authored_course(&state, &auth, course_id).await?;
    req.validate()?;

    let lesson = Lesson::create(
        &state.db,
        CreateLesson {
            course_id,
            title: req.title.trim().to_string(),
            content: req.content,
            position: req.position,
        },
    )
    .await?;

    tracing::info!(%course_id, lesson_id = %lesson.id, "Lesson created");
    Ok((StatusCode::CREATED, Json(lesson)))
}

pub async fn get_lesson(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lesson_id): Path<Uuid>,
) -> ApiResult<Json<LessonView>> {
    let lesson = load_lesson(&state, lesson_id).await?;
    let (course, access) = readable_course(&state, &auth, lesson.course_id).await?;
    let completed = completed_set(&state, &access, course.id).await?;

    let siblings = Lesson::list_by_course(&state.db, course.id).await?;
    let index = siblings.iter().position(|l| l.id == lesson.id);
    let previous_lesson_id = index
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| siblings.get(i))
        .map(|l| l.id);
    let next_lesson_id = index.and_then(|i| siblings.get(i + 1)).map(|l| l.id);

    let content_markdown = match access {
        CourseAccess::Staff => Some(lesson.content.clone()),
        CourseAccess::Learner(_) => None,
    };

    Ok(Json(LessonView {
        content_html: render_markdown(&lesson.content),
        completed: completed.contains(&lesson.id),
        id: lesson.id,
        course_id: lesson.course_id,
        title: lesson.title,
        position: lesson.position,
        content_markdown,
        previous_lesson_id,
        next_lesson_id,
    }))
}

pub async fn update_lesson(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lesson_id): Path<Uuid>,
    Json(req): Json<UpdateLessonRequest>,
) -> ApiResult<Json<Lesson>> {
    let lesson = load_lesson(&state, lesson_id).await?;
    authored_course(&state, &auth, lesson.course_id).await?;
    req.validate()?;

    let lesson = Lesson::update(
        &state.db,
        lesson_id,
        UpdateLesson {
            title: req.title.map(|t| t.trim().to_string()),
            content: req.content,
            position: req.position,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Lesson {} not found", lesson_id)))?;

    Ok(Json(lesson))
}

/// Marks a lesson complete for the calling student
///
/// Idempotent: completing twice returns `newly_completed: false` and the same
/// progress.
pub async fn complete_lesson(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(lesson_id): Path<Uuid>,
) -> ApiResult<Json<CompletionResponse>> {
    let lesson = load_lesson(&state, lesson_id).await?;
    let (course, access) = readable_course(&state, &auth, lesson.course_id).await?;

    let enrollment = match access {
        CourseAccess::Learner(enrollment) => enrollment,
        CourseAccess::Staff => {
            return Err(ApiError::Forbidden(
                "Only enrolled students track progress".to_string(),
            ))
        }
    };

    let newly_completed =
        LessonProgress::mark_complete(&state.db, enrollment.student_id, lesson.id).await?;

    let progress = ProgressSnapshot::load(&state.db, enrollment.student_id, course.id)
        .await?
        .report();

    if newly_completed {
        tracing::info!(
            student_id = %enrollment.student_id,
            course_id = %course.id,
            %lesson_id,
            percent = progress.percent,
            "Lesson completed"
        );
    }

    let certificate = state
        .certificates()
        .issue_if_eligible(enrollment.student_id, course.id)
        .await?
        .certificate()
        .cloned();

    Ok(Json(CompletionResponse {
        lesson_id,
        newly_completed,
        progress,
        certificate,
    }))
}
