/// Assignments, submissions and grading
///
/// A submission counts toward progress as soon as it exists; its grade only
/// matters for courses that set a minimum passing score. Late submissions are
/// accepted and flagged.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use elearn_shared::{
    auth::{
        authorization::{require_course_author, CourseAccess},
        context::AuthContext,
    },
    models::{
        assignment::{Assignment, AssignmentStanding, CreateAssignment, Submission},
        certificate::Certificate,
        lesson::Lesson,
    },
    services::{ProgressReport, ProgressSnapshot},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{authored_course, load_course, readable_course};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

#[derive(Debug, Serialize)]
pub struct AssignmentView {
    #[serde(flatten)]
    pub assignment: Assignment,

    /// The learner's own submission state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standing: Option<AssignmentStanding>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssignmentRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: String,

    #[serde(default)]
    pub instructions: String,

    #[validate(range(min = 1, max = 1000, message = "Max marks must be between 1 and 1000"))]
    #[serde(default = "default_max_marks")]
    pub max_marks: i32,

    pub due_at: Option<DateTime<Utc>>,
    pub lesson_id: Option<Uuid>,
}

fn default_max_marks() -> i32 {
    20
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(length(min = 1, message = "Submission cannot be empty"))]
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub submission: Submission,

    /// Submitted after the due date
    pub late: bool,

    pub progress: ProgressReport,
    pub certificate: Option<Certificate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GradeRequest {
    #[validate(range(min = 0, message = "Marks cannot be negative"))]
    pub marks_obtained: i32,

    pub feedback: Option<String>,
}

async fn load_assignment(state: &AppState, assignment_id: Uuid) -> ApiResult<Assignment> {
    Assignment::find_by_id(&state.db, assignment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Assignment {} not found", assignment_id)))
}

pub async fn list_assignments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Vec<AssignmentView>>> {
    let (course, access) = readable_course(&state, &auth, course_id).await?;

    let mut standings = match &access {
        CourseAccess::Learner(enrollment) => {
            Assignment::standings(&state.db, enrollment.student_id, course.id).await?
        }
        CourseAccess::Staff => Vec::new(),
    };

    let assignments = Assignment::list_by_course(&state.db, course.id)
        .await?
        .into_iter()
        .map(|assignment| {
            let standing = standings
                .iter()
                .position(|s| s.assignment_id == assignment.id)
                .map(|i| standings.swap_remove(i));
            AssignmentView { assignment, standing }
        })
        .collect();

    Ok(Json(assignments))
}

pub async fn create_assignment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateAssignmentRequest>,
) -> ApiResult<(StatusCode, Json<Assignment>)> {
    authored_course(&state, &auth, course_id).await?;
    req.validate()?;

    if let Some(lesson_id) = req.lesson_id {
        let belongs = Lesson::find_by_id(&state.db, lesson_id)
            .await?
            .map_or(false, |l| l.course_id == course_id);
        if !belongs {
            return Err(ApiError::invalid("lesson_id", "Lesson is not part of this course"));
        }
    }

    let assignment = Assignment::create(
        &state.db,
        CreateAssignment {
            course_id,
            lesson_id: req.lesson_id,
            title: req.title.trim().to_string(),
            instructions: req.instructions,
            max_marks: req.max_marks,
            due_at: req.due_at,
        },
    )
    .await?;

    tracing::info!(%course_id, assignment_id = %assignment.id, "Assignment created");
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// Creates or replaces the caller's submission
///
/// # Errors
///
/// - `403` for staff or students without a paid enrollment
/// - `409` when the submission has already been graded
pub async fn submit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(assignment_id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<Json<SubmissionResponse>> {
    req.validate()?;

    let assignment = load_assignment(&state, assignment_id).await?;
    let (course, access) = readable_course(&state, &auth, assignment.course_id).await?;

    let student_id = match access {
        CourseAccess::Learner(enrollment) => enrollment.student_id,
        CourseAccess::Staff => {
            return Err(ApiError::Forbidden(
                "Only enrolled students submit assignments".to_string(),
            ))
        }
    };

    let submission = Submission::upsert(&state.db, assignment.id, student_id, &req.content)
        .await?
        .ok_or_else(|| ApiError::Conflict {
            code: "already_graded",
            message: "This submission has already been graded".to_string(),
        })?;

    let late = assignment
        .due_at
        .map_or(false, |due| submission.submitted_at > due);

    tracing::info!(%student_id, %assignment_id, late, "Assignment submitted");

    let progress = ProgressSnapshot::load(&state.db, student_id, course.id)
        .await?
        .report();

    let certificate = state
        .certificates()
        .issue_if_eligible(student_id, course.id)
        .await?
        .certificate()
        .cloned();

    Ok(Json(SubmissionResponse {
        submission,
        late,
        progress,
        certificate,
    }))
}

/// Staff see every submission; students see their own
pub async fn list_submissions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(assignment_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Submission>>> {
    let assignment = load_assignment(&state, assignment_id).await?;
    let (_, access) = readable_course(&state, &auth, assignment.course_id).await?;

    let submissions = Submission::list_by_assignment(&state.db, assignment.id).await?;

    let visible = match access {
        CourseAccess::Staff => submissions,
        CourseAccess::Learner(enrollment) => submissions
            .into_iter()
            .filter(|s| s.student_id == enrollment.student_id)
            .collect(),
    };

    Ok(Json(visible))
}

/// Grades a submission and re-evaluates the student's certificate
pub async fn grade_submission(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(submission_id): Path<Uuid>,
    Json(req): Json<GradeRequest>,
) -> ApiResult<Json<Submission>> {
    req.validate()?;

    let submission = Submission::find_by_id(&state.db, submission_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Submission {} not found", submission_id)))?;
    let assignment = load_assignment(&state, submission.assignment_id).await?;
    let course = load_course(&state, assignment.course_id).await?;
    require_course_author(&auth, &course)?;

    if req.marks_obtained > assignment.max_marks {
        return Err(ApiError::invalid(
            "marks_obtained",
            format!("Marks cannot exceed {}", assignment.max_marks),
        ));
    }

    let feedback = req.feedback.map(|f| f.trim().to_string()).filter(|f| !f.is_empty());
    let graded = Submission::grade(&state.db, submission.id, req.marks_obtained, feedback)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Submission {} not found", submission_id)))?;

    tracing::info!(
        %submission_id,
        student_id = %graded.student_id,
        marks = req.marks_obtained,
        max_marks = assignment.max_marks,
        "Submission graded"
    );

    state
        .certificates()
        .issue_if_eligible(graded.student_id, course.id)
        .await?;

    Ok(Json(graded))
}
