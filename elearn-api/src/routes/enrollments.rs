/// Enrollment, payment initiation and progress
///
/// Enrolling creates a `pending` enrollment. The student then starts a
/// payment, which either redirects to the FedaPay checkout or settles free
/// courses immediately. Content unlocks once the enrollment is `paid`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use elearn_shared::{
    auth::{authorization::require_paid_enrollment, context::AuthContext},
    models::enrollment::{Enrollment, EnrollmentWithCourse},
    services::{InitiatedPayment, ProgressReport, ProgressSnapshot},
};
use serde::Serialize;
use uuid::Uuid;

use super::{load_course, load_user, require_student};
use crate::{app::AppState, error::ApiResult};

#[derive(Debug, Serialize)]
pub struct EnrollmentResponse {
    pub enrollment: Enrollment,

    /// `false` when the student was already enrolled
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub course_id: Uuid,
    pub student_id: Uuid,

    #[serde(flatten)]
    pub report: ProgressReport,
}

/// Enrolls the calling student
///
/// Returns `201` for a new enrollment and `200` with the existing one
/// otherwise.
pub async fn enroll(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<EnrollmentResponse>)> {
    require_student(&auth)?;

    let (enrollment, created) = state.payments().enroll(auth.user_id, course_id).await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(EnrollmentResponse { enrollment, created })))
}

pub async fn list_enrollments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<EnrollmentWithCourse>>> {
    require_student(&auth)?;

    let enrollments = Enrollment::list_by_student(&state.db, auth.user_id).await?;
    Ok(Json(enrollments))
}

/// Starts (or restarts) payment of an enrollment
///
/// A checkout the gateway still reports pending is handed back instead of
/// opening a second one.
///
/// # Errors
///
/// - `404` when the enrollment does not belong to the caller
/// - `409` when it is already paid or another request is opening a checkout
/// - `503` when the gateway cannot be reached
pub async fn pay(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(enrollment_id): Path<Uuid>,
) -> ApiResult<Json<InitiatedPayment>> {
    require_student(&auth)?;

    let student = load_user(&state, auth.user_id).await?;
    let initiated = state
        .payments()
        .initiate_payment(&student, enrollment_id)
        .await?;

    Ok(Json(initiated))
}

/// Progress of the caller on a course
///
/// Staff get a `403`: progress belongs to a paid student.
pub async fn get_progress(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<ProgressResponse>> {
    require_student(&auth)?;

    let course = load_course(&state, course_id).await?;
    let student_id = require_paid_enrollment(&state.db, auth.user_id, course.id)
        .await?
        .student_id;

    let report = ProgressSnapshot::load(&state.db, student_id, course.id)
        .await?
        .report();

    Ok(Json(ProgressResponse {
        course_id: course.id,
        student_id,
        report,
    }))
}
