/// Attendance register
///
/// Instructors (and managers) mark paid enrollments present, absent or late
/// for a session date. Students read their own record.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use elearn_shared::{
    auth::context::AuthContext,
    models::{
        attendance::{attendance_rate, Attendance, AttendanceStatus, MarkAttendance, RegisterLine},
        enrollment::Enrollment,
        user::Role,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::authored_course;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

#[derive(Debug, Deserialize, Validate)]
pub struct MarkAttendanceRequest {
    pub session_date: NaiveDate,
    pub status: AttendanceStatus,

    #[validate(length(max = 1000, message = "Notes are limited to 1000 characters"))]
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct AttendanceRecord {
    pub enrollment_id: Uuid,

    /// Percent of marked sessions attended, `None` before the first mark
    pub attendance_rate: Option<u8>,

    pub sessions: Vec<Attendance>,
}

async fn load_enrollment(state: &AppState, enrollment_id: Uuid) -> ApiResult<Enrollment> {
    Enrollment::find_by_id(&state.db, enrollment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Enrollment {} not found", enrollment_id)))
}

/// Marks one student for one session
///
/// # Errors
///
/// - `403` unless the caller teaches the course or is a manager
/// - `409 payment_required` for an enrollment that is not paid
pub async fn mark_attendance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(enrollment_id): Path<Uuid>,
    Json(req): Json<MarkAttendanceRequest>,
) -> ApiResult<Json<Attendance>> {
    req.validate()?;

    let enrollment = load_enrollment(&state, enrollment_id).await?;
    authored_course(&state, &auth, enrollment.course_id).await?;

    if !enrollment.is_paid() {
        return Err(ApiError::Conflict {
            code: "payment_required",
            message: format!("Enrollment is {}, attendance needs a paid enrollment", enrollment.status),
        });
    }

    let record = Attendance::mark(
        &state.db,
        MarkAttendance {
            enrollment_id,
            session_date: req.session_date,
            status: req.status,
            notes: req.notes.trim().to_string(),
            marked_by: auth.user_id,
        },
    )
    .await?;

    tracing::info!(
        %enrollment_id,
        session_date = %record.session_date,
        status = %record.status,
        marked_by = %auth.user_id,
        "Attendance marked"
    );

    Ok(Json(record))
}

/// Attendance of one enrollment: its student, the instructor or a manager
pub async fn enrollment_attendance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(enrollment_id): Path<Uuid>,
) -> ApiResult<Json<AttendanceRecord>> {
    let enrollment = load_enrollment(&state, enrollment_id).await?;

    match auth.role {
        // Someone else's enrollment does not exist as far as a student can tell
        Role::Student if enrollment.student_id != auth.user_id => {
            return Err(ApiError::NotFound(format!(
                "Enrollment {} not found",
                enrollment_id
            )));
        }
        Role::Student => {}
        Role::Instructor | Role::Manager => {
            authored_course(&state, &auth, enrollment.course_id).await?;
        }
    }

    let sessions = Attendance::list_for_enrollment(&state.db, enrollment.id).await?;

    Ok(Json(AttendanceRecord {
        enrollment_id,
        attendance_rate: attendance_rate(&sessions),
        sessions,
    }))
}

/// Register of a course, `?date=YYYY-MM-DD` for a single session
pub async fn course_register(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Query(query): Query<RegisterQuery>,
) -> ApiResult<Json<Vec<RegisterLine>>> {
    let course = authored_course(&state, &auth, course_id).await?;

    Ok(Json(
        Attendance::register(&state.db, course.id, query.date).await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_request_parses_date_and_status() {
        let req: MarkAttendanceRequest =
            serde_json::from_str(r#"{"session_date": "2026-03-02", "status": "late"}"#).unwrap();

        assert_eq!(req.session_date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(req.status, AttendanceStatus::Late);
        assert!(req.notes.is_empty());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_mark_request_rejects_unknown_status() {
        let parsed = serde_json::from_str::<MarkAttendanceRequest>(
            r#"{"session_date": "2026-03-02", "status": "excused"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_long_notes_rejected() {
        let req = MarkAttendanceRequest {
            session_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            status: AttendanceStatus::Absent,
            notes: "x".repeat(1001),
        };
        assert!(req.validate().is_err());
    }
}
