/// Manager endpoints: payments, analytics, roles and course staffing
///
/// Every handler starts with `require_manager`.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use elearn_shared::{
    auth::{authorization::require_manager, context::AuthContext},
    models::{
        course::{Course, CourseStats},
        enrollment::{Enrollment, EnrollmentStatus},
        payment::{Payment, PaymentOverview, PaymentStatus},
        user::{Role, User},
    },
    services::{compute_progress, ReconcileOutcome},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{load_course, load_user, Pagination};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

#[derive(Debug, Deserialize)]
pub struct PaymentQuery {
    pub status: Option<PaymentStatus>,

    #[serde(default)]
    pub limit: Option<i64>,

    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub role: Option<Role>,

    #[serde(default)]
    pub limit: Option<i64>,

    #[serde(default)]
    pub offset: Option<i64>,
}

fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let defaults = Pagination::default();
    Pagination {
        limit: limit.unwrap_or(defaults.limit),
        offset: offset.unwrap_or(defaults.offset),
    }
    .clamped()
}

#[derive(Debug, Serialize)]
pub struct CourseAnalytics {
    #[serde(flatten)]
    pub stats: CourseStats,

    /// Mean progress of paid students, `None` without any
    pub average_progress: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct AssignInstructorRequest {
    pub instructor_id: Uuid,
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PaymentQuery>,
) -> ApiResult<Json<Vec<PaymentOverview>>> {
    require_manager(&auth)?;

    let (limit, offset) = page(query.limit, query.offset);
    let payments = Payment::list_overview(&state.db, query.status, limit, offset).await?;
    Ok(Json(payments))
}

/// Asks the gateway for the current state of a pending payment
pub async fn recheck_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(payment_id): Path<Uuid>,
) -> ApiResult<Json<ReconcileOutcome>> {
    require_manager(&auth)?;

    let outcome = state.payments().recheck_payment(payment_id).await?;

    tracing::info!(%payment_id, manager_id = %auth.user_id, ?outcome, "Payment re-checked");
    Ok(Json(outcome))
}

/// Per-course enrollment, revenue and average progress
pub async fn analytics(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<CourseAnalytics>>> {
    require_manager(&auth)?;

    let stats = Course::stats(&state.db, None).await?;

    let mut analytics = Vec::with_capacity(stats.len());
    for course in stats {
        let average_progress = average_progress(&state, course.course_id).await?;
        analytics.push(CourseAnalytics {
            stats: course,
            average_progress,
        });
    }

    Ok(Json(analytics))
}

async fn average_progress(state: &AppState, course_id: Uuid) -> ApiResult<Option<f64>> {
    let students = Enrollment::list_students(&state.db, course_id).await?;

    let mut total = 0u32;
    let mut paid = 0u32;
    for student in students.iter().filter(|s| s.status == EnrollmentStatus::Paid) {
        total += u32::from(compute_progress(&state.db, student.student_id, course_id).await?);
        paid += 1;
    }

    Ok(mean(total, paid))
}

fn mean(total: u32, count: u32) -> Option<f64> {
    if count == 0 {
        return None;
    }
    let mean = f64::from(total) / f64::from(count);
    Some((mean * 10.0).round() / 10.0)
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<User>>> {
    require_manager(&auth)?;

    let (limit, offset) = page(query.limit, query.offset);
    let users = User::list(&state.db, query.role, limit, offset).await?;
    Ok(Json(users))
}

/// Changes a user's role
///
/// Managers cannot change their own role, so the platform always keeps the
/// manager who made the change.
pub async fn change_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ChangeRoleRequest>,
) -> ApiResult<Json<User>> {
    require_manager(&auth)?;

    if user_id == auth.user_id {
        return Err(ApiError::BadRequest(
            "Managers cannot change their own role".to_string(),
        ));
    }

    let user = User::update_role(&state.db, user_id, req.role)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", user_id)))?;

    tracing::info!(
        %user_id,
        role = %user.role,
        manager_id = %auth.user_id,
        "User role changed"
    );

    Ok(Json(user))
}

/// Hands a course over to another instructor
///
/// The new instructor must hold the instructor role; managers already
/// author every course.
pub async fn assign_instructor(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<AssignInstructorRequest>,
) -> ApiResult<Json<Course>> {
    require_manager(&auth)?;

    let course = load_course(&state, course_id).await?;
    let instructor = load_user(&state, req.instructor_id).await?;
    if instructor.role != Role::Instructor {
        return Err(ApiError::invalid(
            "instructor_id",
            format!("User is a {}, not an instructor", instructor.role),
        ));
    }

    let previous = course.instructor_id;
    let course = Course::assign_instructor(&state.db, course.id, instructor.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Course {} not found", course_id)))?;

    tracing::info!(
        %course_id,
        ?previous,
        instructor_id = %instructor.id,
        manager_id = %auth.user_id,
        "Course instructor reassigned"
    );

    Ok(Json(course))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_rounds_to_one_decimal() {
        assert_eq!(mean(0, 0), None);
        assert_eq!(mean(100, 1), Some(100.0));
        assert_eq!(mean(100, 3), Some(33.3));
    }

    #[test]
    fn test_page_defaults_and_clamps() {
        assert_eq!(page(None, None), (50, 0));
        assert_eq!(page(Some(0), Some(-1)), (1, 0));
        assert_eq!(page(Some(5000), Some(20)), (Pagination::MAX_LIMIT, 20));
    }

    #[test]
    fn test_assign_instructor_request_needs_an_id() {
        let id = Uuid::new_v4();
        let req: AssignInstructorRequest =
            serde_json::from_value(serde_json::json!({ "instructor_id": id })).unwrap();
        assert_eq!(req.instructor_id, id);

        assert!(serde_json::from_str::<AssignInstructorRequest>("{}").is_err());
    }

    #[test]
    fn test_payment_query_parses_status() {
        let query: PaymentQuery = serde_json::from_str(r#"{"status":"pending"}"#).unwrap();
        assert_eq!(query.status, Some(PaymentStatus::Pending));
        assert_eq!(query.limit, None);
    }
}
