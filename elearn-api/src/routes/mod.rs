/// API route handlers, one module per resource
///
/// - `health`: liveness and database status
/// - `auth`: registration, login, token refresh
/// - `dashboard`: role-specific landing data
/// - `courses`: catalogue and course authoring
/// - `lessons`: rendered lessons and completion
/// - `quizzes`: quiz authoring and graded attempts
/// - `assignments`: assignments, submissions and grading
/// - `enrollments`: enrollment, payment initiation and progress
/// - `payments`: FedaPay webhook and callback
/// - `certificates`: eligibility, issuance, download and public verification
/// - `feedback`: course ratings
/// - `attendance`: session attendance register
/// - `manager`: payments overview, analytics, roles and instructor assignment

pub mod assignments;
pub mod attendance;
pub mod auth;
pub mod certificates;
pub mod courses;
pub mod dashboard;
pub mod enrollments;
pub mod feedback;
pub mod health;
pub mod lessons;
pub mod manager;
pub mod payments;
pub mod quizzes;

use elearn_shared::auth::authorization::{course_access, require_course_author, CourseAccess};
use elearn_shared::auth::context::AuthContext;
use elearn_shared::models::course::Course;
use elearn_shared::models::user::{Role, User};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

/// `?limit=&offset=` query parameters
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl Pagination {
    pub const MAX_LIMIT: i64 = 200;

    /// Clamps to `1..=MAX_LIMIT` and a non-negative offset
    pub fn clamped(self) -> (i64, i64) {
        (self.limit.clamp(1, Self::MAX_LIMIT), self.offset.max(0))
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

pub(crate) async fn load_course(state: &AppState, course_id: Uuid) -> ApiResult<Course> {
    Course::find_by_id(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Course {} not found", course_id)))
}

pub(crate) async fn load_user(state: &AppState, user_id: Uuid) -> ApiResult<User> {
    User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", user_id)))
}

/// Loads a course the caller may edit
pub(crate) async fn authored_course(
    state: &AppState,
    auth: &AuthContext,
    course_id: Uuid,
) -> ApiResult<Course> {
    let course = load_course(state, course_id).await?;
    require_course_author(auth, &course)?;
    Ok(course)
}

/// Loads a course whose content the caller may read
///
/// Students need a paid enrollment, which survives archiving.
pub(crate) async fn readable_course(
    state: &AppState,
    auth: &AuthContext,
    course_id: Uuid,
) -> ApiResult<(Course, CourseAccess)> {
    let course = load_course(state, course_id).await?;
    let access = course_access(&state.db, auth, &course).await?;
    Ok((course, access))
}

/// Requires the caller to be a student
pub(crate) fn require_student(auth: &AuthContext) -> ApiResult<()> {
    match auth.role {
        Role::Student => Ok(()),
        Role::Instructor | Role::Manager => Err(ApiError::Forbidden(
            "Only students can do this".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_clamps() {
        let page = Pagination {
            limit: 10_000,
            offset: -5,
        };
        assert_eq!(page.clamped(), (Pagination::MAX_LIMIT, 0));

        let page: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(page.clamped(), (50, 0));
    }

    #[test]
    fn test_require_student() {
        let student = AuthContext::new(Uuid::new_v4(), Role::Student);
        let manager = AuthContext::new(Uuid::new_v4(), Role::Manager);

        assert!(require_student(&student).is_ok());
        assert!(matches!(require_student(&manager), Err(ApiError::Forbidden(_))));
    }
}
