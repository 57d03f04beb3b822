/// Role and resource checks
///
/// # Permission Model
///
/// 1. **Role**: the caller's [`Role`] gates whole areas (authoring, management)
/// 2. **Course ownership**: instructors only author their own courses;
///    managers may act on any course
/// 3. **Paid enrollment**: students read lessons and take quizzes only once
///    their enrollment is `paid`
///
/// # Example
///
/// ```no_run
/// use elearn_shared::auth::authorization::{require_course_author, require_role};
/// use elearn_shared::auth::context::AuthContext;
/// use elearn_shared::models::course::Course;
/// use elearn_shared::models::user::Role;
///
/// fn check(auth: &AuthContext, course: &Course) -> Result<(), Box<dyn std::error::Error>> {
///     require_role(auth, &[Role::Instructor, Role::Manager])?;
///     require_course_author(auth, course)?;
///     Ok(())
/// }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use super::context::AuthContext;
use crate::models::course::Course;
use crate::models::enrollment::{Enrollment, EnrollmentStatus};
use crate::models::user::Role;

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("Insufficient permissions: role {actual} is not allowed")]
    InsufficientRole { actual: Role },

    #[error("Only the course instructor or a manager may do this")]
    NotCourseAuthor,

    #[error("Not enrolled in course {0}")]
    NotEnrolled(Uuid),

    #[error("Enrollment is {0}, payment required")]
    NotPaid(EnrollmentStatus),

    #[error("Not authorized to access this resource")]
    NotAuthorized,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Who may read a course's lessons and quizzes
#[derive(Debug, Clone)]
pub enum CourseAccess {
    /// Instructor of the course or a manager
    Staff,

    /// Student with a paid enrollment
    Learner(Enrollment),
}

pub fn require_role(auth: &AuthContext, allowed: &[Role]) -> Result<(), AuthzError> {
    if allowed.contains(&auth.role) {
        Ok(())
    } else {
        Err(AuthzError::InsufficientRole { actual: auth.role })
    }
}

pub fn require_manager(auth: &AuthContext) -> Result<(), AuthzError> {
    require_role(auth, &[Role::Manager])
}

/// Course instructor or manager
pub fn require_course_author(auth: &AuthContext, course: &Course) -> Result<(), AuthzError> {
    match auth.role {
        Role::Manager => Ok(()),
        Role::Instructor if course.is_taught_by(auth.user_id) => Ok(()),
        Role::Instructor | Role::Student => Err(AuthzError::NotCourseAuthor),
    }
}

pub fn require_ownership(auth: &AuthContext, owner_id: Uuid) -> Result<(), AuthzError> {
    if auth.user_id != owner_id {
        return Err(AuthzError::NotAuthorized);
    }
    Ok(())
}

/// Students must hold a paid enrollment
pub async fn require_paid_enrollment(
    pool: &PgPool,
    student_id: Uuid,
    course_id: Uuid,
) -> Result<Enrollment, AuthzError> {
    let enrollment = Enrollment::find_by_student_and_course(pool, student_id, course_id)
        .await?
        .ok_or(AuthzError::NotEnrolled(course_id))?;

    if !enrollment.is_paid() {
        return Err(AuthzError::NotPaid(enrollment.status));
    }

    Ok(enrollment)
}

/// Resolves how the caller may read course content
pub async fn course_access(
    pool: &PgPool,
    auth: &AuthContext,
    course: &Course,
) -> Result<CourseAccess, AuthzError> {
    match auth.role {
        Role::Manager => Ok(CourseAccess::Staff),
        Role::Instructor if course.is_taught_by(auth.user_id) => Ok(CourseAccess::Staff),
        Role::Instructor | Role::Student => {
            require_paid_enrollment(pool, auth.user_id, course.id)
                .await
                .map(CourseAccess::Learner)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::course::{CourseStatus, Difficulty};

    fn course(instructor_id: Option<Uuid>) -> Course {
        Course {
            id: Uuid::new_v4(),
            instructor_id,
            title: "Algorithmique".to_string(),
            description: String::new(),
            content: String::new(),
            price: 100,
            difficulty: Difficulty::Beginner,
            duration_weeks: 4,
            status: CourseStatus::Published,
            completion_threshold: None,
            min_passing_score: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_require_role() {
        let student = AuthContext::new(Uuid::new_v4(), Role::Student);
        assert!(require_role(&student, &[Role::Student]).is_ok());
        assert!(matches!(
            require_manager(&student),
            Err(AuthzError::InsufficientRole { actual: Role::Student })
        ));

        let manager = AuthContext::new(Uuid::new_v4(), Role::Manager);
        assert!(require_manager(&manager).is_ok());
    }

    #[test]
    fn test_course_author() {
        let instructor_id = Uuid::new_v4();
        let owned = course(Some(instructor_id));

        let owner = AuthContext::new(instructor_id, Role::Instructor);
        assert!(require_course_author(&owner, &owned).is_ok());

        let other = AuthContext::new(Uuid::new_v4(), Role::Instructor);
        assert!(matches!(
            require_course_author(&other, &owned),
            Err(AuthzError::NotCourseAuthor)
        ));

        let manager = AuthContext::new(Uuid::new_v4(), Role::Manager);
        assert!(require_course_author(&manager, &course(None)).is_ok());

        let student = AuthContext::new(instructor_id, Role::Student);
        assert!(require_course_author(&student, &owned).is_err());
    }

    #[test]
    fn test_require_ownership() {
        let user_id = Uuid::new_v4();
        let auth = AuthContext::new(user_id, Role::Student);

        assert!(require_ownership(&auth, user_id).is_ok());
        assert!(require_ownership(&auth, Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_error_display() {
        let err = AuthzError::NotPaid(EnrollmentStatus::Pending);
        assert!(err.to_string().contains("pending"));
    }
}
