/// Role-specific landing data
///
/// One endpoint, one variant per role. The variant is tagged with `role` so
/// clients can switch on it.

use axum::{extract::State, Extension, Json};
use elearn_shared::{
    auth::context::AuthContext,
    models::{
        certificate::{Certificate, CertificateWithCourse},
        course::{Course, CourseStats},
        enrollment::{Enrollment, EnrollmentStatus, EnrollmentWithCourse},
        payment::Payment,
        user::{Role, RoleCounts, User},
    },
    services::compute_progress,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{app::AppState, error::ApiResult};

#[derive(Debug, Serialize)]
pub struct EnrolledCourse {
    #[serde(flatten)]
    pub enrollment: EnrollmentWithCourse,

    /// Only computed for paid enrollments
    pub progress: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct PlatformTotals {
    pub users: RoleCounts,
    pub courses: i64,
    pub paid_enrollments: i64,
    pub pending_enrollments: i64,
    pub revenue: i64,
    pub certificates: i64,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Dashboard {
    Student {
        enrollments: Vec<EnrolledCourse>,
        certificates: Vec<CertificateWithCourse>,
    },
    Instructor {
        courses: Vec<CourseStats>,
    },
    Manager {
        totals: PlatformTotals,
    },
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Dashboard>> {
    let dashboard = match auth.role {
        Role::Student => student_dashboard(&state, auth.user_id).await?,
        Role::Instructor => Dashboard::Instructor {
            courses: Course::stats(&state.db, Some(auth.user_id)).await?,
        },
        Role::Manager => Dashboard::Manager {
            totals: platform_totals(&state).await?,
        },
    };

    Ok(Json(dashboard))
}

async fn student_dashboard(state: &AppState, student_id: Uuid) -> ApiResult<Dashboard> {
    let enrollments = Enrollment::list_by_student(&state.db, student_id).await?;

    let mut courses = Vec::with_capacity(enrollments.len());
    for enrollment in enrollments {
        let progress = if enrollment.status == EnrollmentStatus::Paid {
            Some(compute_progress(&state.db, student_id, enrollment.course_id).await?)
        } else {
            None
        };
        courses.push(EnrolledCourse {
            enrollment,
            progress,
        });
    }

    Ok(Dashboard::Student {
        enrollments: courses,
        certificates: Certificate::list_by_student(&state.db, student_id).await?,
    })
}

async fn platform_totals(state: &AppState) -> ApiResult<PlatformTotals> {
    let (users, courses, paid_enrollments, pending_enrollments, revenue, certificates) = tokio::try_join!(
        User::count_by_role(&state.db),
        Course::count(&state.db),
        Enrollment::count_by_status(&state.db, EnrollmentStatus::Paid),
        Enrollment::count_by_status(&state.db, EnrollmentStatus::Pending),
        Payment::total_revenue(&state.db),
        Certificate::count(&state.db),
    )?;

    Ok(PlatformTotals {
        users,
        courses,
        paid_enrollments,
        pending_enrollments,
        revenue,
        certificates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashboard_is_tagged_by_role() {
        let json = serde_json::to_value(Dashboard::Instructor { courses: vec![] }).unwrap();
        assert_eq!(json["role"], "instructor");
        assert!(json["courses"].as_array().unwrap().is_empty());

        let json = serde_json::to_value(Dashboard::Manager {
            totals: PlatformTotals {
                users: RoleCounts::default(),
                courses: 3,
                paid_enrollments: 2,
                pending_enrollments: 1,
                revenue: 15_000,
                certificates: 1,
            },
        })
        .unwrap();
        assert_eq!(json["role"], "manager");
        assert_eq!(json["totals"]["revenue"], 15_000);
    }
}
