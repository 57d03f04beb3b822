/// Course catalogue and authoring
///
/// # Endpoints
///
/// - `GET    /v1/courses`: published catalogue, or `?mine=true` for an
///   instructor's own courses in any status
/// - `POST   /v1/courses`: create a draft (instructor, manager)
/// - `GET    /v1/courses/:id`: course page with rendered overview and outline
/// - `PUT    /v1/courses/:id`: partial update (author, manager)
/// - `DELETE /v1/courses/:id`: delete a course nobody enrolled in
/// - `POST   /v1/courses/:id/publish`, `/archive`: lifecycle transitions
/// - `GET    /v1/courses/:id/students`: enrolled students (author, manager)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use elearn_shared::{
    auth::{authorization::require_role, context::AuthContext},
    content::markdown::{excerpt, render_markdown},
    models::{
        course::{Course, CourseStatus, CreateCourse, Difficulty, UpdateCourse},
        enrollment::{CourseStudent, Enrollment},
        lesson::Lesson,
        user::Role,
    },
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{authored_course, load_course, load_user, Pagination};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct CourseListQuery {
    #[serde(default)]
    pub mine: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Catalogue entry
#[derive(Debug, Serialize)]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub excerpt: String,
    pub price: i64,
    pub currency: String,
    pub difficulty: Difficulty,
    pub duration_weeks: i32,
    pub status: CourseStatus,
    pub instructor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl CourseSummary {
    fn new(course: Course, currency: &str) -> Self {
        let source = if course.description.trim().is_empty() {
            &course.content
        } else {
            &course.description
        };

        Self {
            excerpt: excerpt(source, EXCERPT_CHARS),
            id: course.id,
            title: course.title,
            price: course.price,
            currency: currency.to_string(),
            difficulty: course.difficulty,
            duration_weeks: course.duration_weeks,
            status: course.status,
            instructor_id: course.instructor_id,
            created_at: course.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LessonOutline {
    pub id: Uuid,
    pub title: String,
    pub position: i32,
}

#[derive(Debug, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,

    pub content_html: String,
    pub instructor_name: Option<String>,
    pub lessons: Vec<LessonOutline>,

    /// The caller's own enrollment, for students
    pub enrollment: Option<Enrollment>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Markdown overview
    #[serde(default)]
    pub content: String,

    /// Whole XOF; 0 makes the course free
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price: i64,

    #[serde(default)]
    pub difficulty: Difficulty,

    #[validate(range(min = 1, max = 520, message = "Duration must be 1 to 520 weeks"))]
    #[serde(default = "default_weeks")]
    pub duration_weeks: i32,

    #[validate(range(min = 1, max = 100, message = "Threshold must be between 1 and 100"))]
    pub completion_threshold: Option<i16>,

    #[validate(range(min = 0, max = 100, message = "Minimum score must be between 0 and 100"))]
    pub min_passing_score: Option<i16>,

    /// Managers may create a course on behalf of an instructor
    pub instructor_id: Option<Uuid>,
}

fn default_weeks() -> i32 {
    1
}

/// Partial update; send `null` to clear an optional override
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,

    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price: Option<i64>,

    pub difficulty: Option<Difficulty>,

    #[validate(range(min = 1, max = 520, message = "Duration must be 1 to 520 weeks"))]
    pub duration_weeks: Option<i32>,

    #[serde(default, deserialize_with = "present")]
    pub completion_threshold: Option<Option<i16>>,

    #[serde(default, deserialize_with = "present")]
    pub min_passing_score: Option<Option<i16>>,
}

/// Distinguishes an explicit `null` from an absent field
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateCourseRequest {
    fn into_update(self) -> ApiResult<UpdateCourse> {
        if let Some(Some(threshold)) = self.completion_threshold {
            if !(1..=100).contains(&threshold) {
                return Err(ApiError::invalid(
                    "completion_threshold",
                    "Threshold must be between 1 and 100",
                ));
            }
        }
        if let Some(Some(score)) = self.min_passing_score {
            if !(0..=100).contains(&score) {
                return Err(ApiError::invalid(
                    "min_passing_score",
                    "Minimum score must be between 0 and 100",
                ));
            }
        }

        Ok(UpdateCourse {
            title: self.title,
            description: self.description,
            content: self.content,
            price: self.price,
            difficulty: self.difficulty,
            duration_weeks: self.duration_weeks,
            completion_threshold: self.completion_threshold,
            min_passing_score: self.min_passing_score,
        })
    }
}

pub async fn list_courses(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<CourseListQuery>,
) -> ApiResult<Json<Vec<CourseSummary>>> {
    let currency = state.config.payments.currency.as_str();

    let courses = if query.mine {
        require_role(&auth, &[Role::Instructor, Role::Manager])?;
        Course::list_by_instructor(&state.db, auth.user_id).await?
    } else {
        let (limit, offset) = Pagination {
            limit: query.limit.unwrap_or(50),
            offset: query.offset.unwrap_or(0),
        }
        .clamped();
        Course::list_published(&state.db, limit, offset).await?
    };

    Ok(Json(
        courses
            .into_iter()
            .map(|c| CourseSummary::new(c, currency))
            .collect(),
    ))
}

/// Course page
///
/// Drafts are only visible to their author and managers.
pub async fn get_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<CourseDetail>> {
    let course = load_course(&state, course_id).await?;

    let is_staff = auth.is_manager() || course.is_taught_by(auth.user_id);
    if course.status == CourseStatus::Draft && !is_staff {
        return Err(ApiError::NotFound(format!("Course {} not found", course_id)));
    }

    let lessons = Lesson::list_by_course(&state.db, course.id)
        .await?
        .into_iter()
        .map(|l| LessonOutline {
            id: l.id,
            title: l.title,
            position: l.position,
        })
        .collect();

    let instructor_name = match course.instructor_id {
        Some(id) => load_user(&state, id).await.ok().map(|u| u.full_name()),
        None => None,
    };

    let enrollment = match auth.role {
        Role::Student => {
            Enrollment::find_by_student_and_course(&state.db, auth.user_id, course.id).await?
        }
        Role::Instructor | Role::Manager => None,
    };

    Ok(Json(CourseDetail {
        content_html: render_markdown(&course.content),
        course,
        instructor_name,
        lessons,
        enrollment,
    }))
}

pub async fn create_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateCourseRequest>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    require_role(&auth, &[Role::Instructor, Role::Manager])?;
    req.validate()?;

    let instructor_id = match (auth.role, req.instructor_id) {
        (Role::Manager, Some(id)) => {
            let instructor = load_user(&state, id).await?;
            if !instructor.role.can_author() {
                return Err(ApiError::invalid("instructor_id", "User cannot author courses"));
            }
            id
        }
        _ => auth.user_id,
    };

    let course = Course::create(
        &state.db,
        CreateCourse {
            instructor_id,
            title: req.title.trim().to_string(),
            description: req.description,
            content: req.content,
            price: req.price,
            difficulty: req.difficulty,
            duration_weeks: req.duration_weeks,
            completion_threshold: req.completion_threshold,
            min_passing_score: req.min_passing_score,
        },
    )
    .await?;

    tracing::info!(course_id = %course.id, %instructor_id, price = course.price, "Course created");

    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn update_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<UpdateCourseRequest>,
) -> ApiResult<Json<Course>> {
    authored_course(&state, &auth, course_id).await?;
    req.validate()?;

    let update = req.into_update()?;
    if update.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let course = Course::update(&state.db, course_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Course {} not found", course_id)))?;

    Ok(Json(course))
}

/// Deletes a course without enrollments
///
/// Courses with enrollments keep their payment history and must be archived.
pub async fn delete_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    authored_course(&state, &auth, course_id).await?;

    if !Course::delete_if_unenrolled(&state.db, course_id).await? {
        return Err(ApiError::conflict(
            "Course has enrollments; archive it instead",
        ));
    }

    tracing::info!(%course_id, "Course deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn publish_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Course>> {
    let course = authored_course(&state, &auth, course_id).await?;

    if !course.status.can_transition_to(CourseStatus::Published) {
        return Err(ApiError::conflict(format!(
            "Cannot publish a {} course",
            course.status.as_str()
        )));
    }

    let course = Course::publish(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::conflict("Course is no longer a draft"))?;

    tracing::info!(%course_id, "Course published");
    Ok(Json(course))
}

pub async fn archive_course(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Course>> {
    let course = authored_course(&state, &auth, course_id).await?;

    if !course.status.can_transition_to(CourseStatus::Archived) {
        return Err(ApiError::conflict("Course is already archived"));
    }

    let course = Course::archive(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::conflict("Course is already archived"))?;

    tracing::info!(%course_id, "Course archived");
    Ok(Json(course))
}

pub async fn list_students(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<Vec<CourseStudent>>> {
    authored_course(&state, &auth, course_id).await?;

    Ok(Json(Enrollment::list_students(&state.db, course_id).await?))
}
