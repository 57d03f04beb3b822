/// Course feedback
///
/// - `POST /v1/courses/:id/feedback`: rate a course (student with a paid
///   enrollment); a second rating replaces the first
/// - `GET  /v1/courses/:id/feedback`: ratings of one course (author, manager)
/// - `GET  /v1/manager/feedback`: platform-wide ratings and average

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use elearn_shared::{
    auth::{
        authorization::{require_manager, require_paid_enrollment},
        context::AuthContext,
    },
    models::feedback::{Feedback, FeedbackEntry},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{authored_course, load_course, require_student, Pagination};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

#[derive(Debug, Deserialize, Validate)]
pub struct FeedbackRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,

    #[validate(length(min = 1, max = 2000, message = "Comment must be 1 to 2000 characters"))]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackQuery {
    pub course_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl FeedbackQuery {
    fn page(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedbackSummary {
    /// Mean rating to one decimal, `None` without any rating
    pub average_rating: Option<f64>,
    pub ratings: i64,
    pub entries: Vec<FeedbackEntry>,
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

async fn summary(
    state: &AppState,
    course_id: Option<Uuid>,
    page: Pagination,
) -> ApiResult<FeedbackSummary> {
    let (limit, offset) = page.clamped();

    let (average, ratings) = Feedback::average_rating(&state.db, course_id).await?;
    let entries = Feedback::list_entries(&state.db, course_id, limit, offset).await?;

    Ok(FeedbackSummary {
        average_rating: average.map(one_decimal),
        ratings,
        entries,
    })
}

pub async fn give_feedback(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<FeedbackRequest>,
) -> ApiResult<Json<Feedback>> {
    require_student(&auth)?;
    req.validate()?;

    let comment = req.comment.trim();
    if comment.is_empty() {
        return Err(ApiError::invalid("comment", "Comment cannot be blank"));
    }

    let course = load_course(&state, course_id).await?;
    require_paid_enrollment(&state.db, auth.user_id, course.id).await?;

    let feedback = Feedback::upsert(&state.db, auth.user_id, course.id, req.rating, comment).await?;

    tracing::info!(
        student_id = %auth.user_id,
        %course_id,
        rating = feedback.rating,
        "Course feedback recorded"
    );

    Ok(Json(feedback))
}

pub async fn course_feedback(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<FeedbackSummary>> {
    let course = authored_course(&state, &auth, course_id).await?;
    Ok(Json(summary(&state, Some(course.id), page).await?))
}

pub async fn list_feedback(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<FeedbackQuery>,
) -> ApiResult<Json<FeedbackSummary>> {
    require_manager(&auth)?;
    Ok(Json(summary(&state, query.course_id, query.page()).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        let ok: FeedbackRequest =
            serde_json::from_str(r#"{"rating": 5, "comment": "Très clair"}"#).unwrap();
        assert!(ok.validate().is_ok());

        for rating in [0, 6] {
            let req = FeedbackRequest {
                rating,
                comment: "ok".to_string(),
            };
            assert!(req.validate().is_err(), "rating {} accepted", rating);
        }
    }

    #[test]
    fn test_query_defaults() {
        let query: FeedbackQuery = serde_json::from_str("{}").unwrap();
        assert!(query.course_id.is_none());
        assert_eq!(query.page().clamped(), (50, 0));
    }

    #[test]
    fn test_average_rounding() {
        assert_eq!(one_decimal(4.0), 4.0);
        assert_eq!(one_decimal(3.666_666), 3.7);
    }
}
