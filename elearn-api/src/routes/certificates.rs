/// Certificate eligibility, issuance, download and public verification

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use elearn_shared::{
    auth::{authorization::require_course_author, context::AuthContext},
    models::certificate::{Certificate, CertificateVerification, CertificateWithCourse},
    models::user::Role,
    services::{Eligibility, IssueOutcome},
};
use serde::Serialize;
use uuid::Uuid;

use super::{load_course, require_student};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub course_id: Uuid,
    pub eligible: bool,
    pub reason: String,

    #[serde(flatten)]
    pub verdict: Eligibility,
}

impl EligibilityResponse {
    fn new(course_id: Uuid, verdict: Eligibility) -> Self {
        Self {
            course_id,
            eligible: verdict.is_eligible(),
            reason: verdict.reason(),
            verdict,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IssuedCertificate {
    pub certificate: Certificate,

    /// `false` when the certificate already existed
    pub newly_issued: bool,
}

pub async fn list_certificates(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<CertificateWithCourse>>> {
    let certificates = Certificate::list_by_student(&state.db, auth.user_id).await?;
    Ok(Json(certificates))
}

pub async fn eligibility(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Json<EligibilityResponse>> {
    require_student(&auth)?;

    let verdict = state
        .certificates()
        .check_certificate_eligibility(auth.user_id, course_id)
        .await?;

    Ok(Json(EligibilityResponse::new(course_id, verdict)))
}

/// Issues the caller's certificate for a course
///
/// Returns `201` for a new certificate, `200` when it already existed and
/// `422` with the verdict when the student is not eligible yet.
pub async fn issue_certificate(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Response> {
    require_student(&auth)?;

    let outcome = state
        .certificates()
        .issue_if_eligible(auth.user_id, course_id)
        .await?;

    let response = match outcome {
        IssueOutcome::Issued(certificate) => (
            StatusCode::CREATED,
            Json(IssuedCertificate {
                certificate,
                newly_issued: true,
            }),
        )
            .into_response(),
        IssueOutcome::AlreadyIssued(certificate) => Json(IssuedCertificate {
            certificate,
            newly_issued: false,
        })
        .into_response(),
        IssueOutcome::NotEligible(verdict) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(EligibilityResponse::new(course_id, verdict)),
        )
            .into_response(),
    };

    Ok(response)
}

/// Streams the stored PDF
///
/// Open to the holder, the course instructor and managers.
pub async fn download_certificate(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(certificate_id): Path<Uuid>,
) -> ApiResult<Response> {
    let certificate = Certificate::find_by_id(&state.db, certificate_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Certificate {} not found", certificate_id)))?;

    match auth.role {
        Role::Student if certificate.student_id == auth.user_id => {}
        Role::Student => {
            return Err(ApiError::Forbidden(
                "Not authorized to access this certificate".to_string(),
            ))
        }
        Role::Instructor | Role::Manager => {
            let course = load_course(&state, certificate.course_id).await?;
            require_course_author(&auth, &course)?;
        }
    }

    let document = Certificate::document(&state.db, certificate.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Certificate {} not found", certificate_id)))?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"certificate-{}.pdf\"",
        certificate.verification_code
    ))
    .map_err(|e| ApiError::InternalError(format!("Invalid file name: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=0")),
        ],
        document,
    )
        .into_response())
}

/// Public lookup of a verification code
pub async fn verify_certificate(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<CertificateVerification>> {
    let code = code.trim().to_uppercase();
    if code.is_empty() || code.len() > 64 {
        return Err(ApiError::invalid("code", "Malformed verification code"));
    }

    let verification = Certificate::verify(&state.db, &code)
        .await?
        .ok_or_else(|| ApiError::NotFound("No certificate carries this code".to_string()))?;

    tracing::info!(verification_code = %verification.verification_code, "Certificate verified");
    Ok(Json(verification))
}
