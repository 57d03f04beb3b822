/// Domain error taxonomy shared by every service
///
/// The API crate maps each variant to an HTTP status; services never build
/// HTTP responses themselves.

use crate::auth::authorization::AuthzError;
use crate::content::RenderError;
use crate::gateway::signature::SignatureError;
use crate::gateway::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed input or a rule violated by the caller
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Webhook signature could not be verified
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The payment or enrollment is not in a state that allows the operation
    #[error("Payment state conflict: {0}")]
    PaymentState(String),

    /// Gateway timeout, transport failure or 5xx; safe to retry
    #[error("External service unavailable: {0}")]
    ExternalService(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Server-side failure unrelated to the request
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether the caller can retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::ExternalService(_))
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(id) => {
                ServiceError::NotFound(format!("gateway transaction {}", id))
            }
            other => ServiceError::ExternalService(other.to_string()),
        }
    }
}

impl From<SignatureError> for ServiceError {
    fn from(err: SignatureError) -> Self {
        ServiceError::Authentication(err.to_string())
    }
}

impl From<AuthzError> for ServiceError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::DatabaseError(e) => ServiceError::Database(e),
            AuthzError::NotEnrolled(course_id) => {
                ServiceError::NotFound(format!("enrollment in course {}", course_id))
            }
            other => ServiceError::Forbidden(other.to_string()),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_errors_are_retryable() {
        let err: ServiceError = GatewayError::Timeout.into();
        assert!(err.is_retryable());

        let err: ServiceError = GatewayError::Upstream {
            status: 503,
            message: "down".into(),
        }
        .into();
        assert!(matches!(err, ServiceError::ExternalService(_)));
    }

    #[test]
    fn test_gateway_not_found_maps_to_not_found() {
        let err: ServiceError = GatewayError::NotFound("123".into()).into();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal_is_not_retryable() {
        assert!(!ServiceError::Internal("codes exhausted".into()).is_retryable());
    }

    #[test]
    fn test_signature_error_maps_to_authentication() {
        let err: ServiceError = SignatureError::Mismatch.into();
        assert!(matches!(err, ServiceError::Authentication(_)));
    }
}
