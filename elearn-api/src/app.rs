/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use elearn_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config)?;
/// let app = elearn_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post, put},
    Router,
};
use elearn_shared::auth::context::AuthContext;
use elearn_shared::auth::jwt;
use elearn_shared::gateway::fedapay::FedaPayClient;
use elearn_shared::gateway::{PaymentGateway, CALLBACK_PATH, WEBHOOK_PATH};
use elearn_shared::services::{CertificateService, PaymentService};
use sqlx::PgPool;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{config::Config, error::ApiError, middleware::security::SecurityHeadersLayer};

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,

    /// Payment gateway used by the payment service
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    /// Creates state talking to the configured FedaPay environment
    pub fn new(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let gateway = FedaPayClient::new(&config.payments)?;
        Ok(Self::with_gateway(db, config, Arc::new(gateway)))
    }

    /// Creates state with an explicit gateway (tests use the mock)
    pub fn with_gateway(db: PgPool, config: Config, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            db,
            config: Arc::new(config),
            gateway,
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    pub fn payments(&self) -> PaymentService {
        PaymentService::new(
            self.db.clone(),
            self.gateway.clone(),
            self.config.payments.clone(),
        )
    }

    pub fn certificates(&self) -> CertificateService {
        CertificateService::new(self.db.clone(), self.config.certificates.clone())
    }
}

/// Builds the complete router
///
/// ```text
/// /
/// ├── GET  /health
/// ├── POST /student/payment/webhook/      signed gateway events
/// ├── GET  /student/payment/callback/     browser redirect after checkout
/// ├── GET  /v1/certificates/verify/:code  public verification
/// └── /v1/                                JWT bearer auth unless noted
///     ├── /auth/{register,login,refresh}  public
///     ├── /dashboard
///     ├── /courses, /lessons, /quizzes, /assignments, /submissions
///     ├── /enrollments, /certificates
///     ├── /courses/:id/feedback, /courses/:id/attendance
///     └── /manager/...
/// ```
///
/// Layers, outermost first: security headers, CORS, request tracing.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let public_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(WEBHOOK_PATH, post(routes::payments::webhook))
        .route(CALLBACK_PATH, get(routes::payments::callback));

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    let protected_routes = Router::new()
        .route("/dashboard", get(routes::dashboard::dashboard))
        // Courses
        .route(
            "/courses",
            get(routes::courses::list_courses).post(routes::courses::create_course),
        )
        .route(
            "/courses/:course_id",
            get(routes::courses::get_course)
                .put(routes::courses::update_course)
                .delete(routes::courses::delete_course),
        )
        .route("/courses/:course_id/publish", post(routes::courses::publish_course))
        .route("/courses/:course_id/archive", post(routes::courses::archive_course))
        .route("/courses/:course_id/students", get(routes::courses::list_students))
        // Lessons
        .route(
            "/courses/:course_id/lessons",
            get(routes::lessons::list_lessons).post(routes::lessons::create_lesson),
        )
        .route(
            "/lessons/:lesson_id",
            get(routes::lessons::get_lesson).put(routes::lessons::update_lesson),
        )
        .route("/lessons/:lesson_id/complete", post(routes::lessons::complete_lesson))
        // Quizzes
        .route(
            "/courses/:course_id/quizzes",
            get(routes::quizzes::list_quizzes).post(routes::quizzes::create_quiz),
        )
        .route("/quizzes/:quiz_id", get(routes::quizzes::get_quiz))
        .route(
            "/quizzes/:quiz_id/attempts",
            get(routes::quizzes::list_attempts).post(routes::quizzes::submit_attempt),
        )
        // Assignments
        .route(
            "/courses/:course_id/assignments",
            get(routes::assignments::list_assignments).post(routes::assignments::create_assignment),
        )
        .route(
            "/assignments/:assignment_id/submissions",
            get(routes::assignments::list_submissions).put(routes::assignments::submit),
        )
        .route("/submissions/:submission_id/grade", post(routes::assignments::grade_submission))
        // Enrollment and payment
        .route(
            "/courses/:course_id/enroll",
            post(routes::enrollments::enroll),
        )
        .route("/enrollments", get(routes::enrollments::list_enrollments))
        .route("/enrollments/:enrollment_id/pay", post(routes::enrollments::pay))
        .route(
            "/courses/:course_id/progress",
            get(routes::enrollments::get_progress),
        )
        // Feedback and attendance
        .route(
            "/courses/:course_id/feedback",
            get(routes::feedback::course_feedback).post(routes::feedback::give_feedback),
        )
        .route(
            "/enrollments/:enrollment_id/attendance",
            get(routes::attendance::enrollment_attendance).put(routes::attendance::mark_attendance),
        )
        .route(
            "/courses/:course_id/attendance",
            get(routes::attendance::course_register),
        )
        // Certificates
        .route("/certificates", get(routes::certificates::list_certificates))
        .route(
            "/courses/:course_id/certificate/eligibility",
            get(routes::certificates::eligibility),
        )
        .route(
            "/courses/:course_id/certificate",
            post(routes::certificates::issue_certificate),
        )
        .route(
            "/certificates/:certificate_id/download",
            get(routes::certificates::download_certificate),
        )
        // Management
        .route("/manager/payments", get(routes::manager::list_payments))
        .route(
            "/manager/payments/:payment_id/recheck",
            post(routes::manager::recheck_payment),
        )
        .route("/manager/analytics", get(routes::manager::analytics))
        .route("/manager/users", get(routes::manager::list_users))
        .route("/manager/users/:user_id/role", put(routes::manager::change_role))
        .route("/manager/feedback", get(routes::feedback::list_feedback))
        .route(
            "/manager/courses/:course_id/instructor",
            put(routes::manager::assign_instructor),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .route(
            "/certificates/verify/:code",
            get(routes::certificates::verify_certificate),
        )
        .merge(protected_routes);

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(public_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

/// Validates the bearer access token and injects [`AuthContext`]
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Expected Bearer token".to_string()))?;

    let claims = jwt::validate_access_token(token, state.jwt_secret())?;

    req.extensions_mut().insert(AuthContext::from(&claims));

    Ok(next.run(req).await)
}

