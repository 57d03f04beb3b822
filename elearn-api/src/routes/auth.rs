/// Authentication endpoints
///
/// - `POST /v1/auth/register`: create a student or instructor account
/// - `POST /v1/auth/login`: exchange credentials for tokens
/// - `POST /v1/auth/refresh`: exchange a refresh token for a new pair
///
/// Manager accounts cannot be self-registered; an existing manager promotes
/// users through `PUT /v1/manager/users/:id/role`.

use axum::{extract::State, http::StatusCode, Json};
use elearn_shared::{
    auth::{jwt, password},
    models::user::{CreateUser, Role, User},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Strength is checked separately
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(min = 1, max = 150, message = "First name must be 1 to 150 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 150, message = "Last name must be 1 to 150 characters"))]
    pub last_name: String,

    /// Mobile money number, forwarded to the payment gateway
    #[validate(length(max = 32, message = "Phone must be at most 32 characters"))]
    pub phone: Option<String>,

    /// `student` (default) or `instructor`
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Tokens returned by every auth endpoint
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,

    /// Access token lifetime in seconds
    pub expires_in: i64,
}

impl TokenResponse {
    fn issue(user_id: Uuid, role: Role, secret: &str) -> ApiResult<Self> {
        let (access_token, refresh_token, expires_in) = jwt::issue_pair(user_id, role, secret)?;

        Ok(Self {
            user_id,
            role,
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in,
        })
    }
}

/// Registers a new account
///
/// # Errors
///
/// - `422`: invalid fields, weak password or a manager role requested
/// - `409`: email already registered
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    req.validate()?;

    password::validate_password_strength(&req.password)
        .map_err(|e| ApiError::invalid("password", e))?;

    let role = req.role.unwrap_or(Role::Student);
    if !role.is_self_service() {
        return Err(ApiError::invalid(
            "role",
            format!("{} accounts cannot be self-registered", role),
        ));
    }

    let password_hash = password::hash_password(&req.password)?;

    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email.trim().to_string(),
            password_hash,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            phone: req.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            role,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "User registered");

    let tokens = TokenResponse::issue(user.id, user.role, state.jwt_secret())?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

/// Authenticates with email and password
///
/// Unknown email and wrong password give the same `401`.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db, req.email.trim())
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login rejected");
        return Err(invalid());
    }

    User::update_last_login(&state.db, user.id).await?;

    Ok(Json(TokenResponse::issue(user.id, user.role, state.jwt_secret())?))
}

/// Rotates a refresh token
///
/// The role is re-read from the database so promotions take effect.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let claims = jwt::validate_refresh_token(&req.refresh_token, state.jwt_secret())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

    Ok(Json(TokenResponse::issue(user.id, user.role, state.jwt_secret())?))
}
