use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use civic_core::error::AppError;

use crate::{
    dtos::{
        auth::{
            LoginRequest, LoginResponse, ResendResponse, ResendVerificationRequest,
            SignupResponse, SignupUserRequest, VerifyEmailRequest, VerifyResponse,
        },
        ErrorResponse,
    },
    middleware::AuthAccount,
    models::{PublicAccount, Role},
    utils::ValidatedJson,
    AppState,
};

/// Register a new user account
#[utoipa::path(
    post,
    path = "/api/auth/signup/user",
    request_body = SignupUserRequest,
    responses(
        (status = 201, description = "User created, verification pending", body = SignupResponse),
        (status = 400, description = "Validation error or duplicate email/username", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, req))]
pub async fn signup_user(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.signup_user(req).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

/// Register a new admin account (created pre-verified)
#[utoipa::path(
    post,
    path = "/api/auth/signup/admin",
    request_body = SignupUserRequest,
    responses(
        (status = 201, description = "Admin created", body = SignupResponse),
        (status = 400, description = "Validation error or duplicate email/username", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, req))]
pub async fn signup_admin(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.signup_admin(req).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

/// Log in as a user
#[utoipa::path(
    post,
    path = "/api/auth/login/user",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Email not verified", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, req))]
pub async fn login_user(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let res = state.auth_service.login_person(Role::User, req).await?;
    Ok(Json(res))
}

/// Log in as an admin
#[utoipa::path(
    post,
    path = "/api/auth/login/admin",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, req))]
pub async fn login_admin(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let res = state.auth_service.login_person(Role::Admin, req).await?;
    Ok(Json(res))
}

/// Verify an email address with an OTP or a verification token
#[utoipa::path(
    post,
    path = "/api/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = VerifyResponse),
        (status = 400, description = "Invalid or expired OTP/token", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn verify_email(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyEmailRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    let res = state.auth_service.verify_email(req).await?;
    Ok(Json(res))
}

/// Issue a fresh OTP to an unverified account
#[utoipa::path(
    post,
    path = "/api/auth/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Verification OTP sent", body = ResendResponse),
        (status = 400, description = "Email already verified", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 429, description = "Requested too soon", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn resend_verification(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResendVerificationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.resend_verification(req).await?;
    Ok(Json(res))
}

/// Return the authenticated account's public profile
#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Current account", body = PublicAccount),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Account no longer exists", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, auth))]
pub async fn profile(
    State(state): State<AppState>,
    AuthAccount(auth): AuthAccount,
) -> Result<Json<PublicAccount>, AppError> {
    let account = state
        .db
        .find_account_by_id(&auth.sub)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;
    Ok(Json(account.sanitized()))
}
