use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use civic_core::error::AppError;

use crate::{
    dtos::{
        auth::{
            LoginResponse, OrganizationLoginRequest, SignupOrganizationRequest, SignupResponse,
        },
        ErrorResponse,
    },
    middleware::AuthAccount,
    models::{PublicAccount, Role},
    utils::ValidatedJson,
    AppState,
};

/// Register a transport organization
#[utoipa::path(
    post,
    path = "/api/organization/signup",
    request_body = SignupOrganizationRequest,
    responses(
        (status = 201, description = "Organization created, verification pending", body = SignupResponse),
        (status = 400, description = "Validation error or duplicate email/organization ID", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Organizations"
)]
#[tracing::instrument(skip(state, req))]
pub async fn signup_organization(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.signup_organization(req).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

/// Log in as an organization, by email or organization ID
#[utoipa::path(
    post,
    path = "/api/organization/login",
    request_body = OrganizationLoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Email not verified", body = ErrorResponse)
    ),
    tag = "Organizations"
)]
#[tracing::instrument(skip(state, req))]
pub async fn login_organization(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<OrganizationLoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let res = state.auth_service.login_organization(req).await?;
    Ok(Json(res))
}

/// Return the authenticated organization's public profile
#[utoipa::path(
    get,
    path = "/api/organization/profile",
    responses(
        (status = 200, description = "Current organization", body = PublicAccount),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Organizations"
)]
#[tracing::instrument(skip(state, auth))]
pub async fn organization_profile(
    State(state): State<AppState>,
    AuthAccount(auth): AuthAccount,
) -> Result<Json<PublicAccount>, AppError> {
    let account = state
        .db
        .find_account_by_id(&auth.sub)
        .await?
        .filter(|a| a.role == Role::Organization)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Organization not found")))?;
    Ok(Json(account.sanitized()))
}
