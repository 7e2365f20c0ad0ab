pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use civic_core::error::AppError;
use civic_core::middleware::{
    ip_rate_limit_middleware, request_id_middleware, security_headers_middleware, IpRateLimiter,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{openapi::security::SecurityScheme, Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::services::{
    AuthService, EmailProvider, IdentityService, JwtService, MongoDb, ObjectStorage,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::signup_user,
        handlers::auth::signup_admin,
        handlers::auth::login_user,
        handlers::auth::login_admin,
        handlers::auth::verify_email,
        handlers::auth::resend_verification,
        handlers::auth::profile,
        handlers::oauth::providers_status,
        handlers::oauth::unlink_google,
        handlers::oauth::unlink_github,
        handlers::organization::signup_organization,
        handlers::organization::login_organization,
        handlers::organization::organization_profile,
        handlers::issues::report_issue,
        handlers::issues::list_issues,
        handlers::issues::list_issues_by_user,
        handlers::issues::solve_issue,
        handlers::issues::list_solved_issues,
        handlers::rankings::user_rankings,
        handlers::rankings::organization_rankings,
        handlers::transport::create_entry,
        handlers::transport::list_entries,
        handlers::transport::entries_by_agency,
        handlers::transport::check_availability,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::SignupUserRequest,
            dtos::auth::SignupOrganizationRequest,
            dtos::auth::SignupResponse,
            dtos::auth::LoginRequest,
            dtos::auth::OrganizationLoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::VerifyEmailRequest,
            dtos::auth::VerifyResponse,
            dtos::auth::VerifiedAccount,
            dtos::auth::ResendVerificationRequest,
            dtos::auth::ResendResponse,
            dtos::auth::ProviderStatus,
            dtos::auth::ProvidersStatusResponse,
            dtos::auth::UnlinkResponse,
            dtos::issue::IssueView,
            dtos::issue::ReportIssueResponse,
            dtos::issue::SolveIssueRequest,
            dtos::issue::SolvedIssueView,
            dtos::issue::SolveIssueResponse,
            dtos::issue::RankedUser,
            dtos::issue::RankedOrganization,
            dtos::transport::CreateTransportEntryRequest,
            dtos::transport::TransportEntryView,
            dtos::transport::CreateTransportEntryResponse,
            dtos::transport::AvailabilityRequest,
            dtos::transport::SearchTerms,
            dtos::transport::AvailabilityResponse,
            dtos::transport::RouteStat,
            dtos::transport::AgencyStats,
            dtos::transport::AgencyTransportsResponse,
            models::PublicAccount,
            models::Role,
            models::AuthProvider,
            models::TransportType,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Signup, login, email verification and OAuth"),
        (name = "Organizations", description = "Transport organization accounts"),
        (name = "Issues", description = "Civic issue reporting and resolution"),
        (name = "Rankings", description = "User and organization leaderboards"),
        (name = "Transport", description = "Transport entries and availability search"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: MongoDb,
    pub email: Arc<dyn EmailProvider>,
    pub storage: Arc<dyn ObjectStorage>,
    pub jwt: JwtService,
    pub auth_service: AuthService,
    pub identity: IdentityService,
    pub login_rate_limiter: IpRateLimiter,
    pub signup_rate_limiter: IpRateLimiter,
    pub verify_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Login routes share one limiter across the three roles
    let login_limiter = state.login_rate_limiter.clone();
    let login_routes = Router::new()
        .route("/api/auth/login/user", post(handlers::auth::login_user))
        .route("/api/auth/login/admin", post(handlers::auth::login_admin))
        .route(
            "/api/organization/login",
            post(handlers::organization::login_organization),
        )
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    let signup_limiter = state.signup_rate_limiter.clone();
    let signup_routes = Router::new()
        .route("/api/auth/signup/user", post(handlers::auth::signup_user))
        .route("/api/auth/signup/admin", post(handlers::auth::signup_admin))
        .route(
            "/api/organization/signup",
            post(handlers::organization::signup_organization),
        )
        .layer(from_fn_with_state(signup_limiter, ip_rate_limit_middleware));

    let verify_limiter = state.verify_rate_limiter.clone();
    let verify_routes = Router::new()
        .route("/api/auth/verify-email", post(handlers::auth::verify_email))
        .route(
            "/api/auth/resend-verification",
            post(handlers::auth::resend_verification),
        )
        .layer(from_fn_with_state(verify_limiter, ip_rate_limit_middleware));

    // Routes that require a valid bearer token
    let protected_routes = Router::new()
        .route("/api/auth/profile", get(handlers::auth::profile))
        .route(
            "/api/organization/profile",
            get(handlers::organization::organization_profile),
        )
        .route("/api/auth/google/unlink", delete(handlers::oauth::unlink_google))
        .route("/api/auth/github/unlink", delete(handlers::oauth::unlink_github))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    let ip_limiter = state.ip_rate_limiter.clone();

    let mut app = Router::new().route("/health", get(health_check));

    let swagger_enabled = match state.config.environment {
        config::Environment::Dev => true,
        config::Environment::Prod => state.config.swagger.enabled == config::SwaggerMode::Public,
    };

    if swagger_enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    let app = app
        .route("/api/auth/providers", get(handlers::oauth::providers_status))
        .route("/api/auth/google", get(handlers::oauth::google_authorize))
        .route(
            "/api/auth/google/callback",
            get(handlers::oauth::google_callback),
        )
        .route("/api/auth/github", get(handlers::oauth::github_authorize))
        .route(
            "/api/auth/github/callback",
            get(handlers::oauth::github_callback),
        )
        .merge(login_routes)
        .merge(signup_routes)
        .merge(verify_routes)
        .merge(protected_routes)
        .route("/api/issue/report", post(handlers::issues::report_issue))
        .route("/api/issue/all", get(handlers::issues::list_issues))
        .route(
            "/api/issue/user/:username",
            get(handlers::issues::list_issues_by_user),
        )
        .route("/api/issuesolved/solve", post(handlers::issues::solve_issue))
        .route(
            "/api/issuesolved/all",
            get(handlers::issues::list_solved_issues),
        )
        .route("/api/userrank/all", get(handlers::rankings::user_rankings))
        .route(
            "/api/organizationrank/all",
            get(handlers::rankings::organization_rankings),
        )
        .route("/api/entry/create", post(handlers::transport::create_entry))
        .route("/api/entry/all", get(handlers::transport::list_entries))
        .route(
            "/api/entry/agency/:agency_name",
            get(handlers::transport::entries_by_agency),
        )
        .route(
            "/api/query/availability",
            post(handlers::transport::check_availability),
        )
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Add tracing layer
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add security headers middleware
        .layer(from_fn(security_headers_middleware))
        // Add CORS layer
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<axum::http::HeaderValue>().unwrap_or_else(|e| {
                                tracing::error!(
                                    "Invalid CORS origin '{}': {}. Using fallback.",
                                    o,
                                    e
                                );
                                axum::http::HeaderValue::from_static("*")
                            })
                        })
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PATCH,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "MongoDB health check failed");
        e
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "mongodb": "up"
        }
    })))
}
