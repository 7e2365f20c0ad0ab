use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use civic_core::error::AppError;

use crate::{
    dtos::{
        auth::{OAuthCallbackQuery, ProviderStatus, ProvidersStatusResponse, UnlinkResponse},
        ErrorResponse,
    },
    middleware::AuthAccount,
    models::AuthProvider,
    services::OAuthProfile,
    AppState,
};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUserInfo {
    id: i64,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Start the Google OAuth flow
#[tracing::instrument(skip(state, jar))]
pub async fn google_authorize(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    let Some(google) = state.config.google.clone() else {
        return (jar, disabled_redirect(&state, AuthProvider::Google));
    };

    let (state_val, code_verifier, code_challenge) = pkce_material();

    let auth_url = format!(
        "https://accounts.google.com/o/oauth2/v2/auth?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile&state={}&code_challenge={}&code_challenge_method=S256",
        urlencoding::encode(&google.client_id),
        urlencoding::encode(&callback_url(&state, AuthProvider::Google)),
        state_val,
        code_challenge
    );

    (
        flow_cookies(jar, state_val, code_verifier),
        Redirect::to(&auth_url).into_response(),
    )
}

/// Handle the Google OAuth callback
#[tracing::instrument(skip_all)]
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<(CookieJar, Response), AppError> {
    let google = state
        .config
        .google
        .clone()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Google sign-in is not enabled")))?;

    let code_verifier = validate_flow_cookies(&jar, &query.state)?;

    let client = reqwest::Client::new();
    let token_res = client
        .post("https://oauth2.googleapis.com/token")
        .form(&[
            ("client_id", google.client_id.as_str()),
            ("client_secret", google.client_secret.as_str()),
            ("code", query.code.as_str()),
            ("code_verifier", code_verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", &callback_url(&state, AuthProvider::Google)),
        ])
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to exchange Google code");
            AppError::Unauthorized(anyhow::anyhow!("Authentication failed"))
        })?;

    if !token_res.status().is_success() {
        let status = token_res.status();
        let err_body = token_res.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %err_body, "Google token exchange error");
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Authentication failed"
        )));
    }

    let token_data: TokenResponse = token_res.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse Google token response");
        AppError::InternalError(anyhow::anyhow!("Internal server error"))
    })?;

    let user_info: GoogleUserInfo = client
        .get("https://www.googleapis.com/oauth2/v2/userinfo")
        .bearer_auth(&token_data.access_token)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch Google user info");
            AppError::Unauthorized(anyhow::anyhow!("Authentication failed"))
        })?
        .json()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Google user info");
            AppError::InternalError(anyhow::anyhow!("Internal server error"))
        })?;

    let profile = OAuthProfile {
        provider: AuthProvider::Google,
        provider_id: user_info.id,
        email: user_info.email,
        first_name: user_info.given_name,
        last_name: user_info.family_name,
        picture: user_info.picture,
    };

    finish_login(&state, jar, profile).await
}

/// Start the GitHub OAuth flow
#[tracing::instrument(skip(state, jar))]
pub async fn github_authorize(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    let Some(github) = state.config.github.clone() else {
        return (jar, disabled_redirect(&state, AuthProvider::Github));
    };

    let (state_val, code_verifier, code_challenge) = pkce_material();

    let auth_url = format!(
        "https://github.com/login/oauth/authorize?client_id={}&redirect_uri={}&scope=read:user%20user:email&state={}&code_challenge={}&code_challenge_method=S256",
        urlencoding::encode(&github.client_id),
        urlencoding::encode(&callback_url(&state, AuthProvider::Github)),
        state_val,
        code_challenge
    );

    (
        flow_cookies(jar, state_val, code_verifier),
        Redirect::to(&auth_url).into_response(),
    )
}

/// Handle the GitHub OAuth callback
#[tracing::instrument(skip_all)]
pub async fn github_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<(CookieJar, Response), AppError> {
    let github = state
        .config
        .github
        .clone()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("GitHub sign-in is not enabled")))?;

    let code_verifier = validate_flow_cookies(&jar, &query.state)?;

    let client = reqwest::Client::new();
    let token_res = client
        .post("https://github.com/login/oauth/access_token")
        .header("Accept", "application/json")
        .form(&[
            ("client_id", github.client_id.as_str()),
            ("client_secret", github.client_secret.as_str()),
            ("code", query.code.as_str()),
            ("code_verifier", code_verifier.as_str()),
            ("redirect_uri", &callback_url(&state, AuthProvider::Github)),
        ])
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to exchange GitHub code");
            AppError::Unauthorized(anyhow::anyhow!("Authentication failed"))
        })?;

    if !token_res.status().is_success() {
        let status = token_res.status();
        let err_body = token_res.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %err_body, "GitHub token exchange error");
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Authentication failed"
        )));
    }

    let token_data: TokenResponse = token_res.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse GitHub token response");
        AppError::InternalError(anyhow::anyhow!("Internal server error"))
    })?;

    // GitHub requires a User-Agent on API requests.
    let user_info: GithubUserInfo = client
        .get("https://api.github.com/user")
        .header("User-Agent", "civic-service")
        .bearer_auth(&token_data.access_token)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch GitHub user info");
            AppError::Unauthorized(anyhow::anyhow!("Authentication failed"))
        })?
        .json()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to parse GitHub user info");
            AppError::InternalError(anyhow::anyhow!("Internal server error"))
        })?;

    // The profile email is often private; fall back to the emails API,
    // preferring the primary verified address.
    let email = match user_info.email {
        Some(email) => Some(email),
        None => fetch_github_primary_email(&client, &token_data.access_token).await,
    };

    let (first_name, last_name) = split_name(user_info.name.as_deref());

    let profile = OAuthProfile {
        provider: AuthProvider::Github,
        provider_id: user_info.id.to_string(),
        email,
        first_name,
        last_name,
        picture: user_info.avatar_url,
    };

    finish_login(&state, jar, profile).await
}

/// Which OAuth providers this deployment has configured
#[utoipa::path(
    get,
    path = "/api/auth/providers",
    responses(
        (status = 200, description = "Provider availability", body = ProvidersStatusResponse)
    ),
    tag = "Authentication"
)]
pub async fn providers_status(State(state): State<AppState>) -> Json<ProvidersStatusResponse> {
    Json(ProvidersStatusResponse {
        google: ProviderStatus {
            enabled: state.config.google.is_some(),
            callback_url: callback_url(&state, AuthProvider::Google),
        },
        github: ProviderStatus {
            enabled: state.config.github.is_some(),
            callback_url: callback_url(&state, AuthProvider::Github),
        },
    })
}

/// Unlink the Google sign-in method from the current account
#[utoipa::path(
    delete,
    path = "/api/auth/google/unlink",
    responses(
        (status = 200, description = "Provider unlinked", body = UnlinkResponse),
        (status = 400, description = "Not linked, or last remaining sign-in method", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, auth))]
pub async fn unlink_google(
    State(state): State<AppState>,
    AuthAccount(auth): AuthAccount,
) -> Result<Json<UnlinkResponse>, AppError> {
    unlink(&state, &auth.sub, AuthProvider::Google).await
}

/// Unlink the GitHub sign-in method from the current account
#[utoipa::path(
    delete,
    path = "/api/auth/github/unlink",
    responses(
        (status = 200, description = "Provider unlinked", body = UnlinkResponse),
        (status = 400, description = "Not linked, or last remaining sign-in method", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
#[tracing::instrument(skip(state, auth))]
pub async fn unlink_github(
    State(state): State<AppState>,
    AuthAccount(auth): AuthAccount,
) -> Result<Json<UnlinkResponse>, AppError> {
    unlink(&state, &auth.sub, AuthProvider::Github).await
}

async fn unlink(
    state: &AppState,
    account_id: &str,
    provider: AuthProvider,
) -> Result<Json<UnlinkResponse>, AppError> {
    let account = state
        .db
        .find_account_by_id(account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;

    let providers = state.identity.unlink(&account, provider).await?;
    tracing::info!(account_id = %account.id, provider = %provider.as_str(), "Provider unlinked");

    Ok(Json(UnlinkResponse {
        message: format!("{} account unlinked successfully", provider.as_str()),
        providers,
    }))
}

async fn finish_login(
    state: &AppState,
    jar: CookieJar,
    profile: OAuthProfile,
) -> Result<(CookieJar, Response), AppError> {
    let account = state.identity.resolve(&profile).await?;
    let token = state.auth_service.session_for(&account)?;

    tracing::info!(
        account_id = %account.id,
        provider = %profile.provider.as_str(),
        "Account logged in via OAuth"
    );

    let user_json = serde_json::to_string(&account.sanitized())
        .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;
    let redirect_url = format!(
        "{}/auth/callback?token={}&user={}",
        state.config.frontend_url,
        urlencoding::encode(&token),
        urlencoding::encode(&user_json)
    );

    let updated_jar = jar
        .remove(Cookie::from("oauth_state"))
        .remove(Cookie::from("code_verifier"));

    Ok((updated_jar, Redirect::to(&redirect_url).into_response()))
}

fn pkce_material() -> (String, String, String) {
    let state_val = uuid::Uuid::new_v4().to_string();
    let code_verifier = {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        use rand::Rng;
        rng.fill(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    };
    let code_challenge = {
        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    };
    (state_val, code_verifier, code_challenge)
}

fn flow_cookies(jar: CookieJar, state_val: String, code_verifier: String) -> CookieJar {
    jar.add(
        Cookie::build(("oauth_state", state_val))
            .path("/")
            .http_only(true)
            .secure(true)
            .max_age(time::Duration::minutes(5))
            .build(),
    )
    .add(
        Cookie::build(("code_verifier", code_verifier))
            .path("/")
            .http_only(true)
            .secure(true)
            .max_age(time::Duration::minutes(5))
            .build(),
    )
}

fn validate_flow_cookies(jar: &CookieJar, state_param: &str) -> Result<String, AppError> {
    let stored_state = jar.get("oauth_state").map(|c| c.value());
    if stored_state != Some(state_param) {
        return Err(AppError::BadRequest(anyhow::anyhow!("Invalid OAuth state")));
    }

    jar.get("code_verifier")
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing code verifier")))
}

fn callback_url(state: &AppState, provider: AuthProvider) -> String {
    format!(
        "{}/api/auth/{}/callback",
        state.config.backend_url,
        provider.as_str()
    )
}

fn disabled_redirect(state: &AppState, provider: AuthProvider) -> Response {
    tracing::warn!(provider = %provider.as_str(), "OAuth flow requested but provider not configured");
    Redirect::to(&format!(
        "{}/login/user?error={}_oauth_disabled",
        state.config.frontend_url,
        provider.as_str()
    ))
    .into_response()
}

async fn fetch_github_primary_email(client: &reqwest::Client, access_token: &str) -> Option<String> {
    let res = client
        .get("https://api.github.com/user/emails")
        .header("User-Agent", "civic-service")
        .bearer_auth(access_token)
        .send()
        .await
        .ok()?;

    let emails: Vec<GithubEmail> = res.json().await.ok()?;
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| e.email.clone())
}

/// "Ada Lovelace" -> ("Ada", "Lovelace"); a single word maps to the
/// first name only.
fn split_name(name: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return (None, None);
    };
    match name.split_once(' ') {
        Some((first, last)) => (Some(first.to_string()), Some(last.trim().to_string())),
        None => (Some(name.to_string()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name_handles_single_and_double_words() {
        assert_eq!(
            split_name(Some("Ada Lovelace")),
            (Some("Ada".to_string()), Some("Lovelace".to_string()))
        );
        assert_eq!(split_name(Some("Ada")), (Some("Ada".to_string()), None));
        assert_eq!(split_name(None), (None, None));
        assert_eq!(split_name(Some("  ")), (None, None));
    }

    #[test]
    fn pkce_challenge_is_derived_from_verifier() {
        let (_, verifier, challenge) = pkce_material();
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        assert_eq!(challenge, URL_SAFE_NO_PAD.encode(hasher.finalize()));
    }
}
