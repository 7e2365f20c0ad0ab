use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::models::{AuthProvider, PublicAccount, TransportType};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupUserRequest {
    #[validate(length(min = 1, message = "First name is required"))]
    #[schema(example = "Jane")]
    pub first_name: String,

    #[validate(length(min = 1, message = "Last name is required"))]
    #[schema(example = "Doe")]
    pub last_name: String,

    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    #[schema(example = "janedoe")]
    pub username: String,

    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane@example.com")]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    #[schema(example = "password123", min_length = 8)]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupOrganizationRequest {
    #[validate(length(min = 1, message = "Organization name is required"))]
    #[schema(example = "Metro Transit")]
    pub organization_name: String,

    #[validate(length(min = 1, message = "Address is required"))]
    #[schema(example = "1 Depot Road")]
    pub address: String,

    #[validate(length(min = 1, message = "Organization ID is required"))]
    #[schema(example = "metro-01")]
    pub organization_id: String,

    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "contact@metro.example")]
    pub email: String,

    #[validate(custom(function = "validate_phone"))]
    #[schema(example = "5551234567")]
    pub phone: String,

    #[serde(default)]
    pub transport_types: Vec<TransportType>,

    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    #[schema(example = "password123", min_length = 8)]
    pub password: String,
}

/// Phone numbers must carry at least 10 digits; punctuation is ignored.
fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 10 {
        let mut err = ValidationError::new("phone");
        err.message = Some("Please enter a valid phone number (minimum 10 digits)".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,
}

/// Organizations may sign in with either their email or their public
/// organization ID. Email wins when both are present.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationLoginRequest {
    #[schema(example = "contact@metro.example")]
    pub email: Option<String>,

    #[schema(example = "metro-01")]
    pub organization_id: Option<String>,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane@example.com")]
    pub email: String,

    #[schema(example = "123456")]
    pub otp: Option<String>,

    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResendVerificationRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane@example.com")]
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub message: String,
    pub user: PublicAccount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_verification: Option<bool>,
    /// Echoed outside production only, for local testing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_link: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: PublicAccount,
}

/// Identity slice echoed back after verification.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedAccount {
    pub id: String,
    pub email: String,
    pub verified: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub message: String,
    pub account: VerifiedAccount,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResendResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_link: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub enabled: bool,
    pub callback_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersStatusResponse {
    pub google: ProviderStatus,
    pub github: ProviderStatus,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnlinkResponse {
    pub message: String,
    pub providers: Vec<AuthProvider>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: String,
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_response_nests_the_account_identity() {
        let response = VerifyResponse {
            message: "Email verified successfully".to_string(),
            account: VerifiedAccount {
                id: "acc-1".to_string(),
                email: "jane@example.com".to_string(),
                verified: true,
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["account"]["id"], "acc-1");
        assert_eq!(json["account"]["email"], "jane@example.com");
        assert_eq!(json["account"]["verified"], true);
        assert!(json.get("email").is_none());
    }
}
