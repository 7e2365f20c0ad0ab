use std::sync::Arc;

use civic_core::error::AppError;

use crate::dtos::auth::{
    LoginRequest, LoginResponse, OrganizationLoginRequest, ResendResponse,
    ResendVerificationRequest, SignupOrganizationRequest, SignupResponse, SignupUserRequest,
    VerifiedAccount, VerifyEmailRequest, VerifyResponse,
};
use crate::models::{Account, AuthProvider, Role};
use crate::services::email::EmailProvider;
use crate::services::jwt::JwtService;
use crate::services::verification::{new_challenge, VerificationEngine, VerifyOutcome};
use crate::services::MongoDb;
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

/// Orchestrates the account lifecycle: signup, verification, login and
/// session issue. Each account moves Unverified -> Verified exactly
/// once; login is refused until then.
#[derive(Clone)]
pub struct AuthService {
    db: MongoDb,
    email: Arc<dyn EmailProvider>,
    jwt: JwtService,
    engine: VerificationEngine,
    is_prod: bool,
    frontend_url: String,
}

impl AuthService {
    pub fn new(
        db: MongoDb,
        email: Arc<dyn EmailProvider>,
        jwt: JwtService,
        engine: VerificationEngine,
        is_prod: bool,
        frontend_url: String,
    ) -> Self {
        Self {
            db,
            email,
            jwt,
            engine,
            is_prod,
            frontend_url,
        }
    }

    pub async fn signup_user(&self, req: SignupUserRequest) -> Result<SignupResponse, AppError> {
        let account = local_person_account(Role::User, &req, self.hash(&req.password)?);

        self.db.insert_account(&account).await?;
        tracing::info!(email = %account.email, "User account created");

        self.dispatch_otp(&account).await?;
        Ok(self.signup_response(
            account,
            "User created successfully. Please verify your email with the OTP sent to your email."
                .to_string(),
        ))
    }

    /// Admins are created pre-verified: no challenge, no OTP mail.
    pub async fn signup_admin(&self, req: SignupUserRequest) -> Result<SignupResponse, AppError> {
        let account = local_person_account(Role::Admin, &req, self.hash(&req.password)?);

        self.db.insert_account(&account).await?;
        tracing::info!(email = %account.email, "Admin account created");

        Ok(SignupResponse {
            message: "Admin created successfully".to_string(),
            user: account.sanitized(),
            requires_verification: None,
            otp: None,
            verification_link: None,
        })
    }

    pub async fn signup_organization(
        &self,
        req: SignupOrganizationRequest,
    ) -> Result<SignupResponse, AppError> {
        let mut account = Account::new_organization(
            req.email.trim().to_string(),
            req.organization_id.trim().to_string(),
            req.organization_name.trim().to_string(),
            req.address.trim().to_string(),
            req.phone.trim().to_string(),
            req.transport_types,
        );
        account.password_hash = Some(self.hash(&req.password)?);
        account.providers = vec![AuthProvider::Local];
        account.challenge = Some(new_challenge(chrono::Utc::now()));

        self.db.insert_account(&account).await?;
        tracing::info!(email = %account.email, handle = %account.handle, "Organization account created");

        self.dispatch_otp(&account).await?;
        let mut response = self.signup_response(
            account,
            "Transport organization registered successfully. Please verify your email with the OTP sent to your email address.".to_string(),
        );
        response.requires_verification = Some(true);
        Ok(response)
    }

    /// Login for person accounts; `role` pins user vs admin so the
    /// same email cannot cross the role boundary.
    pub async fn login_person(
        &self,
        role: Role,
        req: LoginRequest,
    ) -> Result<LoginResponse, AppError> {
        let account = self
            .db
            .find_account_by_email(&req.email)
            .await?
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid credentials")))?;

        let password_ok = self.check_password(&account, &req.password).is_ok();
        match person_login_gate(&account, role, password_ok) {
            LoginGate::BadCredentials => {
                Err(AppError::BadRequest(anyhow::anyhow!("Invalid credentials")))
            }
            LoginGate::Unverified => Err(AppError::EmailNotVerified {
                email: account.email.clone(),
            }),
            LoginGate::Allowed => self.session_response(account),
        }
    }

    pub async fn login_organization(
        &self,
        req: OrganizationLoginRequest,
    ) -> Result<LoginResponse, AppError> {
        let email = req
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty());
        let organization_id = req
            .organization_id
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty());

        // Email wins when both identifiers are supplied.
        let account = match (email, organization_id) {
            (Some(email), _) => self.db.find_account_by_email(email).await?,
            (None, Some(handle)) => self.db.find_account_by_handle(handle).await?,
            (None, None) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Email or Organization ID is required"
                )))
            }
        };

        let account = account
            .filter(|a| a.role == Role::Organization)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid email or password")))?;

        self.check_password(&account, &req.password)
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid email or password")))?;

        if !account.verified {
            return Err(AppError::EmailNotVerified {
                email: account.email.clone(),
            });
        }

        self.session_response(account)
    }

    pub async fn verify_email(&self, req: VerifyEmailRequest) -> Result<VerifyResponse, AppError> {
        let account = self
            .db
            .find_account_by_email(&req.email)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;

        let outcome = self
            .engine
            .verify(&account, req.otp.as_deref(), req.token.as_deref())
            .await?;

        let message = match outcome {
            VerifyOutcome::Verified => "Email verified successfully",
            VerifyOutcome::AlreadyVerified => "Email already verified",
        };

        Ok(VerifyResponse {
            message: message.to_string(),
            account: VerifiedAccount {
                id: account.id,
                email: account.email,
                verified: true,
            },
        })
    }

    pub async fn resend_verification(
        &self,
        req: ResendVerificationRequest,
    ) -> Result<ResendResponse, AppError> {
        let account = self
            .db
            .find_account_by_email(&req.email)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;

        let challenge = self.engine.resend_challenge(&account).await?;

        let display_name = account.display_name();
        self.send_otp_or_abort(&account.email, &challenge.otp, &display_name)
            .await?;

        Ok(ResendResponse {
            message: "Verification OTP sent successfully. Please check your email.".to_string(),
            otp: (!self.is_prod).then(|| challenge.otp.clone()),
            verification_link: (!self.is_prod)
                .then(|| self.verification_link(&account.email, &challenge.token)),
        })
    }

    /// Unconditional session issue after OAuth identity resolution.
    pub fn session_for(&self, account: &Account) -> Result<String, AppError> {
        self.jwt
            .issue(&account.id, &account.email, account.role)
            .map_err(AppError::InternalError)
    }

    fn session_response(&self, account: Account) -> Result<LoginResponse, AppError> {
        let token = self.session_for(&account)?;
        Ok(LoginResponse {
            message: "Login successful".to_string(),
            token,
            user: account.sanitized(),
        })
    }

    fn hash(&self, password: &str) -> Result<String, AppError> {
        let hash = hash_password(&Password::new(password.to_string()))
            .map_err(AppError::InternalError)?;
        Ok(hash.into_string())
    }

    fn check_password(&self, account: &Account, password: &str) -> Result<(), anyhow::Error> {
        let hash = account
            .password_hash
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Account has no local password"))?;
        verify_password(
            &Password::new(password.to_string()),
            &PasswordHashString::new(hash.clone()),
        )
    }

    async fn dispatch_otp(&self, account: &Account) -> Result<(), AppError> {
        let challenge = account.challenge.as_ref().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!("Signup produced no challenge"))
        })?;
        let display_name = account.display_name();
        self.send_otp_or_abort(&account.email, &challenge.otp, &display_name)
            .await
    }

    /// A failed send aborts the request in production; elsewhere it is
    /// logged and the flow continues so local signups work without a
    /// mail relay.
    async fn send_otp_or_abort(
        &self,
        email: &str,
        otp: &str,
        display_name: &str,
    ) -> Result<(), AppError> {
        match self.email.send_otp(email, otp, display_name).await {
            Ok(()) => Ok(()),
            Err(e) if self.is_prod => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, email = %email, "Failed to send OTP email, continuing");
                Ok(())
            }
        }
    }

    fn signup_response(&self, account: Account, message: String) -> SignupResponse {
        let (otp, verification_link) = match (&account.challenge, self.is_prod) {
            (Some(challenge), false) => (
                Some(challenge.otp.clone()),
                Some(self.verification_link(&account.email, &challenge.token)),
            ),
            _ => (None, None),
        };

        SignupResponse {
            message,
            user: account.sanitized(),
            requires_verification: None,
            otp,
            verification_link,
        }
    }

    fn verification_link(&self, email: &str, token: &str) -> String {
        format!(
            "{}/verify-email?token={}&email={}",
            self.frontend_url,
            token,
            urlencoding::encode(email)
        )
    }
}

/// Person account as a local-credential signup stores it: exactly the
/// local provider, admins pre-verified, everyone else starts the OTP
/// flow with a fresh challenge.
fn local_person_account(role: Role, req: &SignupUserRequest, password_hash: String) -> Account {
    let mut account = Account::new_person(
        role,
        req.email.trim().to_string(),
        req.username.trim().to_string(),
        Some(req.first_name.trim().to_string()),
        Some(req.last_name.trim().to_string()),
    );
    account.password_hash = Some(password_hash);
    account.providers = vec![AuthProvider::Local];
    if role == Role::Admin {
        account.verified = true;
    } else {
        account.challenge = Some(new_challenge(chrono::Utc::now()));
    }
    account
}

#[derive(Debug, PartialEq, Eq)]
enum LoginGate {
    Allowed,
    BadCredentials,
    Unverified,
}

/// Login decision for person accounts. Credential failures mask
/// everything else; the unverified state is only revealed once the
/// password has matched, and admins skip the verification gate because
/// they are created verified.
fn person_login_gate(account: &Account, role: Role, password_ok: bool) -> LoginGate {
    if account.role != role || !password_ok {
        return LoginGate::BadCredentials;
    }
    if role == Role::User && !account.verified {
        return LoginGate::Unverified;
    }
    LoginGate::Allowed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup_request() -> SignupUserRequest {
        SignupUserRequest {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            username: "janedoe".to_string(),
            email: "Jane@Example.com".to_string(),
            password: "password123".to_string(),
        }
    }

    #[test]
    fn local_signup_starts_unverified_with_only_local_provider() {
        let account = local_person_account(Role::User, &signup_request(), "hash".to_string());

        assert_eq!(account.providers, vec![AuthProvider::Local]);
        assert!(!account.verified);
        assert!(account.challenge.is_some());
        assert_eq!(account.email, "jane@example.com");
    }

    #[test]
    fn admin_signup_is_pre_verified_without_challenge() {
        let account = local_person_account(Role::Admin, &signup_request(), "hash".to_string());

        assert_eq!(account.providers, vec![AuthProvider::Local]);
        assert!(account.verified);
        assert!(account.challenge.is_none());
    }

    #[test]
    fn unverified_login_is_flagged_not_rejected_as_bad_credentials() {
        let mut account = local_person_account(Role::User, &signup_request(), "hash".to_string());

        assert_eq!(
            person_login_gate(&account, Role::User, true),
            LoginGate::Unverified
        );
        // A wrong password never reveals the verification state.
        assert_eq!(
            person_login_gate(&account, Role::User, false),
            LoginGate::BadCredentials
        );

        account.verified = true;
        assert_eq!(
            person_login_gate(&account, Role::User, true),
            LoginGate::Allowed
        );
    }

    #[test]
    fn login_never_crosses_the_role_boundary() {
        let account = local_person_account(Role::User, &signup_request(), "hash".to_string());
        assert_eq!(
            person_login_gate(&account, Role::Admin, true),
            LoginGate::BadCredentials
        );
    }
}
