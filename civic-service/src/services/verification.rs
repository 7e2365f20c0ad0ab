use chrono::{DateTime, Duration, Utc};
use civic_core::error::AppError;
use rand::Rng;

use crate::models::{Account, VerificationChallenge};
use crate::services::MongoDb;

pub const OTP_TTL_MINUTES: i64 = 10;
pub const TOKEN_TTL_HOURS: i64 = 24;
pub const MAX_OTP_ATTEMPTS: i32 = 5;
pub const ATTEMPT_COOLDOWN_SECONDS: i64 = 60;
/// A resend is allowed only inside the final minute of the current
/// OTP's life, or once it has expired.
pub const RESEND_WINDOW_SECONDS: i64 = 60;

/// Generate a uniform 6-digit OTP.
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(100000..=999999).to_string()
}

/// Generate the long verification token backing the emailed deep link.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

pub fn new_challenge(now: DateTime<Utc>) -> VerificationChallenge {
    VerificationChallenge {
        otp: generate_otp(),
        otp_expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
        token: generate_token(),
        token_expires_at: now + Duration::hours(TOKEN_TTL_HOURS),
        attempts: 0,
        last_attempt_at: None,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum OtpCheck {
    Verified,
    /// Mismatch; carries the attempt count to persist.
    Invalid {
        attempts: i32,
    },
    Expired,
    RateLimited,
}

/// Decide the outcome of a submitted OTP. The cooldown gate runs
/// before the code comparison, so a correct code inside a saturated
/// window is still rejected.
pub fn check_otp(
    challenge: &VerificationChallenge,
    submitted: &str,
    now: DateTime<Utc>,
) -> OtpCheck {
    let within_cooldown = challenge
        .last_attempt_utc()
        .map(|last| (now - last).num_seconds() < ATTEMPT_COOLDOWN_SECONDS)
        .unwrap_or(false);

    let attempts = if within_cooldown {
        if challenge.attempts >= MAX_OTP_ATTEMPTS {
            return OtpCheck::RateLimited;
        }
        challenge.attempts
    } else {
        // Window elapsed, the counter starts over.
        0
    };

    if challenge.otp != submitted {
        return OtpCheck::Invalid {
            attempts: attempts + 1,
        };
    }

    if challenge.otp_expires_at < now {
        return OtpCheck::Expired;
    }

    OtpCheck::Verified
}

#[derive(Debug, PartialEq, Eq)]
pub enum TokenCheck {
    Verified,
    Invalid,
    Expired,
}

pub fn check_token(
    challenge: &VerificationChallenge,
    submitted: &str,
    now: DateTime<Utc>,
) -> TokenCheck {
    if challenge.token != submitted {
        return TokenCheck::Invalid;
    }
    if challenge.token_expires_at < now {
        return TokenCheck::Expired;
    }
    TokenCheck::Verified
}

/// Seconds the caller must wait before a resend is allowed, or None
/// when a resend may proceed now.
pub fn resend_wait_seconds(
    challenge: Option<&VerificationChallenge>,
    now: DateTime<Utc>,
) -> Option<i64> {
    let challenge = challenge?;
    let remaining = (challenge.otp_expires_at - now).num_seconds();
    if remaining > RESEND_WINDOW_SECONDS {
        Some(remaining - RESEND_WINDOW_SECONDS)
    } else {
        None
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    AlreadyVerified,
}

/// What a verification attempt should do to the account document.
#[derive(Debug, PartialEq, Eq)]
pub enum VerifyAction {
    /// Already verified; nothing to persist.
    AlreadyVerified,
    MarkVerified,
    /// Wrong OTP; persist the bumped attempt counter, then reject.
    RecordFailedAttempt { attempts: i32 },
}

/// Decide a verification attempt without touching the store. Verified
/// accounts short-circuit before any credential is inspected.
pub fn decide_verification(
    account: &Account,
    otp: Option<&str>,
    token: Option<&str>,
    now: DateTime<Utc>,
) -> Result<VerifyAction, AppError> {
    if account.verified {
        return Ok(VerifyAction::AlreadyVerified);
    }

    if otp.is_none() && token.is_none() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Either OTP or token is required"
        )));
    }

    let challenge = account.challenge.as_ref().ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "No pending verification. Please request a new code."
        ))
    })?;

    if let Some(otp) = otp {
        match check_otp(challenge, otp, now) {
            OtpCheck::Verified => Ok(VerifyAction::MarkVerified),
            OtpCheck::Invalid { attempts } => Ok(VerifyAction::RecordFailedAttempt { attempts }),
            OtpCheck::Expired => Err(AppError::BadRequest(anyhow::anyhow!(
                "OTP has expired. Please request a new one."
            ))),
            OtpCheck::RateLimited => Err(AppError::TooManyRequests(
                "Too many attempts. Please wait 1 minute before trying again.".to_string(),
                Some(ATTEMPT_COOLDOWN_SECONDS as u64),
            )),
        }
    } else if let Some(token) = token {
        match check_token(challenge, token, now) {
            TokenCheck::Verified => Ok(VerifyAction::MarkVerified),
            TokenCheck::Invalid => Err(AppError::BadRequest(anyhow::anyhow!(
                "Invalid verification token"
            ))),
            TokenCheck::Expired => Err(AppError::BadRequest(anyhow::anyhow!(
                "Verification token has expired"
            ))),
        }
    } else {
        Err(AppError::BadRequest(anyhow::anyhow!(
            "Either OTP or token is required"
        )))
    }
}

/// OTP/token engine. Stores challenges on the account document and
/// flips `verified` exactly once.
#[derive(Clone)]
pub struct VerificationEngine {
    db: MongoDb,
}

impl VerificationEngine {
    pub fn new(db: MongoDb) -> Self {
        Self { db }
    }

    /// Reissue a challenge, throttled to the final minute of the
    /// current OTP's life.
    pub async fn resend_challenge(
        &self,
        account: &Account,
    ) -> Result<VerificationChallenge, AppError> {
        if account.verified {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Email already verified"
            )));
        }

        if let Some(wait) = resend_wait_seconds(account.challenge.as_ref(), Utc::now()) {
            return Err(AppError::TooManyRequests(
                "Please wait before requesting a new OTP. You can request a new OTP shortly before the current one expires.".to_string(),
                Some(wait.max(1) as u64),
            ));
        }

        let challenge = new_challenge(Utc::now());
        self.db.set_challenge(&account.id, &challenge).await?;
        Ok(challenge)
    }

    /// Verify by OTP (preferred) or by the emailed token. Idempotent
    /// for already-verified accounts.
    pub async fn verify(
        &self,
        account: &Account,
        otp: Option<&str>,
        token: Option<&str>,
    ) -> Result<VerifyOutcome, AppError> {
        let now = Utc::now();
        match decide_verification(account, otp, token, now)? {
            VerifyAction::AlreadyVerified => Ok(VerifyOutcome::AlreadyVerified),
            VerifyAction::MarkVerified => {
                self.db.mark_verified(&account.id).await?;
                Ok(VerifyOutcome::Verified)
            }
            VerifyAction::RecordFailedAttempt { attempts } => {
                self.db
                    .record_failed_otp_attempt(&account.id, attempts, now)
                    .await?;
                Err(AppError::BadRequest(anyhow::anyhow!("Invalid OTP")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge_at(now: DateTime<Utc>) -> VerificationChallenge {
        VerificationChallenge {
            otp: "123456".to_string(),
            otp_expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
            token: "a".repeat(64),
            token_expires_at: now + Duration::hours(TOKEN_TTL_HOURS),
            attempts: 0,
            last_attempt_at: None,
        }
    }

    fn now() -> DateTime<Utc> {
        "2026-01-10T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn otp_in_expected_range() {
        for _ in 0..100 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            let n: u32 = otp.parse().unwrap();
            assert!((100000..=999999).contains(&n));
        }
    }

    #[test]
    fn token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn correct_otp_verifies() {
        let t0 = now();
        let challenge = challenge_at(t0);
        assert_eq!(
            check_otp(&challenge, "123456", t0 + Duration::minutes(5)),
            OtpCheck::Verified
        );
    }

    #[test]
    fn wrong_otp_increments_attempts() {
        let t0 = now();
        let mut challenge = challenge_at(t0);
        challenge.attempts = 2;
        challenge.last_attempt_at = Some(mongodb::bson::DateTime::from_chrono(
            t0 + Duration::seconds(30),
        ));
        assert_eq!(
            check_otp(&challenge, "000000", t0 + Duration::seconds(40)),
            OtpCheck::Invalid { attempts: 3 }
        );
    }

    #[test]
    fn attempt_counter_resets_after_cooldown() {
        let t0 = now();
        let mut challenge = challenge_at(t0);
        challenge.attempts = 4;
        challenge.last_attempt_at = Some(mongodb::bson::DateTime::from_chrono(t0));
        // 61 seconds later the window has elapsed
        assert_eq!(
            check_otp(&challenge, "000000", t0 + Duration::seconds(61)),
            OtpCheck::Invalid { attempts: 1 }
        );
    }

    #[test]
    fn sixth_attempt_inside_cooldown_is_rate_limited_even_with_right_code() {
        let t0 = now();
        let mut challenge = challenge_at(t0);
        challenge.attempts = 5;
        challenge.last_attempt_at = Some(mongodb::bson::DateTime::from_chrono(
            t0 + Duration::seconds(30),
        ));
        assert_eq!(
            check_otp(&challenge, "123456", t0 + Duration::seconds(45)),
            OtpCheck::RateLimited
        );
    }

    #[test]
    fn matching_but_expired_otp_is_expired_not_invalid() {
        let t0 = now();
        let challenge = challenge_at(t0);
        assert_eq!(
            check_otp(&challenge, "123456", t0 + Duration::minutes(11)),
            OtpCheck::Expired
        );
    }

    #[test]
    fn token_path_has_independent_expiry() {
        let t0 = now();
        let challenge = challenge_at(t0);
        let token = challenge.token.clone();
        // The OTP is long dead at +12h; the token is still live
        assert_eq!(
            check_token(&challenge, &token, t0 + Duration::hours(12)),
            TokenCheck::Verified
        );
        assert_eq!(
            check_token(&challenge, &token, t0 + Duration::hours(25)),
            TokenCheck::Expired
        );
        assert_eq!(
            check_token(&challenge, "deadbeef", t0 + Duration::hours(1)),
            TokenCheck::Invalid
        );
    }

    #[test]
    fn resend_blocked_while_more_than_a_minute_remains() {
        let t0 = now();
        let challenge = challenge_at(t0);
        // At T+5m, 5 minutes remain: too soon, wait 4 minutes
        assert_eq!(
            resend_wait_seconds(Some(&challenge), t0 + Duration::minutes(5)),
            Some(240)
        );
    }

    #[test]
    fn resend_allowed_in_final_minute_and_after_expiry() {
        let t0 = now();
        let challenge = challenge_at(t0);
        assert_eq!(
            resend_wait_seconds(Some(&challenge), t0 + Duration::seconds(9 * 60 + 31)),
            None
        );
        assert_eq!(
            resend_wait_seconds(Some(&challenge), t0 + Duration::minutes(15)),
            None
        );
    }

    #[test]
    fn resend_allowed_without_pending_challenge() {
        assert_eq!(resend_wait_seconds(None, now()), None);
    }

    fn pending_account(challenge: VerificationChallenge) -> Account {
        use crate::models::Role;
        let mut account = Account::new_person(
            Role::User,
            "jane@example.com".to_string(),
            "jane".to_string(),
            None,
            None,
        );
        account.challenge = Some(challenge);
        account
    }

    #[test]
    fn correct_otp_on_pending_account_marks_verified() {
        let account = pending_account(challenge_at(now()));
        assert_eq!(
            decide_verification(&account, Some("123456"), None, now()).unwrap(),
            VerifyAction::MarkVerified
        );
    }

    #[test]
    fn repeat_verification_short_circuits_with_no_writes() {
        let mut account = pending_account(challenge_at(now()));
        account.verified = true;

        // Even a wrong code decides AlreadyVerified: nothing to persist,
        // no attempt counted.
        assert_eq!(
            decide_verification(&account, Some("000000"), None, now()).unwrap(),
            VerifyAction::AlreadyVerified
        );
        assert_eq!(
            decide_verification(&account, None, None, now()).unwrap(),
            VerifyAction::AlreadyVerified
        );
    }

    #[test]
    fn missing_credential_on_pending_account_is_rejected() {
        let account = pending_account(challenge_at(now()));
        assert!(decide_verification(&account, None, None, now()).is_err());
    }
}
