use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::models::Role;

/// Stateless session issuer. Sessions carry an absolute 24h expiry and
/// cannot be revoked before it; there is no refresh channel.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account ID)
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            expiry_hours: config.expiry_hours,
        }
    }

    pub fn issue(&self, account_id: &str, email: &str, role: Role) -> Result<String, anyhow::Error> {
        self.issue_with_expiry(account_id, email, role, Duration::hours(self.expiry_hours))
    }

    fn issue_with_expiry(
        &self,
        account_id: &str,
        email: &str,
        role: Role,
        expiry: Duration,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: account_id.to_string(),
            email: email.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + expiry).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode session token: {}", e))?;
        Ok(token)
    }

    pub fn authenticate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "unit-test-secret".to_string(),
            expiry_hours: 24,
        })
    }

    #[test]
    fn round_trips_claims_for_every_role() {
        let jwt = service();
        for role in [Role::User, Role::Admin, Role::Organization] {
            let token = jwt.issue("acct-1", "a@b.c", role).unwrap();
            let claims = jwt.authenticate(&token).unwrap();
            assert_eq!(claims.sub, "acct-1");
            assert_eq!(claims.email, "a@b.c");
            assert_eq!(claims.role, role);
            assert!(claims.exp - claims.iat >= 24 * 3600 - 5);
        }
    }

    #[test]
    fn rejects_expired_token() {
        let jwt = service();
        let token = jwt
            .issue_with_expiry("acct-1", "a@b.c", Role::User, Duration::seconds(-90))
            .unwrap();
        assert!(jwt.authenticate(&token).is_err());
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let token = service().issue("acct-1", "a@b.c", Role::User).unwrap();
        let other = JwtService::new(&JwtConfig {
            secret: "different-secret".to_string(),
            expiry_hours: 24,
        });
        assert!(other.authenticate(&token).is_err());
    }

    #[test]
    fn rejects_tampered_token() {
        let jwt = service();
        let mut token = jwt.issue("acct-1", "a@b.c", Role::User).unwrap();
        token.push('x');
        assert!(jwt.authenticate(&token).is_err());
    }
}
