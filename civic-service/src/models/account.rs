use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::transport::TransportType;

/// Immutable account role, fixed at signup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Organization,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Organization => "organization",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "organization" => Ok(Role::Organization),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    Google,
    Github,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::Google => "google",
            AuthProvider::Github => "github",
        }
    }
}

/// Pending email-verification state. The OTP is the primary channel;
/// the long random token backs the emailed deep link. Both are cleared
/// together on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationChallenge {
    pub otp: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub otp_expires_at: DateTime<Utc>,
    pub token: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub token_expires_at: DateTime<Utc>,
    pub attempts: i32,
    pub last_attempt_at: Option<mongodb::bson::DateTime>,
}

impl VerificationChallenge {
    pub fn last_attempt_utc(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at.map(|dt| dt.to_chrono())
    }
}

/// Role-specific profile payload, tagged by `kind` in the stored
/// document. Users and admins share the person shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Profile {
    Person {
        first_name: Option<String>,
        last_name: Option<String>,
        profile_picture: Option<String>,
        issue_count: i64,
        points: i64,
    },
    Organization {
        name: String,
        address: String,
        phone: String,
        transport_types: Vec<TransportType>,
        issues_solved: i64,
    },
}

/// One account document for every role. `handle` is the public
/// identifier: the username for people, the organization id for
/// organizations. Uniqueness of `email`, `handle` and the provider ids
/// is enforced by the collection's indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub handle: String,
    pub role: Role,
    pub password_hash: Option<String>,
    pub providers: Vec<AuthProvider>,
    pub google_id: Option<String>,
    pub github_id: Option<String>,
    pub verified: bool,
    pub challenge: Option<VerificationChallenge>,
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new_person(
        role: Role,
        email: String,
        handle: String,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_lowercase(),
            handle,
            role,
            password_hash: None,
            providers: Vec::new(),
            google_id: None,
            github_id: None,
            verified: false,
            challenge: None,
            profile: Profile::Person {
                first_name,
                last_name,
                profile_picture: None,
                issue_count: 0,
                points: 0,
            },
            created_at: Utc::now(),
        }
    }

    pub fn new_organization(
        email: String,
        handle: String,
        name: String,
        address: String,
        phone: String,
        transport_types: Vec<TransportType>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_lowercase(),
            handle,
            role: Role::Organization,
            password_hash: None,
            providers: Vec::new(),
            google_id: None,
            github_id: None,
            verified: false,
            challenge: None,
            profile: Profile::Organization {
                name,
                address,
                phone,
                transport_types,
                issues_solved: 0,
            },
            created_at: Utc::now(),
        }
    }

    pub fn has_provider(&self, provider: AuthProvider) -> bool {
        self.providers.contains(&provider)
    }

    pub fn provider_id(&self, provider: AuthProvider) -> Option<&str> {
        match provider {
            AuthProvider::Google => self.google_id.as_deref(),
            AuthProvider::Github => self.github_id.as_deref(),
            AuthProvider::Local => None,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.profile {
            Profile::Person { first_name, .. } => first_name
                .clone()
                .unwrap_or_else(|| self.handle.clone()),
            Profile::Organization { name, .. } => name.clone(),
        }
    }

    pub fn sanitized(&self) -> PublicAccount {
        let (first_name, last_name, profile_picture, issue_count, points) = match &self.profile {
            Profile::Person {
                first_name,
                last_name,
                profile_picture,
                issue_count,
                points,
            } => (
                first_name.clone(),
                last_name.clone(),
                profile_picture.clone(),
                Some(*issue_count),
                Some(*points),
            ),
            Profile::Organization { .. } => (None, None, None, None, None),
        };

        let (name, address, phone, transport_types, issues_solved) = match &self.profile {
            Profile::Organization {
                name,
                address,
                phone,
                transport_types,
                issues_solved,
            } => (
                Some(name.clone()),
                Some(address.clone()),
                Some(phone.clone()),
                Some(transport_types.clone()),
                Some(*issues_solved),
            ),
            Profile::Person { .. } => (None, None, None, None, None),
        };

        PublicAccount {
            id: self.id.clone(),
            email: self.email.clone(),
            handle: self.handle.clone(),
            role: self.role,
            providers: self.providers.clone(),
            verified: self.verified,
            first_name,
            last_name,
            profile_picture,
            issue_count,
            points,
            name,
            address,
            phone,
            transport_types,
            issues_solved,
        }
    }
}

/// Account view returned to clients. Never carries the password hash or
/// the pending challenge.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccount {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    pub handle: String,
    pub role: Role,
    pub providers: Vec<AuthProvider>,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_types: Option<Vec<TransportType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues_solved: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_account_starts_unverified_with_empty_providers() {
        let account = Account::new_person(
            Role::User,
            "Jane@Example.com".to_string(),
            "jane".to_string(),
            Some("Jane".to_string()),
            Some("Doe".to_string()),
        );

        assert!(!account.verified);
        assert!(account.providers.is_empty());
        assert_eq!(account.email, "jane@example.com");
        assert!(account.challenge.is_none());
    }

    #[test]
    fn sanitized_person_hides_credentials_and_org_fields() {
        let mut account = Account::new_person(
            Role::User,
            "jane@example.com".to_string(),
            "jane".to_string(),
            Some("Jane".to_string()),
            None,
        );
        account.password_hash = Some("$argon2id$...".to_string());

        let public = account.sanitized();
        assert_eq!(public.handle, "jane");
        assert_eq!(public.issue_count, Some(0));
        assert!(public.name.is_none());
        assert!(public.transport_types.is_none());

        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("challenge").is_none());
    }

    #[test]
    fn profile_round_trips_through_bson_with_kind_tag() {
        let account = Account::new_organization(
            "metro@example.com".to_string(),
            "metro-01".to_string(),
            "Metro Transit".to_string(),
            "1 Depot Road".to_string(),
            "5551234567".to_string(),
            vec![TransportType::Bus, TransportType::Metro],
        );

        let doc = mongodb::bson::to_document(&account).unwrap();
        assert_eq!(doc.get_str("kind").unwrap(), "organization");

        let back: Account = mongodb::bson::from_document(doc).unwrap();
        match back.profile {
            Profile::Organization { issues_solved, .. } => assert_eq!(issues_solved, 0),
            _ => panic!("expected organization profile"),
        }
    }
}
