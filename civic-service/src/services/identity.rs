use civic_core::error::AppError;
use mongodb::bson::doc;

use crate::models::{Account, AuthProvider, Profile, Role};
use crate::services::MongoDb;

/// Normalized identity assertion coming back from an OAuth provider.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub provider: AuthProvider,
    pub provider_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub picture: Option<String>,
}

/// Resolves OAuth assertions onto accounts: merge into the existing
/// account that owns the email, or create a fresh, already-verified
/// one.
#[derive(Clone)]
pub struct IdentityService {
    db: MongoDb,
}

impl IdentityService {
    pub fn new(db: MongoDb) -> Self {
        Self { db }
    }

    pub async fn resolve(&self, profile: &OAuthProfile) -> Result<Account, AppError> {
        // A previously linked account wins over any email match.
        if let Some(account) = self
            .db
            .find_account_by_provider_id(profile.provider, &profile.provider_id)
            .await?
        {
            return self.merge(account, profile).await;
        }

        let email = profile
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!(
                    "{} profile did not include an email address",
                    profile.provider.as_str()
                ))
            })?
            .to_lowercase();

        match self.db.find_account_by_email(&email).await? {
            Some(account) => self.merge(account, profile).await,
            None => self.create(&email, profile).await,
        }
    }

    /// Merge an assertion into an existing account: the provider id is
    /// first-write-wins, the provider set union is idempotent, and the
    /// password and verification state are never touched.
    async fn merge(
        &self,
        mut account: Account,
        profile: &OAuthProfile,
    ) -> Result<Account, AppError> {
        let mut update = doc! {};

        if account.provider_id(profile.provider).is_none() {
            let field = provider_id_field(profile.provider)?;
            update.insert(field, profile.provider_id.clone());
            match profile.provider {
                AuthProvider::Google => account.google_id = Some(profile.provider_id.clone()),
                AuthProvider::Github => account.github_id = Some(profile.provider_id.clone()),
                AuthProvider::Local => {}
            }
        }

        let merged = merge_providers(&account.providers, profile.provider);
        if merged != account.providers {
            let value = mongodb::bson::to_bson(&merged)
                .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;
            update.insert("providers", value);
            account.providers = merged;
        }

        if let Profile::Person {
            profile_picture, ..
        } = &mut account.profile
        {
            if profile_picture.is_none() {
                if let Some(picture) = &profile.picture {
                    update.insert("profile_picture", picture.clone());
                    *profile_picture = Some(picture.clone());
                }
            }
        }

        if !update.is_empty() {
            self.db
                .update_account(&account.id, doc! { "$set": update })
                .await?;
        }

        Ok(account)
    }

    async fn create(&self, email: &str, profile: &OAuthProfile) -> Result<Account, AppError> {
        let handle = self.available_handle(&handle_base(email)).await?;

        let mut account = Account::new_person(
            Role::User,
            email.to_string(),
            handle,
            profile.first_name.clone(),
            profile.last_name.clone(),
        );
        account.providers = vec![profile.provider];
        account.verified = true;
        match profile.provider {
            AuthProvider::Google => account.google_id = Some(profile.provider_id.clone()),
            AuthProvider::Github => account.github_id = Some(profile.provider_id.clone()),
            AuthProvider::Local => {}
        }
        if let Profile::Person {
            profile_picture, ..
        } = &mut account.profile
        {
            *profile_picture = profile.picture.clone();
        }

        self.db.insert_account(&account).await?;
        tracing::info!(
            email = %account.email,
            provider = %profile.provider.as_str(),
            "Created account from OAuth profile"
        );
        Ok(account)
    }

    /// Smallest free handle in the sequence base, base1, base2, ...
    async fn available_handle(&self, base: &str) -> Result<String, AppError> {
        if self.db.find_account_by_handle(base).await?.is_none() {
            return Ok(base.to_string());
        }
        let mut suffix = 1u32;
        loop {
            let candidate = format!("{}{}", base, suffix);
            if self.db.find_account_by_handle(&candidate).await?.is_none() {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }

    /// Remove an external provider from the account. Refused when it
    /// would leave the account with no way to sign in.
    pub async fn unlink(
        &self,
        account: &Account,
        provider: AuthProvider,
    ) -> Result<Vec<AuthProvider>, AppError> {
        if !account.has_provider(provider) || account.provider_id(provider).is_none() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "{} account not linked",
                provider.as_str()
            )));
        }

        let remaining = remaining_providers(&account.providers, provider);
        if remaining.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot unlink the only sign-in method on this account"
            )));
        }

        let field = provider_id_field(provider)?;
        let value = mongodb::bson::to_bson(&remaining)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;
        self.db
            .update_account(
                &account.id,
                doc! { "$set": { "providers": value, field: null } },
            )
            .await?;

        Ok(remaining)
    }
}

fn provider_id_field(provider: AuthProvider) -> Result<&'static str, AppError> {
    match provider {
        AuthProvider::Google => Ok("google_id"),
        AuthProvider::Github => Ok("github_id"),
        AuthProvider::Local => Err(AppError::InternalError(anyhow::anyhow!(
            "local has no provider id field"
        ))),
    }
}

/// Idempotent set union that preserves the existing order.
pub fn merge_providers(existing: &[AuthProvider], add: AuthProvider) -> Vec<AuthProvider> {
    let mut merged = existing.to_vec();
    if !merged.contains(&add) {
        merged.push(add);
    }
    merged
}

pub fn remaining_providers(existing: &[AuthProvider], remove: AuthProvider) -> Vec<AuthProvider> {
    existing.iter().copied().filter(|p| *p != remove).collect()
}

/// Handle candidate derived from the email local part.
pub fn handle_base(email: &str) -> String {
    email
        .split('@')
        .next()
        .unwrap_or(email)
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_idempotent_union() {
        let base = vec![AuthProvider::Local];
        let once = merge_providers(&base, AuthProvider::Google);
        assert_eq!(once, vec![AuthProvider::Local, AuthProvider::Google]);

        let twice = merge_providers(&once, AuthProvider::Google);
        assert_eq!(twice, once);
    }

    #[test]
    fn merge_preserves_existing_order() {
        let base = vec![AuthProvider::Github, AuthProvider::Local];
        let merged = merge_providers(&base, AuthProvider::Google);
        assert_eq!(
            merged,
            vec![
                AuthProvider::Github,
                AuthProvider::Local,
                AuthProvider::Google
            ]
        );
    }

    #[test]
    fn removing_the_last_provider_leaves_empty_set() {
        let only = vec![AuthProvider::Google];
        assert!(remaining_providers(&only, AuthProvider::Google).is_empty());
    }

    #[test]
    fn removing_one_of_two_keeps_the_other() {
        let both = vec![AuthProvider::Local, AuthProvider::Github];
        assert_eq!(
            remaining_providers(&both, AuthProvider::Github),
            vec![AuthProvider::Local]
        );
    }

    #[test]
    fn handle_base_is_lowercased_local_part() {
        assert_eq!(handle_base("Jane.Doe@Example.com"), "jane.doe");
        assert_eq!(handle_base("no-at-sign"), "no-at-sign");
    }
}
