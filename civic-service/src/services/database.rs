use crate::models::{
    Account, AuthProvider, Issue, SolvedIssue, TransportEntry, TransportQueryLog,
    VerificationChallenge,
};
use civic_core::error::AppError;
use mongodb::{
    bson::{doc, to_bson, Document},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client as MongoClient, Collection, Database, IndexModel,
};

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(uri = %uri, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB at {}: {}", uri, e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    /// Uniqueness is enforced here, optimistically, never by
    /// application-level locking. Concurrent inserts race and the
    /// loser gets a duplicate-key error translated to a conflict.
    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes");

        let accounts = self.accounts();

        accounts
            .create_index(unique_index("email", false), None)
            .await?;
        accounts
            .create_index(unique_index("handle", false), None)
            .await?;
        accounts
            .create_index(unique_index("google_id", true), None)
            .await?;
        accounts
            .create_index(unique_index("github_id", true), None)
            .await?;
        tracing::info!("Created indexes on accounts.(email, handle, google_id, github_id)");

        self.issues()
            .create_index(unique_index("issue_code", false), None)
            .await?;
        self.solved_issues()
            .create_index(unique_index("issue_code", false), None)
            .await?;
        tracing::info!("Created issue_code indexes on issues and solved_issues");

        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    pub fn accounts(&self) -> Collection<Account> {
        self.db.collection("accounts")
    }

    pub fn issues(&self) -> Collection<Issue> {
        self.db.collection("issues")
    }

    pub fn solved_issues(&self) -> Collection<SolvedIssue> {
        self.db.collection("solved_issues")
    }

    pub fn transport_entries(&self) -> Collection<TransportEntry> {
        self.db.collection("transport_entries")
    }

    pub fn transport_queries(&self) -> Collection<TransportQueryLog> {
        self.db.collection("transport_queries")
    }

    pub async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let account = self
            .accounts()
            .find_one(doc! { "email": email.trim().to_lowercase() }, None)
            .await?;
        Ok(account)
    }

    pub async fn find_account_by_handle(&self, handle: &str) -> Result<Option<Account>, AppError> {
        let account = self
            .accounts()
            .find_one(doc! { "handle": handle.trim() }, None)
            .await?;
        Ok(account)
    }

    pub async fn find_account_by_id(&self, id: &str) -> Result<Option<Account>, AppError> {
        let account = self.accounts().find_one(doc! { "_id": id }, None).await?;
        Ok(account)
    }

    /// Look an account up by the external provider's subject id, via
    /// the sparse-unique `google_id`/`github_id` indexes. Local has no
    /// such id, so the lookup is always empty for it.
    pub async fn find_account_by_provider_id(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<Account>, AppError> {
        let Some(field) = provider_id_field(provider) else {
            return Ok(None);
        };
        let account = self
            .accounts()
            .find_one(doc! { field: provider_id }, None)
            .await?;
        Ok(account)
    }

    /// Insert an account, translating a duplicate-key race into a
    /// conflict that names the colliding field.
    pub async fn insert_account(&self, account: &Account) -> Result<(), AppError> {
        self.accounts()
            .insert_one(account, None)
            .await
            .map_err(|e| match duplicate_key_field(&e) {
                Some(field) => AppError::Conflict(anyhow::anyhow!(
                    "An account with this {} already exists",
                    conflict_field_label(&field)
                )),
                None => AppError::from(e),
            })?;
        Ok(())
    }

    pub async fn update_account(&self, id: &str, update: Document) -> Result<(), AppError> {
        self.accounts()
            .update_one(doc! { "_id": id }, update, None)
            .await?;
        Ok(())
    }

    pub async fn set_challenge(
        &self,
        id: &str,
        challenge: &VerificationChallenge,
    ) -> Result<(), AppError> {
        let value = to_bson(challenge)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;
        self.update_account(id, doc! { "$set": { "challenge": value } })
            .await
    }

    pub async fn mark_verified(&self, id: &str) -> Result<(), AppError> {
        self.update_account(id, doc! { "$set": { "verified": true, "challenge": null } })
            .await
    }

    /// Read-modify-write of the attempt counter. Two racing attempts
    /// may count as one; the window only ever errs in the caller's
    /// favor, which is acceptable here.
    pub async fn record_failed_otp_attempt(
        &self,
        id: &str,
        attempts: i32,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), AppError> {
        self.update_account(
            id,
            doc! { "$set": {
                "challenge.attempts": attempts,
                "challenge.last_attempt_at": mongodb::bson::DateTime::from_chrono(at),
            }},
        )
        .await
    }

    pub async fn increment_account_counter(
        &self,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<(), AppError> {
        self.update_account(id, doc! { "$inc": { field: delta } })
            .await
    }
}

fn provider_id_field(provider: AuthProvider) -> Option<&'static str> {
    match provider {
        AuthProvider::Google => Some("google_id"),
        AuthProvider::Github => Some("github_id"),
        AuthProvider::Local => None,
    }
}

fn unique_index(field: &str, sparse: bool) -> IndexModel {
    IndexModel::builder()
        .keys(doc! { field: 1 })
        .options(
            IndexOptions::builder()
                .name(format!("{}_unique", field))
                .unique(true)
                .sparse(sparse)
                .build(),
        )
        .build()
}

/// Extract the colliding field from a Mongo E11000 write error, e.g.
/// `... index: email_unique dup key: { email: "a@b.c" }` -> `email`.
pub fn duplicate_key_field(err: &mongodb::error::Error) -> Option<String> {
    if let ErrorKind::Write(WriteFailure::WriteError(write_error)) = &*err.kind {
        if write_error.code == 11000 {
            let message = &write_error.message;
            if let Some(pos) = message.find("index: ") {
                let index_name = message[pos + "index: ".len()..]
                    .split_whitespace()
                    .next()
                    .unwrap_or("");
                let field = index_name
                    .strip_suffix("_unique")
                    .or_else(|| index_name.rsplit_once('_').map(|(f, _)| f))
                    .unwrap_or(index_name);
                if !field.is_empty() {
                    return Some(field.to_string());
                }
            }
            return Some("value".to_string());
        }
    }
    None
}

fn conflict_field_label(field: &str) -> &str {
    match field {
        "handle" => "username or organization ID",
        "google_id" => "Google account",
        "github_id" => "GitHub account",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_error(code: i32, message: &str) -> mongodb::error::Error {
        let write_error: mongodb::error::WriteError =
            mongodb::bson::from_document(doc! { "code": code, "errmsg": message })
                .expect("valid WriteError document");
        ErrorKind::Write(WriteFailure::WriteError(write_error)).into()
    }

    #[test]
    fn extracts_field_from_duplicate_key_message() {
        let err = write_error(
            11000,
            "E11000 duplicate key error collection: civic.accounts index: email_unique dup key: { email: \"a@b.c\" }",
        );
        assert_eq!(duplicate_key_field(&err).as_deref(), Some("email"));
    }

    #[test]
    fn extracts_field_from_mongoose_style_index_name() {
        let err = write_error(
            11000,
            "E11000 duplicate key error collection: civic.accounts index: handle_1 dup key: { handle: \"jane\" }",
        );
        assert_eq!(duplicate_key_field(&err).as_deref(), Some("handle"));
    }

    #[test]
    fn ignores_non_duplicate_write_errors() {
        let err = write_error(121, "Document failed validation");
        assert_eq!(duplicate_key_field(&err), None);
    }

    #[test]
    fn labels_handle_conflicts_for_clients() {
        assert_eq!(conflict_field_label("handle"), "username or organization ID");
        assert_eq!(conflict_field_label("email"), "email");
    }

    #[test]
    fn provider_lookup_targets_the_sparse_id_fields() {
        assert_eq!(provider_id_field(AuthProvider::Google), Some("google_id"));
        assert_eq!(provider_id_field(AuthProvider::Github), Some("github_id"));
        assert_eq!(provider_id_field(AuthProvider::Local), None);
    }
}
