use async_trait::async_trait;
use chrono::Utc;
use civic_core::error::AppError;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::StorageConfig;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload an image and return its public HTTPS URL.
    async fn upload_image(&self, filename: &str, bytes: Vec<u8>) -> Result<String, AppError>;
}

/// Cloudinary-compatible upload sink using signed multipart requests.
pub struct CloudinaryStorage {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl CloudinaryStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            folder: config.folder.clone(),
        }
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        )
    }
}

/// Signature over the alphabetically ordered parameters, per the
/// upload API contract: sha256(folder=F&timestamp=T + secret), hex.
pub fn upload_signature(folder: &str, timestamp: i64, api_secret: &str) -> String {
    let to_sign = format!("folder={}&timestamp={}{}", folder, timestamp, api_secret);
    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ObjectStorage for CloudinaryStorage {
    async fn upload_image(&self, filename: &str, bytes: Vec<u8>) -> Result<String, AppError> {
        let timestamp = Utc::now().timestamp();
        let signature = upload_signature(&self.folder, timestamp, &self.api_secret);

        let file_part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("folder", self.folder.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Image upload request failed");
                AppError::InternalError(anyhow::anyhow!("Image upload failed"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Image upload rejected");
            return Err(AppError::InternalError(anyhow::anyhow!(
                "Image upload failed"
            )));
        }

        let uploaded: UploadResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse upload response");
            AppError::InternalError(anyhow::anyhow!("Image upload failed"))
        })?;

        Ok(uploaded.secure_url)
    }
}

/// Stand-in used when no storage credentials are configured. Uploads
/// fail with a client-visible error; startup only warns outside
/// production.
pub struct UnconfiguredStorage;

#[async_trait]
impl ObjectStorage for UnconfiguredStorage {
    async fn upload_image(&self, _filename: &str, _bytes: Vec<u8>) -> Result<String, AppError> {
        Err(AppError::BadRequest(anyhow::anyhow!(
            "Image storage is not configured"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_sha256_of_sorted_params_and_secret() {
        // sha256("folder=civic_issues&timestamp=1700000000secret")
        let sig = upload_signature("civic_issues", 1_700_000_000, "secret");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        // Deterministic for fixed inputs
        assert_eq!(sig, upload_signature("civic_issues", 1_700_000_000, "secret"));
        // Sensitive to every input
        assert_ne!(sig, upload_signature("other", 1_700_000_000, "secret"));
        assert_ne!(sig, upload_signature("civic_issues", 1_700_000_001, "secret"));
        assert_ne!(sig, upload_signature("civic_issues", 1_700_000_000, "other"));
    }
}
