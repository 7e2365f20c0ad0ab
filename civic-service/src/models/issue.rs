use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reported issue. `issue_code` is the citizen-facing 6-digit
/// reference and is unique across the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "_id")]
    pub id: String,
    pub reporter_id: String,
    pub reporter_handle: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub image_url: String,
    pub issue_code: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Issue {
    pub fn new(
        reporter_id: String,
        reporter_handle: String,
        title: String,
        description: String,
        location: String,
        image_url: String,
        issue_code: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reporter_id,
            reporter_handle,
            title,
            description,
            location,
            image_url,
            issue_code,
            created_at: Utc::now(),
        }
    }
}

/// Resolution record. The issue document is copied here and deleted
/// from `issues` when an organization marks it solved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolvedIssue {
    #[serde(rename = "_id")]
    pub id: String,
    pub issue_code: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub image_url: String,
    pub reporter_id: String,
    pub reporter_handle: String,
    /// Organization handle of the solver.
    pub solved_by: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub solved_at: DateTime<Utc>,
}

impl SolvedIssue {
    pub fn from_issue(issue: &Issue, solved_by: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            issue_code: issue.issue_code.clone(),
            title: issue.title.clone(),
            description: issue.description.clone(),
            location: issue.location.clone(),
            image_url: issue.image_url.clone(),
            reporter_id: issue.reporter_id.clone(),
            reporter_handle: issue.reporter_handle.clone(),
            solved_by,
            solved_at: Utc::now(),
        }
    }
}
