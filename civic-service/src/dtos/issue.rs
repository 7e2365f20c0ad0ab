use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{Issue, SolvedIssue};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueView {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub image: String,
    pub issue_code: String,
}

impl From<&Issue> for IssueView {
    fn from(issue: &Issue) -> Self {
        Self {
            id: issue.id.clone(),
            username: issue.reporter_handle.clone(),
            title: issue.title.clone(),
            description: issue.description.clone(),
            location: issue.location.clone(),
            image: issue.image_url.clone(),
            issue_code: issue.issue_code.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportIssueResponse {
    pub message: String,
    pub issue: IssueView,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolveIssueRequest {
    #[validate(length(min = 1, message = "issueCode is required"))]
    #[schema(example = "482913")]
    pub issue_code: String,

    /// Organization handle of the solver.
    #[validate(length(min = 1, message = "solvedBy is required"))]
    #[schema(example = "metro-01")]
    pub solved_by: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolvedIssueView {
    #[serde(rename = "_id")]
    pub id: String,
    pub issue_code: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub image: String,
    pub username: String,
    pub solved_by: String,
    pub solved_at: chrono::DateTime<chrono::Utc>,
}

impl From<&SolvedIssue> for SolvedIssueView {
    fn from(solved: &SolvedIssue) -> Self {
        Self {
            id: solved.id.clone(),
            issue_code: solved.issue_code.clone(),
            title: solved.title.clone(),
            description: solved.description.clone(),
            location: solved.location.clone(),
            image: solved.image_url.clone(),
            username: solved.reporter_handle.clone(),
            solved_by: solved.solved_by.clone(),
            solved_at: solved.solved_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolveIssueResponse {
    pub message: String,
    pub issue_solved: SolvedIssueView,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankedUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub points: i64,
    pub issue_count: i64,
    pub score: f64,
    pub rank: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankedOrganization {
    pub rank: usize,
    pub organization_name: String,
    pub organization_id: String,
    pub issues_solved: i64,
    pub email: String,
    pub phone: String,
}
