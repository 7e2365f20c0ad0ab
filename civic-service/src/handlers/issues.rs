use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures::TryStreamExt;
use mongodb::{bson::doc, options::FindOptions};
use rand::Rng;

use civic_core::error::AppError;

use crate::{
    dtos::{
        issue::{
            IssueView, ReportIssueResponse, SolveIssueRequest, SolveIssueResponse,
            SolvedIssueView,
        },
        ErrorResponse,
    },
    models::{Issue, Role, SolvedIssue},
    utils::ValidatedJson,
    AppState,
};

const SOLVE_REWARD_POINTS: i64 = 50;

struct ReportIssueForm {
    username: String,
    title: String,
    description: String,
    location: String,
    image: Option<(String, Vec<u8>)>,
}

/// Report a new civic issue with an attached photo
#[utoipa::path(
    post,
    path = "/api/issue/report",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Issue reported", body = ReportIssueResponse),
        (status = 400, description = "Missing form fields or image", body = ErrorResponse),
        (status = 404, description = "Reporter not found", body = ErrorResponse),
        (status = 500, description = "Upload or database failure", body = ErrorResponse)
    ),
    tag = "Issues"
)]
#[tracing::instrument(skip(state, multipart))]
pub async fn report_issue(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_report_form(multipart).await?;

    let reporter = state
        .db
        .find_account_by_handle(&form.username)
        .await?
        .filter(|a| a.role == Role::User)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    let (filename, bytes) = form
        .image
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Image is required")))?;
    let image_url = state.storage.upload_image(&filename, bytes).await?;

    let issue_code = unique_issue_code(&state).await?;
    let issue = Issue::new(
        reporter.id.clone(),
        reporter.handle.clone(),
        form.title,
        form.description,
        form.location,
        image_url,
        issue_code,
    );

    state.db.issues().insert_one(&issue, None).await?;
    state
        .db
        .increment_account_counter(&reporter.id, "issue_count", 1)
        .await?;

    tracing::info!(issue_code = %issue.issue_code, reporter = %reporter.handle, "Issue reported");

    Ok((
        StatusCode::CREATED,
        Json(ReportIssueResponse {
            message: "Issue reported successfully".to_string(),
            issue: IssueView::from(&issue),
        }),
    ))
}

/// List all open issues, newest first
#[utoipa::path(
    get,
    path = "/api/issue/all",
    responses(
        (status = 200, description = "Open issues", body = [IssueView])
    ),
    tag = "Issues"
)]
#[tracing::instrument(skip(state))]
pub async fn list_issues(State(state): State<AppState>) -> Result<Json<Vec<IssueView>>, AppError> {
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();
    let issues: Vec<Issue> = state
        .db
        .issues()
        .find(doc! {}, options)
        .await?
        .try_collect()
        .await?;

    Ok(Json(issues.iter().map(IssueView::from).collect()))
}

/// List open issues reported by one user
#[utoipa::path(
    get,
    path = "/api/issue/user/{username}",
    params(("username" = String, Path, description = "Reporter's username")),
    responses(
        (status = 200, description = "The user's open issues", body = [IssueView])
    ),
    tag = "Issues"
)]
#[tracing::instrument(skip(state))]
pub async fn list_issues_by_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<IssueView>>, AppError> {
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .build();
    let issues: Vec<Issue> = state
        .db
        .issues()
        .find(doc! { "reporter_handle": username.trim() }, options)
        .await?
        .try_collect()
        .await?;

    Ok(Json(issues.iter().map(IssueView::from).collect()))
}

/// Mark an issue as solved by an organization
#[utoipa::path(
    post,
    path = "/api/issuesolved/solve",
    request_body = SolveIssueRequest,
    responses(
        (status = 200, description = "Issue marked as solved", body = SolveIssueResponse),
        (status = 400, description = "Issue already marked as solved", body = ErrorResponse),
        (status = 404, description = "Issue or organization not found", body = ErrorResponse)
    ),
    tag = "Issues"
)]
#[tracing::instrument(skip(state, req), fields(issue_code = %req.issue_code))]
pub async fn solve_issue(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SolveIssueRequest>,
) -> Result<Json<SolveIssueResponse>, AppError> {
    let issue = state
        .db
        .issues()
        .find_one(doc! { "issue_code": req.issue_code.trim() }, None)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Issue not found")))?;

    let organization = state
        .db
        .find_account_by_handle(&req.solved_by)
        .await?
        .filter(|a| a.role == Role::Organization)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Organization not found")))?;

    let already_solved = state
        .db
        .solved_issues()
        .find_one(doc! { "issue_code": &issue.issue_code }, None)
        .await?;
    if already_solved.is_some() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Issue already marked as solved."
        )));
    }

    let solved = SolvedIssue::from_issue(&issue, organization.handle.clone());
    state.db.solved_issues().insert_one(&solved, None).await?;
    state
        .db
        .issues()
        .delete_one(doc! { "_id": &issue.id }, None)
        .await?;

    state
        .db
        .increment_account_counter(&organization.id, "issues_solved", 1)
        .await?;
    state
        .db
        .increment_account_counter(&issue.reporter_id, "points", SOLVE_REWARD_POINTS)
        .await?;

    tracing::info!(
        issue_code = %solved.issue_code,
        solved_by = %solved.solved_by,
        "Issue marked as solved"
    );

    Ok(Json(SolveIssueResponse {
        message: "Issue marked as solved".to_string(),
        issue_solved: SolvedIssueView::from(&solved),
    }))
}

/// List all solved issues, most recently solved first
#[utoipa::path(
    get,
    path = "/api/issuesolved/all",
    responses(
        (status = 200, description = "Solved issues", body = [SolvedIssueView])
    ),
    tag = "Issues"
)]
#[tracing::instrument(skip(state))]
pub async fn list_solved_issues(
    State(state): State<AppState>,
) -> Result<Json<Vec<SolvedIssueView>>, AppError> {
    let options = FindOptions::builder()
        .sort(doc! { "solved_at": -1 })
        .build();
    let solved: Vec<SolvedIssue> = state
        .db
        .solved_issues()
        .find(doc! {}, options)
        .await?
        .try_collect()
        .await?;

    Ok(Json(solved.iter().map(SolvedIssueView::from).collect()))
}

async fn read_report_form(mut multipart: Multipart) -> Result<ReportIssueForm, AppError> {
    let mut username = None;
    let mut title = None;
    let mut description = None;
    let mut location = None;
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let filename = field
                    .file_name()
                    .unwrap_or("issue-image")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    AppError::BadRequest(anyhow::anyhow!("Failed to read image: {}", e))
                })?;
                image = Some((filename, bytes.to_vec()));
            }
            "username" => username = Some(read_text(field, "username").await?),
            "title" => title = Some(read_text(field, "title").await?),
            "description" => description = Some(read_text(field, "description").await?),
            "location" => location = Some(read_text(field, "location").await?),
            _ => {}
        }
    }

    Ok(ReportIssueForm {
        username: require_field(username, "username")?,
        title: require_field(title, "title")?,
        description: require_field(description, "description")?,
        location: require_field(location, "location")?,
        image,
    })
}

async fn read_text(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read {}: {}", name, e)))
}

fn require_field(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("{} is required", name)))
}

/// Six-digit code, re-rolled until it does not collide with an open
/// issue. The unique index still backstops the race on insert.
async fn unique_issue_code(state: &AppState) -> Result<String, AppError> {
    loop {
        let code = {
            let mut rng = rand::thread_rng();
            rng.gen_range(100_000..=999_999).to_string()
        };
        let exists = state
            .db
            .issues()
            .find_one(doc! { "issue_code": &code }, None)
            .await?;
        if exists.is_none() {
            return Ok(code);
        }
    }
}
