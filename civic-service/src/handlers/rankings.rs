use axum::{extract::State, Json};
use futures::TryStreamExt;
use mongodb::bson::doc;

use civic_core::error::AppError;

use crate::{
    dtos::issue::{RankedOrganization, RankedUser},
    models::{Account, Profile},
    AppState,
};

/// Ranking weights: earned points dominate, volume of reports still
/// counts for something.
const POINTS_WEIGHT: f64 = 0.7;
const ISSUE_COUNT_WEIGHT: f64 = 0.3;

/// Users ranked by contribution score
#[utoipa::path(
    get,
    path = "/api/userrank/all",
    responses(
        (status = 200, description = "Users in rank order", body = [RankedUser])
    ),
    tag = "Rankings"
)]
#[tracing::instrument(skip(state))]
pub async fn user_rankings(State(state): State<AppState>) -> Result<Json<Vec<RankedUser>>, AppError> {
    let users: Vec<Account> = state
        .db
        .accounts()
        .find(doc! { "role": "user" }, None)
        .await?
        .try_collect()
        .await?;

    Ok(Json(rank_users(&users)))
}

/// Organizations ranked by issues solved
#[utoipa::path(
    get,
    path = "/api/organizationrank/all",
    responses(
        (status = 200, description = "Organizations in rank order", body = [RankedOrganization])
    ),
    tag = "Rankings"
)]
#[tracing::instrument(skip(state))]
pub async fn organization_rankings(
    State(state): State<AppState>,
) -> Result<Json<Vec<RankedOrganization>>, AppError> {
    let organizations: Vec<Account> = state
        .db
        .accounts()
        .find(doc! { "role": "organization" }, None)
        .await?
        .try_collect()
        .await?;

    Ok(Json(rank_organizations(&organizations)))
}

fn rank_users(accounts: &[Account]) -> Vec<RankedUser> {
    let mut ranked: Vec<RankedUser> = accounts
        .iter()
        .filter_map(|account| match &account.profile {
            Profile::Person {
                points,
                issue_count,
                ..
            } => Some(RankedUser {
                id: account.id.clone(),
                username: account.handle.clone(),
                points: *points,
                issue_count: *issue_count,
                score: contribution_score(*points, *issue_count),
                rank: 0,
            }),
            Profile::Organization { .. } => None,
        })
        .collect();

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    for (index, user) in ranked.iter_mut().enumerate() {
        user.rank = index + 1;
    }
    ranked
}

fn rank_organizations(accounts: &[Account]) -> Vec<RankedOrganization> {
    let mut ranked: Vec<RankedOrganization> = accounts
        .iter()
        .filter_map(|account| match &account.profile {
            Profile::Organization {
                name,
                phone,
                issues_solved,
                ..
            } => Some(RankedOrganization {
                rank: 0,
                organization_name: name.clone(),
                organization_id: account.handle.clone(),
                issues_solved: *issues_solved,
                email: account.email.clone(),
                phone: phone.clone(),
            }),
            Profile::Person { .. } => None,
        })
        .collect();

    ranked.sort_by(|a, b| b.issues_solved.cmp(&a.issues_solved));
    for (index, organization) in ranked.iter_mut().enumerate() {
        organization.rank = index + 1;
    }
    ranked
}

fn contribution_score(points: i64, issue_count: i64) -> f64 {
    points as f64 * POINTS_WEIGHT + issue_count as f64 * ISSUE_COUNT_WEIGHT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn user(handle: &str, points: i64, issue_count: i64) -> Account {
        let mut account = Account::new_person(
            Role::User,
            format!("{handle}@example.com"),
            handle.to_string(),
            None,
            None,
        );
        if let Profile::Person {
            points: p,
            issue_count: c,
            ..
        } = &mut account.profile
        {
            *p = points;
            *c = issue_count;
        }
        account
    }

    fn organization(handle: &str, issues_solved: i64) -> Account {
        let mut account = Account::new_organization(
            format!("{handle}@example.com"),
            handle.to_string(),
            handle.to_uppercase(),
            "1 Depot Road".to_string(),
            "5551234567".to_string(),
            vec![],
        );
        if let Profile::Organization {
            issues_solved: s, ..
        } = &mut account.profile
        {
            *s = issues_solved;
        }
        account
    }

    #[test]
    fn score_weighs_points_over_issue_count() {
        assert_eq!(contribution_score(100, 10), 73.0);
        assert_eq!(contribution_score(0, 0), 0.0);
    }

    #[test]
    fn users_ranked_by_score_descending() {
        let accounts = vec![user("low", 10, 1), user("high", 200, 4), user("mid", 50, 20)];
        let ranked = rank_users(&accounts);

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].username, "high");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].username, "mid");
        assert_eq!(ranked[2].username, "low");
        assert_eq!(ranked[2].rank, 3);
    }

    #[test]
    fn organization_accounts_are_excluded_from_user_ranking() {
        let accounts = vec![user("jane", 10, 1), organization("metro-01", 99)];
        let ranked = rank_users(&accounts);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].username, "jane");
    }

    #[test]
    fn organizations_ranked_by_issues_solved() {
        let accounts = vec![organization("a", 2), organization("b", 7), organization("c", 0)];
        let ranked = rank_organizations(&accounts);

        assert_eq!(ranked[0].organization_id, "b");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[2].organization_id, "c");
        assert_eq!(ranked[2].rank, 3);
    }
}
