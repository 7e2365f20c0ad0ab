use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};

use civic_core::error::AppError;

use crate::{
    dtos::{
        transport::{
            AgencyStats, AgencyTransportsResponse, AvailabilityRequest, AvailabilityResponse,
            CreateTransportEntryRequest, CreateTransportEntryResponse, RouteStat, SearchTerms,
            TransportEntryView,
        },
        ErrorResponse,
    },
    models::{TransportEntry, TransportQueryLog, TransportType},
    utils::ValidatedJson,
    AppState,
};

/// Publish a transport route entry
#[utoipa::path(
    post,
    path = "/api/entry/create",
    request_body = CreateTransportEntryRequest,
    responses(
        (status = 201, description = "Transport option created", body = CreateTransportEntryResponse),
        (status = 400, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Transport"
)]
#[tracing::instrument(skip(state, req), fields(agency = %req.agency_name))]
pub async fn create_entry(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateTransportEntryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = TransportEntry::new(
        req.agency_name.trim().to_string(),
        req.transport_type,
        req.from.trim().to_string(),
        req.to.trim().to_string(),
        req.departure_times,
        req.frequency,
        req.fare,
        req.contact_info,
    );

    state.db.transport_entries().insert_one(&entry, None).await?;
    tracing::info!(agency = %entry.agency_name, from = %entry.from, to = %entry.to, "Transport entry created");

    Ok((
        StatusCode::CREATED,
        Json(CreateTransportEntryResponse {
            message: "Transport option created successfully.".to_string(),
            data: TransportEntryView::from(&entry),
        }),
    ))
}

/// List every published transport entry
#[utoipa::path(
    get,
    path = "/api/entry/all",
    responses(
        (status = 200, description = "All transport entries", body = [TransportEntryView])
    ),
    tag = "Transport"
)]
#[tracing::instrument(skip(state))]
pub async fn list_entries(
    State(state): State<AppState>,
) -> Result<Json<Vec<TransportEntryView>>, AppError> {
    let entries: Vec<TransportEntry> = state
        .db
        .transport_entries()
        .find(doc! {}, None)
        .await?
        .try_collect()
        .await?;

    Ok(Json(entries.iter().map(TransportEntryView::from).collect()))
}

/// An agency's entries together with per-type and per-route statistics
#[utoipa::path(
    get,
    path = "/api/entry/agency/{agency_name}",
    params(("agency_name" = String, Path, description = "Agency to report on")),
    responses(
        (status = 200, description = "Entries and statistics", body = AgencyTransportsResponse)
    ),
    tag = "Transport"
)]
#[tracing::instrument(skip(state))]
pub async fn entries_by_agency(
    State(state): State<AppState>,
    Path(agency_name): Path<String>,
) -> Result<Json<AgencyTransportsResponse>, AppError> {
    let entries: Vec<TransportEntry> = state
        .db
        .transport_entries()
        .find(doc! { "agency_name": agency_name.trim() }, None)
        .await?
        .try_collect()
        .await?;

    let stats = agency_stats(&entries);
    Ok(Json(AgencyTransportsResponse {
        entries: entries.iter().map(TransportEntryView::from).collect(),
        stats,
    }))
}

/// Search available transport between two places.
///
/// The search degrades in stages: exact endpoints first, then partial
/// matches in either direction, then anything touching either place.
#[utoipa::path(
    post,
    path = "/api/query/availability",
    request_body = AvailabilityRequest,
    responses(
        (status = 200, description = "Matching routes, possibly empty", body = AvailabilityResponse),
        (status = 400, description = "Missing from/to", body = ErrorResponse)
    ),
    tag = "Transport"
)]
#[tracing::instrument(skip(state, req), fields(from = %req.from, to = %req.to))]
pub async fn check_availability(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<AvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let from = req.from.trim().to_string();
    let to = req.to.trim().to_string();

    // Every query is recorded, found or not.
    let log = TransportQueryLog::new(from.clone(), to.clone());
    state.db.transport_queries().insert_one(&log, None).await?;

    let mut exact = true;
    let mut results = find_entries(&state, exact_filter(&from, &to)).await?;

    if results.is_empty() {
        exact = false;
        results = find_entries(&state, partial_filter(&from, &to)).await?;
    }

    if let Some(transport_type) = req.transport_type {
        results.retain(|entry| entry.transport_type == transport_type);
    }

    if results.is_empty() {
        exact = false;
        results = find_entries(&state, loose_filter(&from, &to)).await?;
        if let Some(transport_type) = req.transport_type {
            results.retain(|entry| entry.transport_type == transport_type);
        }
    }

    let message = if exact && !results.is_empty() {
        "Transport options found."
    } else {
        "No exact matches found. Showing related routes."
    };

    Ok(Json(AvailabilityResponse {
        message: message.to_string(),
        data: results.iter().map(TransportEntryView::from).collect(),
        search_terms: SearchTerms { from, to },
    }))
}

async fn find_entries(state: &AppState, filter: Document) -> Result<Vec<TransportEntry>, AppError> {
    let entries = state
        .db
        .transport_entries()
        .find(filter, None)
        .await?
        .try_collect()
        .await?;
    Ok(entries)
}

fn exact_filter(from: &str, to: &str) -> Document {
    doc! {
        "from": anchored_regex(from),
        "to": anchored_regex(to),
    }
}

fn partial_filter(from: &str, to: &str) -> Document {
    doc! {
        "$or": [
            { "from": contains_regex(from), "to": contains_regex(to) },
            { "from": contains_regex(to), "to": contains_regex(from) },
        ]
    }
}

fn loose_filter(from: &str, to: &str) -> Document {
    doc! {
        "$or": [
            { "from": contains_regex(from) },
            { "to": contains_regex(to) },
            { "from": contains_regex(to) },
            { "to": contains_regex(from) },
        ]
    }
}

fn anchored_regex(term: &str) -> Document {
    doc! { "$regex": format!("^{}$", escape_regex(term)), "$options": "i" }
}

fn contains_regex(term: &str) -> Document {
    doc! { "$regex": escape_regex(term), "$options": "i" }
}

/// Search terms are user input, not patterns.
fn escape_regex(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if ".^$*+?()[]{}|\\".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn agency_stats(entries: &[TransportEntry]) -> AgencyStats {
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut routes: Vec<RouteStat> = Vec::new();

    for entry in entries {
        *by_type
            .entry(entry.transport_type.as_str().to_string())
            .or_insert(0) += 1;

        let route = format!("{} -> {}", entry.from, entry.to);
        match routes.iter_mut().find(|r| r.route == route) {
            Some(existing) => existing.count += 1,
            None => routes.push(RouteStat {
                route,
                from: entry.from.clone(),
                to: entry.to.clone(),
                transport_type: entry.transport_type,
                count: 1,
            }),
        }
    }

    AgencyStats {
        total: entries.len(),
        total_routes: routes.len(),
        by_type,
        routes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(transport_type: TransportType, from: &str, to: &str) -> TransportEntry {
        TransportEntry::new(
            "Metro Transit".to_string(),
            transport_type,
            from.to_string(),
            to.to_string(),
            vec!["08:00".to_string()],
            None,
            2.5,
            None,
        )
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert_eq!(escape_regex("St. John's (West)"), "St\\. John's \\(West\\)");
        assert_eq!(escape_regex("plain"), "plain");
    }

    #[test]
    fn exact_filter_anchors_both_terms() {
        let filter = exact_filter("Central", "Airport");
        let from = filter.get_document("from").unwrap();
        assert_eq!(from.get_str("$regex").unwrap(), "^Central$");
        assert_eq!(from.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn stats_count_types_and_deduplicate_routes() {
        let entries = vec![
            entry(TransportType::Bus, "A", "B"),
            entry(TransportType::Bus, "A", "B"),
            entry(TransportType::Train, "A", "C"),
        ];
        let stats = agency_stats(&entries);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_type.get("Bus"), Some(&2));
        assert_eq!(stats.by_type.get("Train"), Some(&1));
        assert_eq!(stats.total_routes, 2);
        assert_eq!(stats.routes[0].count, 2);
    }

    #[test]
    fn stats_for_no_entries_are_empty() {
        let stats = agency_stats(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.total_routes, 0);
        assert!(stats.by_type.is_empty());
        assert!(stats.routes.is_empty());
    }
}
