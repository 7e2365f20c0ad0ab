use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{TransportEntry, TransportType};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportEntryRequest {
    #[validate(length(min = 1, message = "Agency name is required"))]
    #[schema(example = "Metro Transit")]
    pub agency_name: String,

    pub transport_type: TransportType,

    #[validate(length(min = 1, message = "From is required"))]
    #[schema(example = "Central Station")]
    pub from: String,

    #[validate(length(min = 1, message = "To is required"))]
    #[schema(example = "Airport")]
    pub to: String,

    #[validate(length(min = 1, message = "departureTimes must be a non-empty array"))]
    pub departure_times: Vec<String>,

    #[schema(example = "Every 30 minutes")]
    pub frequency: Option<String>,

    #[schema(example = 2.5)]
    pub fare: f64,

    #[schema(example = "+1 555 123 4567")]
    pub contact_info: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransportEntryView {
    #[serde(rename = "_id")]
    pub id: String,
    pub agency_name: String,
    pub transport_type: TransportType,
    pub from: String,
    pub to: String,
    pub departure_times: Vec<String>,
    pub frequency: String,
    pub fare: f64,
    pub contact_info: String,
}

impl From<&TransportEntry> for TransportEntryView {
    fn from(entry: &TransportEntry) -> Self {
        Self {
            id: entry.id.clone(),
            agency_name: entry.agency_name.clone(),
            transport_type: entry.transport_type,
            from: entry.from.clone(),
            to: entry.to.clone(),
            departure_times: entry.departure_times.clone(),
            frequency: entry.frequency.clone(),
            fare: entry.fare,
            contact_info: entry.contact_info.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportEntryResponse {
    pub message: String,
    pub data: TransportEntryView,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    #[validate(length(min = 1, message = "Both from and to are required"))]
    #[schema(example = "Central Station")]
    pub from: String,

    #[validate(length(min = 1, message = "Both from and to are required"))]
    #[schema(example = "Airport")]
    pub to: String,

    #[schema(example = "Bus")]
    pub transport_type: Option<TransportType>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchTerms {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub message: String,
    pub data: Vec<TransportEntryView>,
    pub search_terms: SearchTerms,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteStat {
    pub route: String,
    pub from: String,
    pub to: String,
    pub transport_type: TransportType,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgencyStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub routes: Vec<RouteStat>,
    pub total_routes: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgencyTransportsResponse {
    pub entries: Vec<TransportEntryView>,
    pub stats: AgencyStats,
}
