use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
pub enum TransportType {
    Bus,
    Train,
    Metro,
    SharedCab,
    Car,
    Bike,
    Other,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Bus => "Bus",
            TransportType::Train => "Train",
            TransportType::Metro => "Metro",
            TransportType::SharedCab => "SharedCab",
            TransportType::Car => "Car",
            TransportType::Bike => "Bike",
            TransportType::Other => "Other",
        }
    }
}

/// A scheduled transport option published by an agency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportEntry {
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
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl TransportEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agency_name: String,
        transport_type: TransportType,
        from: String,
        to: String,
        departure_times: Vec<String>,
        frequency: Option<String>,
        fare: f64,
        contact_info: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agency_name,
            transport_type,
            from,
            to,
            departure_times,
            frequency: frequency.unwrap_or_else(|| "Not specified".to_string()),
            fare,
            contact_info: contact_info.unwrap_or_else(|| "Not provided".to_string()),
            created_at: Utc::now(),
        }
    }
}

/// Audit record of an availability search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportQueryLog {
    #[serde(rename = "_id")]
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub queried_at: DateTime<Utc>,
}

impl TransportQueryLog {
    pub fn new(from: String, to: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from,
            to,
            queried_at: Utc::now(),
        }
    }
}
