use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::draft::{JourneyDetails, ServiceType};
use crate::domain::vehicle::VehicleQuote;
use crate::services::{ServiceError, endpoint, read_json};

/// Search request in the shape the fare quote gateway expects.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub pickup_address: String,
    pub dropoff_address: Option<String>,
    pub pickup_date: String,
    pub pickup_time: String,
    pub booking_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<u32>,
}

impl QuoteRequest {
    #[must_use]
    pub fn for_journey(journey: &JourneyDetails) -> Self {
        let hourly = journey.service_type == ServiceType::Hourly;
        Self {
            pickup_address: journey.pickup.address.clone(),
            dropoff_address: if hourly {
                None
            } else {
                journey.dropoff.as_ref().map(|d| d.address.clone())
            },
            pickup_date: journey.pickup_date.format("%Y-%m-%d").to_string(),
            pickup_time: journey.pickup_time.clone(),
            booking_type: journey.service_type.booking_type().to_string(),
            hours: hourly.then_some(journey.hours),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct QuoteResponse {
    #[serde(default)]
    pub data: Vec<VehicleQuote>,
    /// Distance/duration metadata, passed through untouched.
    #[serde(default)]
    pub journey: Value,
}

#[async_trait]
pub trait FareQuoteGateway: Send + Sync {
    async fn search(&self, request: &QuoteRequest) -> Result<QuoteResponse, ServiceError>;
}

pub struct HttpFareQuoteGateway {
    client: Client,
    base_url: String,
}

impl HttpFareQuoteGateway {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl FareQuoteGateway for HttpFareQuoteGateway {
    async fn search(&self, request: &QuoteRequest) -> Result<QuoteResponse, ServiceError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "vehicles/search"))
            .json(request)
            .send()
            .await?;
        read_json(response).await
    }
}
