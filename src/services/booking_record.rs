use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::draft::{Address, BookingDraft, FlightDetails, PassengerDetails, ServiceType};
use crate::domain::vehicle::{Pricing, VehicleQuote};
use crate::services::{ServiceError, endpoint, read_json};

/// Lifecycle of a booking record as the booking record service tracks it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSummary {
    pub id: String,
    pub name: String,
    pub number_of_passengers: u32,
    pub number_of_big_luggage: u32,
}

impl From<&VehicleQuote> for VehicleSummary {
    fn from(vehicle: &VehicleQuote) -> Self {
        Self {
            id: vehicle.id.clone(),
            name: vehicle.name.clone(),
            number_of_passengers: vehicle.number_of_passengers,
            number_of_big_luggage: vehicle.number_of_big_luggage,
        }
    }
}

/// Every committed draft field mapped into the record service's shape.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingPayload {
    pub pickup: Address,
    pub dropoff: Address,
    pub pickup_date: Option<NaiveDate>,
    pub pickup_time: String,
    pub service_type: ServiceType,
    pub booking_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<u32>,
    pub vehicle: Option<VehicleSummary>,
    pub pricing: Option<Pricing>,
    pub journey_info: Option<Value>,
    pub passenger_details: Option<PassengerDetails>,
    pub flight_details: Option<FlightDetails>,
    pub is_airport_pickup: bool,
    pub special_instructions: String,
    pub payment_status: RecordStatus,
    pub status: RecordStatus,
}

impl BookingPayload {
    /// A new lead: everything the user has committed, not yet paid for.
    #[must_use]
    pub fn pending_lead(draft: &BookingDraft) -> Self {
        let hourly = draft.service_type == ServiceType::Hourly;
        Self {
            pickup: draft.pickup.clone(),
            dropoff: draft.effective_dropoff(),
            pickup_date: draft.pickup_date,
            pickup_time: draft.pickup_time.clone(),
            service_type: draft.service_type,
            booking_type: draft.service_type.booking_type().to_string(),
            hours: hourly.then_some(draft.hours),
            vehicle: draft.selected_vehicle.as_ref().map(VehicleSummary::from),
            pricing: draft.selected_vehicle.as_ref().map(|v| v.pricing.clone()),
            journey_info: draft.journey_info.clone(),
            passenger_details: draft.passenger_details.clone(),
            flight_details: draft.flight_details.clone(),
            is_airport_pickup: draft.is_airport_pickup(),
            special_instructions: draft.special_instructions.clone(),
            payment_status: RecordStatus::Pending,
            status: RecordStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<RecordStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
}

impl StatusUpdate {
    #[must_use]
    pub fn paid(payment_intent_id: impl Into<String>) -> Self {
        Self {
            status: None,
            payment_status: Some(RecordStatus::Paid),
            payment_intent_id: Some(payment_intent_id.into()),
        }
    }
}

#[async_trait]
pub trait BookingRecordService: Send + Sync {
    /// Creates a booking record and returns its id.
    async fn create(&self, payload: &BookingPayload) -> Result<String, ServiceError>;

    async fn update_status(&self, id: &str, update: &StatusUpdate) -> Result<(), ServiceError>;
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> Envelope<T> {
    fn rejection(&self, operation: &str) -> ServiceError {
        ServiceError::Rejected(
            self.message
                .clone()
                .unwrap_or_else(|| format!("{operation} was not successful")),
        )
    }
}

pub struct HttpBookingRecordService {
    client: Client,
    base_url: String,
}

impl HttpBookingRecordService {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BookingRecordService for HttpBookingRecordService {
    async fn create(&self, payload: &BookingPayload) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "bookings"))
            .json(payload)
            .send()
            .await?;
        let envelope: Envelope<CreatedRecord> = read_json(response).await?;
        if !envelope.success {
            return Err(envelope.rejection("create booking"));
        }
        envelope
            .data
            .map(|record| record.id)
            .ok_or_else(|| ServiceError::Decode("created booking has no id".to_string()))
    }

    async fn update_status(&self, id: &str, update: &StatusUpdate) -> Result<(), ServiceError> {
        let response = self
            .client
            .patch(endpoint(&self.base_url, &format!("bookings/{id}/status")))
            .json(update)
            .send()
            .await?;
        let envelope: Envelope<Value> = read_json(response).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(envelope.rejection("update booking status"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::draft::ContactDetails;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn hourly_draft() -> BookingDraft {
        BookingDraft {
            pickup: Address::new("10 Downing St"),
            pickup_date: NaiveDate::from_ymd_opt(2026, 11, 5),
            pickup_time: "14:00".to_string(),
            service_type: ServiceType::Hourly,
            hours: 4,
            selected_vehicle: Some(VehicleQuote {
                id: "v-7".to_string(),
                name: "Executive MPV".to_string(),
                number_of_passengers: 6,
                number_of_big_luggage: 4,
                pricing: Pricing {
                    total_price: Some(dec!(320)),
                    breakdown: serde_json::Map::new(),
                },
            }),
            passenger_details: Some(PassengerDetails {
                contact: ContactDetails {
                    first_name: "Ada".to_string(),
                    last_name: "Lovelace".to_string(),
                    email: "ada@example.com".to_string(),
                    phone: "02079460000".to_string(),
                },
                guest: None,
            }),
            ..BookingDraft::default()
        }
    }

    #[test]
    fn hourly_lead_uses_pickup_as_dropoff() {
        let payload = BookingPayload::pending_lead(&hourly_draft());

        assert_eq!(payload.dropoff.address, "10 Downing St");
        assert_eq!(payload.hours, Some(4));
        assert_eq!(payload.booking_type, "hourly");
    }

    #[test]
    fn lead_is_submitted_as_pending() {
        let body = serde_json::to_value(BookingPayload::pending_lead(&hourly_draft())).unwrap();

        assert_eq!(body["paymentStatus"], "pending");
        assert_eq!(body["status"], "pending");
        assert_eq!(body["pickupDate"], "2026-11-05");
        assert_eq!(body["vehicle"]["numberOfPassengers"], 6);
        assert_eq!(body["passengerDetails"]["firstName"], "Ada");
        assert_eq!(body["isAirportPickup"], false);
    }

    #[test]
    fn paid_update_carries_the_transaction() {
        let body = serde_json::to_value(StatusUpdate::paid("pi_123")).unwrap();

        assert_eq!(body, json!({ "paymentStatus": "paid", "paymentIntentId": "pi_123" }));
    }
}
