use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::vehicle::VehicleQuote;

pub const DEFAULT_HOURS: u32 = 2;

/// A postal address as chosen in the location step.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            lat: None,
            lng: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    #[default]
    Oneway,
    Hourly,
}

impl ServiceType {
    /// The booking type understood by the fare quote gateway.
    #[must_use]
    pub fn booking_type(self) -> &'static str {
        match self {
            ServiceType::Oneway => "p2p",
            ServiceType::Hourly => "hourly",
        }
    }
}

fn default_hours() -> u32 {
    DEFAULT_HOURS
}

/// Everything the location step hands over when the user asks for vehicles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JourneyDetails {
    pub pickup: Address,
    #[serde(default)]
    pub dropoff: Option<Address>,
    pub pickup_date: NaiveDate,
    pub pickup_time: String,
    #[serde(default)]
    pub service_type: ServiceType,
    #[serde(default = "default_hours")]
    pub hours: u32,
}

impl JourneyDetails {
    /// Hourly journeys carry no dropoff and at least one hour.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.service_type == ServiceType::Hourly {
            self.dropoff = None;
        }
        self.hours = self.hours.max(1);
        self
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContactDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GuestDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PassengerDetails {
    #[serde(flatten)]
    pub contact: ContactDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest: Option<GuestDetails>,
}

impl PassengerDetails {
    #[must_use]
    pub fn is_booking_for_someone_else(&self) -> bool {
        self.guest.is_some()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlightDetails {
    pub flight_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airline: Option<String>,
}

/// Every field collected across the wizard steps for a single funnel run.
///
/// Only the funnel aggregate's `apply` writes to it, so the step that owns
/// the transition is always the single writer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingDraft {
    pub pickup: Address,
    pub dropoff: Option<Address>,
    pub pickup_date: Option<NaiveDate>,
    pub pickup_time: String,
    pub service_type: ServiceType,
    pub hours: u32,
    pub selected_vehicle: Option<VehicleQuote>,
    pub journey_info: Option<Value>,
    pub passenger_details: Option<PassengerDetails>,
    pub flight_details: Option<FlightDetails>,
    pub special_instructions: String,
    pub saved_booking_id: Option<String>,
}

impl Default for BookingDraft {
    fn default() -> Self {
        Self {
            pickup: Address::default(),
            dropoff: None,
            pickup_date: None,
            pickup_time: String::new(),
            service_type: ServiceType::default(),
            hours: DEFAULT_HOURS,
            selected_vehicle: None,
            journey_info: None,
            passenger_details: None,
            flight_details: None,
            special_instructions: String::new(),
            saved_booking_id: None,
        }
    }
}

impl BookingDraft {
    pub(crate) fn capture_journey(&mut self, journey: JourneyDetails) {
        self.pickup = journey.pickup;
        self.dropoff = journey.dropoff;
        self.pickup_date = Some(journey.pickup_date);
        self.pickup_time = journey.pickup_time;
        self.service_type = journey.service_type;
        self.hours = journey.hours;
    }

    /// The journey as last captured, if the location step has been completed.
    #[must_use]
    pub fn journey(&self) -> Option<JourneyDetails> {
        let pickup_date = self.pickup_date?;
        Some(JourneyDetails {
            pickup: self.pickup.clone(),
            dropoff: self.dropoff.clone(),
            pickup_date,
            pickup_time: self.pickup_time.clone(),
            service_type: self.service_type,
            hours: self.hours,
        })
    }

    /// The dropoff the booking record service should receive. Hourly bookings
    /// end where they started.
    #[must_use]
    pub fn effective_dropoff(&self) -> Address {
        match (self.service_type, &self.dropoff) {
            (ServiceType::Oneway, Some(dropoff)) => dropoff.clone(),
            (ServiceType::Hourly, _) => self.pickup.clone(),
            (ServiceType::Oneway, None) => Address::default(),
        }
    }

    #[must_use]
    pub fn total_price(&self) -> Option<Decimal> {
        self.selected_vehicle
            .as_ref()
            .and_then(|vehicle| vehicle.pricing.total_price)
    }

    #[must_use]
    pub fn is_airport_pickup(&self) -> bool {
        self.flight_details.is_some()
    }
}
