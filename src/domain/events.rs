use std::fmt;

use cqrs_es::DomainEvent;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::draft::{FlightDetails, JourneyDetails, PassengerDetails};
use crate::domain::step::WizardStep;
use crate::domain::vehicle::{CapacityFilter, VehicleQuote};

/// Secret handed to the payment widget. Kept out of logs.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ClientSecret(String);

impl ClientSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret(***)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FunnelEvent {
    Started {
        id: Uuid,
    },
    JourneyCaptured {
        journey: JourneyDetails,
    },
    StepChanged {
        from: WizardStep,
        to: WizardStep,
    },
    QuotesLoaded {
        vehicles: Vec<VehicleQuote>,
        journey_info: Value,
    },
    CapacityFilterChanged {
        filter: CapacityFilter,
    },
    VehicleSelected {
        vehicle: VehicleQuote,
    },
    VehicleDeselected,
    JourneyInfoCommitted {
        journey_info: Option<Value>,
    },
    DetailsCommitted {
        passenger_details: PassengerDetails,
        flight_details: Option<FlightDetails>,
        special_instructions: String,
    },
    LeadCaptured {
        booking_id: String,
    },
    PaymentIntentCreated {
        client_secret: ClientSecret,
        is_test_mode: bool,
        amount: Decimal,
        currency: String,
    },
    PaymentIntentFailed {
        reason: String,
    },
    PaymentSucceeded {
        booking_id: String,
        payment_intent_id: String,
    },
    FunnelReset,
}

impl FunnelEvent {
    /// Facts that must survive even when the command that produced them
    /// completes after the user has moved on: a lead that exists server side
    /// and a payment the provider has already taken.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        matches!(
            self,
            FunnelEvent::LeadCaptured { .. }
                | FunnelEvent::PaymentSucceeded { .. }
                | FunnelEvent::FunnelReset
        )
    }
}

impl DomainEvent for FunnelEvent {
    fn event_type(&self) -> String {
        let event_type: &str = match self {
            FunnelEvent::Started { .. } => "FunnelStarted",
            FunnelEvent::JourneyCaptured { .. } => "JourneyCaptured",
            FunnelEvent::StepChanged { .. } => "StepChanged",
            FunnelEvent::QuotesLoaded { .. } => "QuotesLoaded",
            FunnelEvent::CapacityFilterChanged { .. } => "CapacityFilterChanged",
            FunnelEvent::VehicleSelected { .. } => "VehicleSelected",
            FunnelEvent::VehicleDeselected => "VehicleDeselected",
            FunnelEvent::JourneyInfoCommitted { .. } => "JourneyInfoCommitted",
            FunnelEvent::DetailsCommitted { .. } => "DetailsCommitted",
            FunnelEvent::LeadCaptured { .. } => "LeadCaptured",
            FunnelEvent::PaymentIntentCreated { .. } => "PaymentIntentCreated",
            FunnelEvent::PaymentIntentFailed { .. } => "PaymentIntentFailed",
            FunnelEvent::PaymentSucceeded { .. } => "PaymentSucceeded",
            FunnelEvent::FunnelReset => "FunnelReset",
        };
        event_type.to_string()
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
