use chrono::{DateTime, Utc};
use cqrs_es::{EventEnvelope, View};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::draft::BookingDraft;
use crate::domain::events::FunnelEvent;
use crate::domain::funnel::{BookingFunnel, PaymentSession};
use crate::domain::step::WizardStep;
use crate::domain::vehicle::{CapacityFilter, VehicleQuote};

/// Metadata key carrying the commit time of an event.
pub const COMMITTED_AT: &str = "committed_at";

/// The read model handed back to the booking UI after every command.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunnelView {
    pub id: Uuid,
    pub step: WizardStep,
    pub step_label: String,
    pub draft: BookingDraft,
    pub vehicles: Vec<VehicleQuote>,
    pub quoted_journey_info: Option<Value>,
    pub capacity_filter: CapacityFilter,
    pub payment: Option<PaymentSession>,
    pub checkout_error: Option<String>,
    pub completed_booking_id: Option<String>,
    pub version: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

impl View<BookingFunnel> for FunnelView {
    fn update(&mut self, event: &EventEnvelope<BookingFunnel>) {
        self.version = event.sequence;
        if let Some(at) = event
            .metadata
            .get(COMMITTED_AT)
            .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
        {
            self.updated_at = Some(at.with_timezone(&Utc));
        }

        match &event.payload {
            FunnelEvent::Started { id } => {
                self.id = *id;
                self.move_to(WizardStep::Journey);
            }
            FunnelEvent::JourneyCaptured { journey } => {
                self.draft.capture_journey(journey.clone());
            }
            FunnelEvent::StepChanged { to, .. } => self.move_to(*to),
            FunnelEvent::QuotesLoaded {
                vehicles,
                journey_info,
            } => {
                self.vehicles.clone_from(vehicles);
                self.quoted_journey_info = Some(journey_info.clone());
            }
            FunnelEvent::CapacityFilterChanged { filter } => self.capacity_filter = *filter,
            FunnelEvent::VehicleSelected { vehicle } => {
                self.draft.selected_vehicle = Some(vehicle.clone());
            }
            FunnelEvent::VehicleDeselected => self.draft.selected_vehicle = None,
            FunnelEvent::JourneyInfoCommitted { journey_info } => {
                self.draft.journey_info.clone_from(journey_info);
            }
            FunnelEvent::DetailsCommitted {
                passenger_details,
                flight_details,
                special_instructions,
            } => {
                self.draft.passenger_details = Some(passenger_details.clone());
                self.draft.flight_details.clone_from(flight_details);
                self.draft.special_instructions.clone_from(special_instructions);
            }
            FunnelEvent::LeadCaptured { booking_id } => {
                if self.draft.saved_booking_id.is_none() {
                    self.draft.saved_booking_id = Some(booking_id.clone());
                }
                self.checkout_error = None;
            }
            FunnelEvent::PaymentIntentCreated {
                client_secret,
                is_test_mode,
                amount,
                currency,
            } => {
                self.payment = Some(PaymentSession {
                    client_secret: client_secret.clone(),
                    is_test_mode: *is_test_mode,
                    amount: *amount,
                    currency: currency.clone(),
                });
                self.checkout_error = None;
            }
            FunnelEvent::PaymentIntentFailed { reason } => {
                self.checkout_error = Some(reason.clone());
            }
            FunnelEvent::PaymentSucceeded { booking_id, .. } => {
                self.completed_booking_id = Some(booking_id.clone());
            }
            FunnelEvent::FunnelReset => {
                self.move_to(WizardStep::Journey);
                self.draft = BookingDraft::default();
                self.vehicles.clear();
                self.quoted_journey_info = None;
                self.capacity_filter = CapacityFilter::default();
                self.payment = None;
                self.checkout_error = None;
            }
        }
    }
}

impl FunnelView {
    fn move_to(&mut self, step: WizardStep) {
        self.step = step;
        self.step_label = step.label().to_string();
    }
}
