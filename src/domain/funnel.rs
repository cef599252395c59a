use std::sync::Arc;

use async_trait::async_trait;
use cqrs_es::Aggregate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PaymentSettings;
use crate::domain::commands::FunnelCommand;
use crate::domain::draft::{BookingDraft, JourneyDetails};
use crate::domain::events::{ClientSecret, FunnelEvent};
use crate::domain::step::WizardStep;
use crate::domain::validation::{ErrorMap, PassengerForm, validate};
use crate::domain::vehicle::{
    CapacityBounds, CapacityFilter, VehicleOption, VehicleQuote, capacity_bounds,
    filter_by_capacity,
};
use crate::services::booking_record::{BookingPayload, BookingRecordService};
use crate::services::fare_quote::{FareQuoteGateway, QuoteRequest};
use crate::services::payment_confirmation::PaymentConfirmer;
use crate::services::payment_intent::{PaymentIntentRequest, PaymentIntentService};
use crate::services::reconciliation::ReconciliationQueue;

/// One run through the booking wizard: the visible step, the draft being
/// built up, and the payment session once one exists.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BookingFunnel {
    id: Uuid,
    step: WizardStep,
    draft: BookingDraft,
    vehicles: Vec<VehicleQuote>,
    quoted_journey_info: Option<Value>,
    capacity_filter: CapacityFilter,
    payment: Option<PaymentSession>,
    checkout_error: Option<String>,
    completed_booking_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub client_secret: ClientSecret,
    pub is_test_mode: bool,
    pub amount: Decimal,
    pub currency: String,
}

#[async_trait]
impl Aggregate for BookingFunnel {
    type Command = FunnelCommand;
    type Event = FunnelEvent;
    type Error = FunnelError;
    type Services = FunnelServices;

    fn aggregate_type() -> String {
        "BookingFunnel".to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        if let FunnelCommand::Start { id } = command {
            return if self.id == Uuid::default() {
                Ok(vec![FunnelEvent::Started { id }])
            } else {
                Err(FunnelError::AlreadyStarted)
            };
        }
        if self.id == Uuid::default() {
            return Err(FunnelError::NotFound);
        }

        match command {
            FunnelCommand::Start { .. } => Err(FunnelError::AlreadyStarted),
            FunnelCommand::SubmitJourney { journey } => self.submit_journey(journey),
            FunnelCommand::LoadQuotes => self.load_quotes(services).await,
            FunnelCommand::SetCapacityFilter {
                min_passengers,
                min_luggage,
            } => self.set_capacity_filter(CapacityFilter::new(min_passengers, min_luggage)),
            FunnelCommand::SelectVehicle { vehicle_id } => self.select_vehicle(&vehicle_id),
            FunnelCommand::ContinueToDetails => self.continue_to_details(),
            FunnelCommand::SubmitPassengerDetails { form } => self.submit_details(form),
            FunnelCommand::GoBack { to } => self.go_back(to),
            FunnelCommand::ProceedToPayment => self.proceed_to_payment(services).await,
            FunnelCommand::ConfirmPayment => self.confirm_payment(services).await,
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            FunnelEvent::Started { id } => {
                self.id = id;
                self.step = WizardStep::Journey;
            }
            FunnelEvent::JourneyCaptured { journey } => {
                self.draft.capture_journey(journey);
            }
            FunnelEvent::StepChanged { to, .. } => {
                self.step = to;
            }
            FunnelEvent::QuotesLoaded {
                vehicles,
                journey_info,
            } => {
                self.vehicles = vehicles;
                self.quoted_journey_info = Some(journey_info);
            }
            FunnelEvent::CapacityFilterChanged { filter } => {
                self.capacity_filter = filter;
            }
            FunnelEvent::VehicleSelected { vehicle } => {
                self.draft.selected_vehicle = Some(vehicle);
            }
            FunnelEvent::VehicleDeselected => {
                self.draft.selected_vehicle = None;
            }
            FunnelEvent::JourneyInfoCommitted { journey_info } => {
                self.draft.journey_info = journey_info;
            }
            FunnelEvent::DetailsCommitted {
                passenger_details,
                flight_details,
                special_instructions,
            } => {
                self.draft.passenger_details = Some(passenger_details);
                self.draft.flight_details = flight_details;
                self.draft.special_instructions = special_instructions;
            }
            FunnelEvent::LeadCaptured { booking_id } => {
                // The first lead id sticks for the rest of the run.
                if self.draft.saved_booking_id.is_none() {
                    self.draft.saved_booking_id = Some(booking_id);
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
                    client_secret,
                    is_test_mode,
                    amount,
                    currency,
                });
                self.checkout_error = None;
            }
            FunnelEvent::PaymentIntentFailed { reason } => {
                self.checkout_error = Some(reason);
            }
            FunnelEvent::PaymentSucceeded { booking_id, .. } => {
                self.completed_booking_id = Some(booking_id);
            }
            FunnelEvent::FunnelReset => {
                self.step = WizardStep::Journey;
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

impl BookingFunnel {
    fn ensure_step(&self, expected: WizardStep, action: &'static str) -> Result<(), FunnelError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(FunnelError::WrongStep {
                action,
                step: self.step,
            })
        }
    }

    fn step_to(&self, to: WizardStep) -> FunnelEvent {
        FunnelEvent::StepChanged {
            from: self.step,
            to,
        }
    }

    fn submit_journey(&self, journey: JourneyDetails) -> Result<Vec<FunnelEvent>, FunnelError> {
        self.ensure_step(WizardStep::Journey, "submit journey")?;
        Ok(vec![
            FunnelEvent::JourneyCaptured {
                journey: journey.normalized(),
            },
            self.step_to(WizardStep::VehicleSelect),
        ])
    }

    async fn load_quotes(&self, services: &FunnelServices) -> Result<Vec<FunnelEvent>, FunnelError> {
        self.ensure_step(WizardStep::VehicleSelect, "load quotes")?;
        let journey = self.draft.journey().ok_or(FunnelError::JourneyMissing)?;

        let response = services
            .fare_quotes()
            .search(&QuoteRequest::for_journey(&journey))
            .await
            .map_err(|e| FunnelError::FareQuoteFailed(e.to_string()))?;
        info!(funnel_id = %self.id, vehicles = response.data.len(), "fare quotes loaded");

        // Keep a previous choice only if the new quotes still offer it, at the new price.
        let reselection = self.draft.selected_vehicle.as_ref().map(|selected| {
            match response.data.iter().find(|v| v.id == selected.id) {
                Some(requoted) if self.capacity_filter.admits(requoted) => {
                    FunnelEvent::VehicleSelected {
                        vehicle: requoted.clone(),
                    }
                }
                _ => FunnelEvent::VehicleDeselected,
            }
        });

        let mut events = vec![FunnelEvent::QuotesLoaded {
            vehicles: response.data,
            journey_info: response.journey,
        }];
        events.extend(reselection);
        Ok(events)
    }

    fn set_capacity_filter(&self, filter: CapacityFilter) -> Result<Vec<FunnelEvent>, FunnelError> {
        self.ensure_step(WizardStep::VehicleSelect, "filter vehicles")?;
        let mut events = vec![FunnelEvent::CapacityFilterChanged { filter }];
        if self
            .draft
            .selected_vehicle
            .as_ref()
            .is_some_and(|vehicle| !filter.admits(vehicle))
        {
            events.push(FunnelEvent::VehicleDeselected);
        }
        Ok(events)
    }

    fn select_vehicle(&self, vehicle_id: &str) -> Result<Vec<FunnelEvent>, FunnelError> {
        self.ensure_step(WizardStep::VehicleSelect, "select vehicle")?;
        let vehicle = self
            .vehicles
            .iter()
            .find(|v| v.id == vehicle_id)
            .ok_or_else(|| FunnelError::VehicleNotFound(vehicle_id.to_string()))?;
        if !self.capacity_filter.admits(vehicle) {
            return Err(FunnelError::VehicleUnavailable(vehicle_id.to_string()));
        }
        Ok(vec![FunnelEvent::VehicleSelected {
            vehicle: vehicle.clone(),
        }])
    }

    fn continue_to_details(&self) -> Result<Vec<FunnelEvent>, FunnelError> {
        self.ensure_step(WizardStep::VehicleSelect, "continue to details")?;
        if self.draft.selected_vehicle.is_none() {
            return Err(FunnelError::NoVehicleSelected);
        }
        Ok(vec![
            FunnelEvent::JourneyInfoCommitted {
                journey_info: self.quoted_journey_info.clone(),
            },
            self.step_to(WizardStep::PassengerDetails),
        ])
    }

    fn submit_details(&self, form: PassengerForm) -> Result<Vec<FunnelEvent>, FunnelError> {
        self.ensure_step(WizardStep::PassengerDetails, "submit passenger details")?;
        let errors = validate(&form);
        if !errors.is_empty() {
            return Err(FunnelError::Validation(errors));
        }
        let (passenger_details, flight_details, special_instructions) = form.into_details();
        Ok(vec![
            FunnelEvent::DetailsCommitted {
                passenger_details,
                flight_details,
                special_instructions,
            },
            self.step_to(WizardStep::Summary),
        ])
    }

    fn go_back(&self, to: WizardStep) -> Result<Vec<FunnelEvent>, FunnelError> {
        if !to.is_before(self.step) {
            return Err(FunnelError::NotAnEarlierStep {
                from: self.step,
                to,
            });
        }
        Ok(vec![self.step_to(to)])
    }

    /// Lead capture followed by payment intent creation.
    ///
    /// A lead that was created stays created: if the intent request fails the
    /// returned events still carry `LeadCaptured`, followed by
    /// `PaymentIntentFailed`, and the funnel stays on the summary.
    async fn proceed_to_payment(
        &self,
        services: &FunnelServices,
    ) -> Result<Vec<FunnelEvent>, FunnelError> {
        self.ensure_step(WizardStep::Summary, "proceed to payment")?;
        let amount = self
            .draft
            .total_price()
            .filter(|price| price.is_sign_positive() && !price.is_zero())
            .ok_or(FunnelError::InvalidPrice)?;

        let mut events = Vec::new();
        let booking_id = match &self.draft.saved_booking_id {
            Some(booking_id) => {
                info!(funnel_id = %self.id, %booking_id, "reusing captured lead");
                booking_id.clone()
            }
            None => {
                let booking_id = services
                    .booking_records()
                    .create(&BookingPayload::pending_lead(&self.draft))
                    .await
                    .map_err(|e| {
                        warn!(funnel_id = %self.id, error = %e, "lead capture failed");
                        FunnelError::LeadCaptureFailed(e.to_string())
                    })?;
                info!(funnel_id = %self.id, %booking_id, "lead captured");
                events.push(FunnelEvent::LeadCaptured {
                    booking_id: booking_id.clone(),
                });
                booking_id
            }
        };

        // An intent for the same amount is still live; hand it back out.
        if self.payment.as_ref().is_some_and(|s| s.amount == amount) {
            info!(funnel_id = %self.id, %booking_id, "resuming existing payment intent");
            events.push(self.step_to(WizardStep::Payment));
            return Ok(events);
        }

        match self
            .request_payment_intent(services, &booking_id, amount)
            .await
        {
            Ok(created) => {
                events.push(created);
                events.push(self.step_to(WizardStep::Payment));
            }
            Err(reason) => {
                warn!(funnel_id = %self.id, %booking_id, %reason, "payment intent failed");
                events.push(FunnelEvent::PaymentIntentFailed { reason });
            }
        }
        Ok(events)
    }

    async fn request_payment_intent(
        &self,
        services: &FunnelServices,
        booking_id: &str,
        amount: Decimal,
    ) -> Result<FunnelEvent, String> {
        let settings = services.payment();
        let mut snapshot = self.draft.clone();
        snapshot.saved_booking_id = Some(booking_id.to_string());
        let booking_data = serde_json::to_value(&snapshot).map_err(|e| e.to_string())?;

        let request = PaymentIntentRequest {
            amount,
            currency: settings.currency.clone(),
            booking_data,
            booking_id: booking_id.to_string(),
        };
        let intent = services
            .payment_intents()
            .create_payment_intent(&request)
            .await
            .map_err(|e| e.to_string())?;

        let is_test_mode = settings.mode.is_test();
        if intent.is_test_mode != is_test_mode {
            warn!(
                funnel_id = %self.id,
                %booking_id,
                service_test_mode = intent.is_test_mode,
                configured_test_mode = is_test_mode,
                "payment intent mode disagrees with configured mode"
            );
        }
        Ok(FunnelEvent::PaymentIntentCreated {
            client_secret: intent.client_secret,
            is_test_mode,
            amount,
            currency: request.currency,
        })
    }

    async fn confirm_payment(&self, services: &FunnelServices) -> Result<Vec<FunnelEvent>, FunnelError> {
        self.ensure_step(WizardStep::Payment, "confirm payment")?;
        let session = self.payment.as_ref().ok_or(FunnelError::NoPaymentSession)?;
        let booking_id = self
            .draft
            .saved_booking_id
            .clone()
            .ok_or(FunnelError::NoPaymentSession)?;

        let payment = services
            .payment_confirmer()
            .confirm(&session.client_secret)
            .await
            .map_err(|e| {
                info!(funnel_id = %self.id, %booking_id, error = %e, "payment not confirmed");
                FunnelError::PaymentDeclined(e.to_string())
            })?;
        info!(funnel_id = %self.id, %booking_id, payment_intent_id = %payment.id, "payment confirmed");

        // Outcome is logged by the queue; the customer sees success regardless.
        services
            .reconciliation()
            .submit(booking_id.clone(), payment.id.clone())
            .await;

        Ok(vec![
            FunnelEvent::PaymentSucceeded {
                booking_id,
                payment_intent_id: payment.id,
            },
            FunnelEvent::FunnelReset,
        ])
    }
}

impl BookingFunnel {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn step(&self) -> WizardStep {
        self.step
    }

    #[must_use]
    pub fn draft(&self) -> &BookingDraft {
        &self.draft
    }

    #[must_use]
    pub fn vehicles(&self) -> &[VehicleQuote] {
        &self.vehicles
    }

    #[must_use]
    pub fn capacity_filter(&self) -> CapacityFilter {
        self.capacity_filter
    }

    /// The quote list as the vehicle step shows it.
    #[must_use]
    pub fn vehicle_options(&self) -> Vec<VehicleOption> {
        filter_by_capacity(&self.vehicles, self.capacity_filter)
    }

    #[must_use]
    pub fn capacity_bounds(&self) -> CapacityBounds {
        capacity_bounds(&self.vehicles)
    }

    #[must_use]
    pub fn payment(&self) -> Option<&PaymentSession> {
        self.payment.as_ref()
    }

    #[must_use]
    pub fn checkout_error(&self) -> Option<&str> {
        self.checkout_error.as_deref()
    }

    #[must_use]
    pub fn completed_booking_id(&self) -> Option<&str> {
        self.completed_booking_id.as_deref()
    }

    /// The passenger form prefilled from the draft, for the "Edit" path.
    #[must_use]
    pub fn passenger_form(&self) -> PassengerForm {
        self.draft
            .passenger_details
            .as_ref()
            .map(|passenger| {
                PassengerForm::from_details(
                    passenger,
                    self.draft.flight_details.as_ref(),
                    &self.draft.special_instructions,
                )
            })
            .unwrap_or_default()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum FunnelError {
    #[error("Funnel not found")]
    NotFound,
    #[error("Funnel already started")]
    AlreadyStarted,
    #[error("Cannot {action} on the {step} step")]
    WrongStep {
        action: &'static str,
        step: WizardStep,
    },
    #[error("Cannot go back from {from} to {to}")]
    NotAnEarlierStep { from: WizardStep, to: WizardStep },
    #[error("No journey has been entered yet")]
    JourneyMissing,
    #[error("Could not load vehicles: {0}")]
    FareQuoteFailed(String),
    #[error("Vehicle {0} is not in the current quote")]
    VehicleNotFound(String),
    #[error("Vehicle {0} does not fit the requested passengers or luggage")]
    VehicleUnavailable(String),
    #[error("Please select a vehicle to continue")]
    NoVehicleSelected,
    #[error("Please correct the highlighted fields")]
    Validation(ErrorMap),
    #[error("The selected vehicle has no valid price")]
    InvalidPrice,
    #[error("We could not save your booking: {0}")]
    LeadCaptureFailed(String),
    #[error("We could not start the payment: {0}")]
    PaymentIntentFailed(String),
    #[error("No payment is in progress")]
    NoPaymentSession,
    #[error("Payment failed: {0}")]
    PaymentDeclined(String),
    #[error("The funnel moved on before this action completed")]
    Superseded,
    #[error("Funnel store failed: {0}")]
    Store(String),
}

impl FunnelError {
    /// Whether repeating the same action may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FunnelError::FareQuoteFailed(_)
                | FunnelError::LeadCaptureFailed(_)
                | FunnelError::PaymentIntentFailed(_)
                | FunnelError::PaymentDeclined(_)
                | FunnelError::Superseded
        )
    }
}

pub struct FunnelServices {
    fare_quotes: Arc<dyn FareQuoteGateway>,
    booking_records: Arc<dyn BookingRecordService>,
    payment_intents: Arc<dyn PaymentIntentService>,
    payment_confirmer: Arc<dyn PaymentConfirmer>,
    reconciliation: Arc<ReconciliationQueue>,
    payment: PaymentSettings,
}

impl FunnelServices {
    pub fn new(
        fare_quotes: Arc<dyn FareQuoteGateway>,
        booking_records: Arc<dyn BookingRecordService>,
        payment_intents: Arc<dyn PaymentIntentService>,
        payment_confirmer: Arc<dyn PaymentConfirmer>,
        payment: PaymentSettings,
    ) -> Self {
        let reconciliation = Arc::new(ReconciliationQueue::new(booking_records.clone()));
        Self {
            fare_quotes,
            booking_records,
            payment_intents,
            payment_confirmer,
            reconciliation,
            payment,
        }
    }

    /// Caps how many times a failed "paid" update is attempted before the job
    /// is abandoned.
    #[must_use]
    pub fn with_reconcile_attempts(mut self, max_attempts: u32) -> Self {
        self.reconciliation = Arc::new(
            ReconciliationQueue::new(self.booking_records.clone()).with_max_attempts(max_attempts),
        );
        self
    }

    #[must_use]
    pub fn fare_quotes(&self) -> &Arc<dyn FareQuoteGateway> {
        &self.fare_quotes
    }

    #[must_use]
    pub fn booking_records(&self) -> &Arc<dyn BookingRecordService> {
        &self.booking_records
    }

    #[must_use]
    pub fn payment_intents(&self) -> &Arc<dyn PaymentIntentService> {
        &self.payment_intents
    }

    #[must_use]
    pub fn payment_confirmer(&self) -> &Arc<dyn PaymentConfirmer> {
        &self.payment_confirmer
    }

    #[must_use]
    pub fn reconciliation(&self) -> &Arc<ReconciliationQueue> {
        &self.reconciliation
    }

    #[must_use]
    pub fn payment(&self) -> &PaymentSettings {
        &self.payment
    }
}
