use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;
use cqrs_es::mem_store::MemStore;
use cqrs_es::{Aggregate, AggregateContext, AggregateError, EventStore, Query, View};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::commands::FunnelCommand;
use crate::domain::draft::JourneyDetails;
use crate::domain::events::FunnelEvent;
use crate::domain::funnel::{BookingFunnel, FunnelError, FunnelServices};
use crate::domain::vehicle::{CapacityBounds, CapacityFilter, VehicleOption};
use crate::queries::{COMMITTED_AT, FunnelView};

pub type FunnelQueries = Arc<Vec<Box<dyn Query<BookingFunnel>>>>;

/// What the vehicle step renders: every quote, annotated and ordered by the
/// capacity filter, plus the bounds for the filter controls.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleList {
    pub vehicles: Vec<VehicleOption>,
    pub filter: CapacityFilter,
    pub bounds: CapacityBounds,
}

fn store_error(error: AggregateError<FunnelError>) -> FunnelError {
    match error {
        AggregateError::UserError(error) => error,
        other => FunnelError::Store(other.to_string()),
    }
}

/// Drives one funnel run over its own in-memory event store.
///
/// Commands are handled against the aggregate as loaded, without holding the
/// store, so that slow collaborator calls never block navigation. When a
/// command completes after other events were committed, only its durable
/// events are committed and the caller gets `FunnelError::Superseded`.
/// Checkout commands wait for each other, so a lead is created at most once.
pub struct FunnelController {
    id: Uuid,
    aggregate_id: String,
    services: Arc<FunnelServices>,
    queries: FunnelQueries,
    store: MemStore<BookingFunnel>,
    // Held from version check to commit.
    committing: Mutex<()>,
    checkout: Mutex<()>,
    last_touched_ms: AtomicI64,
}

impl FunnelController {
    /// Creates a controller and starts its funnel run.
    ///
    /// # Errors
    ///
    /// Returns an error if the start command is rejected.
    pub async fn start(
        id: Uuid,
        services: Arc<FunnelServices>,
        queries: FunnelQueries,
    ) -> Result<Arc<Self>, FunnelError> {
        let controller = Arc::new(Self {
            id,
            aggregate_id: id.to_string(),
            services,
            queries,
            store: MemStore::default(),
            committing: Mutex::new(()),
            checkout: Mutex::new(()),
            last_touched_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        });
        controller.execute(FunnelCommand::Start { id }).await?;
        info!(funnel_id = %id, "funnel started");
        Ok(controller)
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    fn touch(&self) {
        self.last_touched_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Time since the run last handled a command or served a read.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        let elapsed = Utc::now().timestamp_millis() - self.last_touched_ms.load(Ordering::Relaxed);
        Duration::from_millis(u64::try_from(elapsed).unwrap_or(0))
    }

    /// Handles a command and commits the resulting events.
    ///
    /// # Errors
    ///
    /// Returns the aggregate's rejection, `PaymentIntentFailed` when a lead was
    /// captured but no payment intent could be created, or `Superseded` when
    /// the funnel moved on while the command was in flight.
    pub async fn execute(&self, command: FunnelCommand) -> Result<FunnelView, FunnelError> {
        self.touch();
        let _checkout = if command.is_checkout() {
            Some(self.checkout.lock().await)
        } else {
            None
        };

        let (funnel, version) = {
            let _committing = self.committing.lock().await;
            (self.load().await?, self.version().await?)
        };

        let produced = funnel.handle(command, &self.services).await?;
        let committed = self.commit(version, produced).await?;
        self.touch();

        if committed.superseded {
            return Err(FunnelError::Superseded);
        }
        match committed.intent_failure {
            Some(reason) => Err(FunnelError::PaymentIntentFailed(reason)),
            None => self.view().await,
        }
    }

    async fn load(&self) -> Result<BookingFunnel, FunnelError> {
        let context = self
            .store
            .load_aggregate(&self.aggregate_id)
            .await
            .map_err(store_error)?;
        Ok(context.aggregate().clone())
    }

    async fn version(&self) -> Result<usize, FunnelError> {
        let events = self
            .store
            .load_events(&self.aggregate_id)
            .await
            .map_err(store_error)?;
        Ok(events.last().map_or(0, |event| event.sequence))
    }

    async fn commit(
        &self,
        loaded_version: usize,
        produced: Vec<FunnelEvent>,
    ) -> Result<Committed, FunnelError> {
        let produced_count = produced.len();
        let mut metadata = HashMap::new();
        metadata.insert(COMMITTED_AT.to_string(), Utc::now().to_rfc3339());

        let _committing = self.committing.lock().await;
        let mut events = produced;
        if self.version().await? != loaded_version {
            events.retain(FunnelEvent::is_durable);
            warn!(
                funnel_id = %self.id,
                produced = produced_count,
                kept = events.len(),
                "command completed after the funnel moved on"
            );
        }

        let envelopes = if events.is_empty() {
            Vec::new()
        } else {
            let context = self
                .store
                .load_aggregate(&self.aggregate_id)
                .await
                .map_err(store_error)?;
            match self.store.commit(events.clone(), context, metadata.clone()).await {
                Ok(envelopes) => envelopes,
                Err(AggregateError::AggregateConflict) => {
                    events.retain(FunnelEvent::is_durable);
                    let context = self
                        .store
                        .load_aggregate(&self.aggregate_id)
                        .await
                        .map_err(store_error)?;
                    self.store
                        .commit(events.clone(), context, metadata)
                        .await
                        .map_err(store_error)?
                }
                Err(error) => return Err(store_error(error)),
            }
        };

        if !envelopes.is_empty() {
            for query in self.queries.iter() {
                query.dispatch(&self.aggregate_id, &envelopes).await;
            }
        }

        Ok(Committed {
            superseded: events.len() < produced_count,
            intent_failure: events.iter().find_map(|event| match event {
                FunnelEvent::PaymentIntentFailed { reason } => Some(reason.clone()),
                _ => None,
            }),
        })
    }

    /// Commits the journey and fetches quotes for it. A failed quote request
    /// leaves the funnel on the vehicle step, where `LoadQuotes` retries it.
    ///
    /// # Errors
    ///
    /// Returns an error if the journey is rejected or quotes cannot be loaded.
    pub async fn submit_journey(&self, journey: JourneyDetails) -> Result<FunnelView, FunnelError> {
        self.execute(FunnelCommand::SubmitJourney { journey }).await?;
        self.execute(FunnelCommand::LoadQuotes).await
    }

    /// Replays the run's events into a fresh `FunnelView`.
    ///
    /// # Errors
    ///
    /// Returns an error if the event store cannot be read.
    pub async fn view(&self) -> Result<FunnelView, FunnelError> {
        self.touch();
        let events = self
            .store
            .load_events(&self.aggregate_id)
            .await
            .map_err(store_error)?;
        let mut view = FunnelView::default();
        for event in &events {
            view.update(event);
        }
        Ok(view)
    }

    /// # Errors
    ///
    /// Returns an error if the event store cannot be read.
    pub async fn snapshot(&self) -> Result<BookingFunnel, FunnelError> {
        self.load().await
    }

    /// # Errors
    ///
    /// Returns an error if the event store cannot be read.
    pub async fn vehicle_list(&self) -> Result<VehicleList, FunnelError> {
        self.touch();
        let funnel = self.load().await?;
        Ok(VehicleList {
            vehicles: funnel.vehicle_options(),
            filter: funnel.capacity_filter(),
            bounds: funnel.capacity_bounds(),
        })
    }
}

struct Committed {
    superseded: bool,
    intent_failure: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::LoggingQuery;
    use crate::config::{PaymentMode, PaymentSettings};
    use crate::domain::draft::{Address, ServiceType};
    use crate::domain::step::WizardStep;
    use crate::domain::validation::PassengerForm;
    use crate::domain::vehicle::{Pricing, VehicleQuote};
    use crate::services::testing::{
        RecordingBookings, ScriptedConfirmer, ScriptedIntents, StubFareQuotes,
    };

    struct Harness {
        fares: Arc<StubFareQuotes>,
        bookings: Arc<RecordingBookings>,
        intents: Arc<ScriptedIntents>,
        confirmer: Arc<ScriptedConfirmer>,
        services: Arc<FunnelServices>,
    }

    fn vehicle(id: &str, passengers: u32, luggage: u32, price: rust_decimal::Decimal) -> VehicleQuote {
        VehicleQuote {
            id: id.to_string(),
            name: id.to_string(),
            number_of_passengers: passengers,
            number_of_big_luggage: luggage,
            pricing: Pricing {
                total_price: Some(price),
                breakdown: serde_json::Map::new(),
            },
        }
    }

    fn harness(intent_test_mode: bool) -> Harness {
        let fares = Arc::new(StubFareQuotes::returning(
            vec![vehicle("A", 4, 2, dec!(120)), vehicle("B", 2, 1, dec!(65))],
            json!({ "distance": "12 km" }),
        ));
        let bookings = Arc::new(RecordingBookings::new("abc123"));
        let intents = Arc::new(ScriptedIntents::new(intent_test_mode));
        let confirmer = Arc::new(ScriptedConfirmer::approving());
        let services = Arc::new(FunnelServices::new(
            fares.clone(),
            bookings.clone(),
            intents.clone(),
            confirmer.clone(),
            PaymentSettings {
                mode: PaymentMode::Test,
                currency: "gbp".to_string(),
                publishable_key: "pk_test_123".to_string(),
                show_test_banner: true,
            },
        ));
        Harness {
            fares,
            bookings,
            intents,
            confirmer,
            services,
        }
    }

    fn queries() -> FunnelQueries {
        let queries: Vec<Box<dyn Query<BookingFunnel>>> = vec![Box::new(LoggingQuery {})];
        Arc::new(queries)
    }

    fn journey(service_type: ServiceType) -> JourneyDetails {
        JourneyDetails {
            pickup: Address::new("10 Downing St"),
            dropoff: Some(Address::new("Paddington Station")),
            pickup_date: NaiveDate::from_ymd_opt(2026, 11, 5).unwrap(),
            pickup_time: "14:00".to_string(),
            service_type,
            hours: 3,
        }
    }

    fn passenger_form() -> PassengerForm {
        PassengerForm {
            first_name: "Grace".to_string(),
            last_name: "O'Malley-Hopper".to_string(),
            email: "grace@example.com".to_string(),
            phone: "07700900123".to_string(),
            is_booking_for_someone_else: true,
            guest_first_name: "Alan".to_string(),
            guest_last_name: "Turing".to_string(),
            guest_email: "alan@example.com".to_string(),
            is_airport_pickup: true,
            flight_number: "BA117".to_string(),
            airline: "British Airways".to_string(),
            special_instructions: "Child seat please".to_string(),
            ..PassengerForm::default()
        }
    }

    async fn at_summary(harness: &Harness, service_type: ServiceType) -> Arc<FunnelController> {
        let controller = FunnelController::start(Uuid::new_v4(), harness.services.clone(), queries())
            .await
            .unwrap();
        controller.submit_journey(journey(service_type)).await.unwrap();
        controller
            .execute(FunnelCommand::SelectVehicle {
                vehicle_id: "A".to_string(),
            })
            .await
            .unwrap();
        controller.execute(FunnelCommand::ContinueToDetails).await.unwrap();
        controller
            .execute(FunnelCommand::SubmitPassengerDetails {
                form: passenger_form(),
            })
            .await
            .unwrap();
        controller
    }

    #[tokio::test]
    async fn vehicle_step_lists_every_quote_with_disabled_last() {
        let harness = harness(true);
        let controller = FunnelController::start(Uuid::new_v4(), harness.services.clone(), queries())
            .await
            .unwrap();
        controller.submit_journey(journey(ServiceType::Oneway)).await.unwrap();
        controller
            .execute(FunnelCommand::SetCapacityFilter {
                min_passengers: 3,
                min_luggage: 1,
            })
            .await
            .unwrap();

        let list = controller.vehicle_list().await.unwrap();
        let ids: Vec<(&str, bool)> = list
            .vehicles
            .iter()
            .map(|option| (option.vehicle.id.as_str(), option.is_disabled))
            .collect();
        assert_eq!(ids, vec![("A", false), ("B", true)]);
        assert_eq!(list.bounds.max_passengers, 4);
        assert_eq!(list.bounds.max_luggage, 2);
        assert_eq!(harness.fares.requests().len(), 1);
    }

    #[tokio::test]
    async fn failed_quote_request_can_be_retried() {
        let harness = harness(true);
        harness.fares.fail_next(1);
        let controller = FunnelController::start(Uuid::new_v4(), harness.services.clone(), queries())
            .await
            .unwrap();

        let first = controller.submit_journey(journey(ServiceType::Oneway)).await;
        assert!(matches!(first, Err(FunnelError::FareQuoteFailed(_))));
        assert_eq!(controller.view().await.unwrap().step, WizardStep::VehicleSelect);
        assert!(controller.view().await.unwrap().vehicles.is_empty());

        let view = controller.execute(FunnelCommand::LoadQuotes).await.unwrap();
        assert_eq!(view.vehicles.len(), 2);
    }

    #[tokio::test]
    async fn summary_edit_round_trip_preserves_every_field() {
        let harness = harness(true);
        let controller = at_summary(&harness, ServiceType::Oneway).await;
        let before = controller.view().await.unwrap().draft;

        controller
            .execute(FunnelCommand::GoBack {
                to: WizardStep::PassengerDetails,
            })
            .await
            .unwrap();
        let form = controller.snapshot().await.unwrap().passenger_form();
        assert_eq!(form, passenger_form());

        let view = controller
            .execute(FunnelCommand::SubmitPassengerDetails { form })
            .await
            .unwrap();
        assert_eq!(view.step, WizardStep::Summary);
        assert_eq!(view.draft, before);
    }

    #[tokio::test]
    async fn hourly_booking_reaches_payment_with_pickup_as_dropoff() {
        let harness = harness(true);
        let controller = at_summary(&harness, ServiceType::Hourly).await;

        let view = controller.execute(FunnelCommand::ProceedToPayment).await.unwrap();

        assert_eq!(view.step, WizardStep::Payment);
        assert_eq!(view.draft.saved_booking_id.as_deref(), Some("abc123"));
        let payment = view.payment.unwrap();
        assert_eq!(payment.client_secret.expose(), "abc123_secret");
        assert_eq!(payment.amount, dec!(120));
        assert_eq!(harness.bookings.creates()[0].dropoff.address, "10 Downing St");
        assert!(harness.bookings.creates()[0].is_airport_pickup);
    }

    #[tokio::test]
    async fn intent_failure_keeps_lead_and_retry_skips_lead_capture() {
        let harness = harness(true);
        harness.intents.fail_next(1);
        let controller = at_summary(&harness, ServiceType::Oneway).await;

        let first = controller.execute(FunnelCommand::ProceedToPayment).await;
        assert_eq!(
            first,
            Err(FunnelError::PaymentIntentFailed(
                "service unavailable: network error".to_string()
            ))
        );
        let view = controller.view().await.unwrap();
        assert_eq!(view.step, WizardStep::Summary);
        assert_eq!(view.draft.saved_booking_id.as_deref(), Some("abc123"));
        assert!(view.checkout_error.is_some());

        let view = controller.execute(FunnelCommand::ProceedToPayment).await.unwrap();
        assert_eq!(view.step, WizardStep::Payment);
        assert!(view.checkout_error.is_none());
        assert_eq!(harness.bookings.creates().len(), 1);
        let requests = harness.intents.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].booking_id, "abc123");
    }

    #[tokio::test]
    async fn configured_mode_wins_over_intent_service() {
        let harness = harness(false);
        let controller = at_summary(&harness, ServiceType::Oneway).await;

        let view = controller.execute(FunnelCommand::ProceedToPayment).await.unwrap();

        assert!(view.payment.unwrap().is_test_mode);
    }

    #[tokio::test]
    async fn lead_finishing_after_back_navigation_is_kept_without_moving_steps() {
        let harness = harness(true);
        let controller = at_summary(&harness, ServiceType::Oneway).await;
        let gate = harness.bookings.hold_creates();

        let in_flight = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.execute(FunnelCommand::ProceedToPayment).await })
        };
        gate.entered.notified().await;
        controller
            .execute(FunnelCommand::GoBack {
                to: WizardStep::PassengerDetails,
            })
            .await
            .unwrap();
        gate.release.notify_one();

        let outcome = in_flight.await.unwrap();
        assert_eq!(outcome, Err(FunnelError::Superseded));
        let funnel = controller.snapshot().await.unwrap();
        assert_eq!(funnel.step(), WizardStep::PassengerDetails);
        assert_eq!(funnel.draft().saved_booking_id.as_deref(), Some("abc123"));
        assert!(funnel.payment().is_none());

        controller
            .execute(FunnelCommand::SubmitPassengerDetails {
                form: funnel.passenger_form(),
            })
            .await
            .unwrap();
        let view = controller.execute(FunnelCommand::ProceedToPayment).await.unwrap();
        assert_eq!(view.step, WizardStep::Payment);
        assert_eq!(harness.bookings.creates().len(), 1);
    }

    #[tokio::test]
    async fn overlapping_proceed_to_payment_creates_one_lead() {
        let harness = harness(true);
        let controller = at_summary(&harness, ServiceType::Oneway).await;
        let gate = harness.bookings.hold_creates();

        let first = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.execute(FunnelCommand::ProceedToPayment).await })
        };
        gate.entered.notified().await;
        let second = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.execute(FunnelCommand::ProceedToPayment).await })
        };
        tokio::task::yield_now().await;
        gate.release.notify_one();

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap();
        assert_eq!(first.step, WizardStep::Payment);
        assert_eq!(
            second,
            Err(FunnelError::WrongStep {
                action: "proceed to payment",
                step: WizardStep::Payment,
            })
        );
        assert_eq!(harness.bookings.creates().len(), 1);
        assert_eq!(harness.intents.requests().len(), 1);
    }

    #[tokio::test]
    async fn view_is_replayed_from_the_event_store() {
        let harness = harness(true);
        let controller = at_summary(&harness, ServiceType::Oneway).await;

        let view = controller.view().await.unwrap();
        let funnel = controller.snapshot().await.unwrap();

        assert_eq!(view.step, funnel.step());
        assert_eq!(&view.draft, funnel.draft());
        assert!(view.version > 0);
        assert!(view.updated_at.is_some());
    }

    #[tokio::test]
    async fn declined_card_retries_with_the_same_secret() {
        let harness = harness(true);
        let controller = at_summary(&harness, ServiceType::Oneway).await;
        controller.execute(FunnelCommand::ProceedToPayment).await.unwrap();
        harness.confirmer.decline_next("Your card was declined.");

        let declined = controller.execute(FunnelCommand::ConfirmPayment).await;
        assert!(matches!(declined, Err(FunnelError::PaymentDeclined(_))));
        assert_eq!(controller.view().await.unwrap().step, WizardStep::Payment);

        let view = controller.execute(FunnelCommand::ConfirmPayment).await.unwrap();
        assert_eq!(view.step, WizardStep::Journey);
        assert_eq!(
            harness.confirmer.secrets(),
            vec!["abc123_secret".to_string(), "abc123_secret".to_string()]
        );
        assert_eq!(harness.bookings.creates().len(), 1);
        assert_eq!(harness.intents.requests().len(), 1);
    }

    #[tokio::test]
    async fn paid_update_failure_is_queued_not_surfaced() {
        let harness = harness(true);
        harness.bookings.fail_next_updates(1);
        let controller = at_summary(&harness, ServiceType::Oneway).await;
        controller.execute(FunnelCommand::ProceedToPayment).await.unwrap();

        let view = controller.execute(FunnelCommand::ConfirmPayment).await.unwrap();

        assert_eq!(view.step, WizardStep::Journey);
        assert_eq!(view.completed_booking_id.as_deref(), Some("abc123"));
        assert!(view.payment.is_none());
        assert_eq!(view.draft.saved_booking_id, None);

        let reconciliation = harness.services.reconciliation();
        assert_eq!(reconciliation.pending().await.len(), 1);
        assert_eq!(reconciliation.retry_pending().await, 1);
        assert!(reconciliation.pending().await.is_empty());
        assert_eq!(harness.bookings.updates().len(), 2);
    }

    #[tokio::test]
    async fn paid_update_is_abandoned_after_configured_attempts() {
        let harness = harness(true);
        let services = Arc::new(
            FunnelServices::new(
                harness.fares.clone(),
                harness.bookings.clone(),
                harness.intents.clone(),
                harness.confirmer.clone(),
                harness.services.payment().clone(),
            )
            .with_reconcile_attempts(1),
        );
        harness.bookings.fail_next_updates(1);
        let controller = FunnelController::start(Uuid::new_v4(), services.clone(), queries())
            .await
            .unwrap();
        controller.submit_journey(journey(ServiceType::Oneway)).await.unwrap();
        controller
            .execute(FunnelCommand::SelectVehicle {
                vehicle_id: "A".to_string(),
            })
            .await
            .unwrap();
        controller.execute(FunnelCommand::ContinueToDetails).await.unwrap();
        controller
            .execute(FunnelCommand::SubmitPassengerDetails {
                form: passenger_form(),
            })
            .await
            .unwrap();
        controller.execute(FunnelCommand::ProceedToPayment).await.unwrap();

        let view = controller.execute(FunnelCommand::ConfirmPayment).await.unwrap();

        assert_eq!(view.completed_booking_id.as_deref(), Some("abc123"));
        assert!(services.reconciliation().pending().await.is_empty());
        assert_eq!(services.reconciliation().abandoned().await.len(), 1);
    }
}
