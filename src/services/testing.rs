//! In-memory collaborators that record every call, for funnel tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::events::ClientSecret;
use crate::domain::vehicle::VehicleQuote;
use crate::services::ServiceError;
use crate::services::booking_record::{BookingPayload, BookingRecordService, StatusUpdate};
use crate::services::fare_quote::{FareQuoteGateway, QuoteRequest, QuoteResponse};
use crate::services::payment_confirmation::{ConfirmedPayment, PaymentConfirmer};
use crate::services::payment_intent::{PaymentIntent, PaymentIntentRequest, PaymentIntentService};

pub struct StubFareQuotes {
    response: QuoteResponse,
    failures: Mutex<usize>,
    requests: Mutex<Vec<QuoteRequest>>,
}

impl StubFareQuotes {
    pub fn returning(vehicles: Vec<VehicleQuote>, journey: serde_json::Value) -> Self {
        Self {
            response: QuoteResponse {
                data: vehicles,
                journey,
            },
            failures: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self, count: usize) {
        *self.failures.lock().unwrap() = count;
    }

    pub fn requests(&self) -> Vec<QuoteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FareQuoteGateway for StubFareQuotes {
    async fn search(&self, request: &QuoteRequest) -> Result<QuoteResponse, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ServiceError::Unavailable("fare service timed out".to_string()));
        }
        Ok(self.response.clone())
    }
}

/// Optional pause point inside `create`, used to hold a lead capture in flight
/// while the test navigates.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

pub struct RecordingBookings {
    booking_id: String,
    create_failures: Mutex<usize>,
    update_failures: Mutex<usize>,
    creates: Mutex<Vec<BookingPayload>>,
    updates: Mutex<Vec<(String, StatusUpdate)>>,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl RecordingBookings {
    pub fn new(booking_id: &str) -> Self {
        Self {
            booking_id: booking_id.to_string(),
            create_failures: Mutex::new(0),
            update_failures: Mutex::new(0),
            creates: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    pub fn fail_next_creates(&self, count: usize) {
        *self.create_failures.lock().unwrap() = count;
    }

    pub fn fail_next_updates(&self, count: usize) {
        *self.update_failures.lock().unwrap() = count;
    }

    pub fn hold_creates(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn creates(&self) -> Vec<BookingPayload> {
        self.creates.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, StatusUpdate)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl BookingRecordService for RecordingBookings {
    async fn create(&self, payload: &BookingPayload) -> Result<String, ServiceError> {
        self.creates.lock().unwrap().push(payload.clone());
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let mut failures = self.create_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ServiceError::Unavailable("booking service is down".to_string()));
        }
        Ok(self.booking_id.clone())
    }

    async fn update_status(&self, id: &str, update: &StatusUpdate) -> Result<(), ServiceError> {
        self.updates
            .lock()
            .unwrap()
            .push((id.to_string(), update.clone()));
        let mut failures = self.update_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ServiceError::Unavailable("booking service is down".to_string()));
        }
        Ok(())
    }
}

pub struct ScriptedIntents {
    is_test_mode: bool,
    failures: Mutex<usize>,
    requests: Mutex<Vec<PaymentIntentRequest>>,
}

impl ScriptedIntents {
    pub fn new(is_test_mode: bool) -> Self {
        Self {
            is_test_mode,
            failures: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self, count: usize) {
        *self.failures.lock().unwrap() = count;
    }

    pub fn requests(&self) -> Vec<PaymentIntentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentIntentService for ScriptedIntents {
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(ServiceError::Unavailable("network error".to_string()));
        }
        Ok(PaymentIntent {
            client_secret: ClientSecret::new(format!("{}_secret", request.booking_id)),
            is_test_mode: self.is_test_mode,
        })
    }
}

pub struct ScriptedConfirmer {
    declines: Mutex<VecDeque<String>>,
    secrets: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    pub fn approving() -> Self {
        Self {
            declines: Mutex::new(VecDeque::new()),
            secrets: Mutex::new(Vec::new()),
        }
    }

    pub fn decline_next(&self, message: &str) {
        self.declines.lock().unwrap().push_back(message.to_string());
    }

    pub fn secrets(&self) -> Vec<String> {
        self.secrets.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentConfirmer for ScriptedConfirmer {
    async fn confirm(&self, client_secret: &ClientSecret) -> Result<ConfirmedPayment, ServiceError> {
        self.secrets
            .lock()
            .unwrap()
            .push(client_secret.expose().to_string());
        if let Some(message) = self.declines.lock().unwrap().pop_front() {
            return Err(ServiceError::Rejected(message));
        }
        Ok(ConfirmedPayment {
            id: "pi_test_1".to_string(),
            status: "succeeded".to_string(),
        })
    }
}
