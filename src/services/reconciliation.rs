use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::services::booking_record::{BookingRecordService, StatusUpdate};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Marks a booking record as paid once the provider has taken the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationJob {
    pub booking_id: String,
    pub payment_intent_id: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    Reconciled,
    /// Failed for now, queued for `retry_pending`.
    Deferred,
    /// Out of attempts; left for manual repair.
    Abandoned,
}

/// Queue for the post-payment "paid" update.
///
/// The first attempt is made inline by `submit`. Failures are logged and never
/// reach the customer: the charge already went through, so a missing status
/// update is an operational repair, not a booking failure.
pub struct ReconciliationQueue {
    records: Arc<dyn BookingRecordService>,
    max_attempts: u32,
    pending: Mutex<Vec<ReconciliationJob>>,
    abandoned: Mutex<Vec<ReconciliationJob>>,
}

impl ReconciliationQueue {
    pub fn new(records: Arc<dyn BookingRecordService>) -> Self {
        Self {
            records,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            pending: Mutex::new(Vec::new()),
            abandoned: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub async fn submit(
        &self,
        booking_id: impl Into<String>,
        payment_intent_id: impl Into<String>,
    ) -> ReconciliationOutcome {
        let job = ReconciliationJob {
            booking_id: booking_id.into(),
            payment_intent_id: payment_intent_id.into(),
            attempts: 0,
        };
        self.attempt(job).await
    }

    /// Re-attempts every queued job once. Returns how many were reconciled.
    pub async fn retry_pending(&self) -> usize {
        let jobs = std::mem::take(&mut *self.pending.lock().await);
        let mut reconciled = 0;
        for job in jobs {
            if self.attempt(job).await == ReconciliationOutcome::Reconciled {
                reconciled += 1;
            }
        }
        reconciled
    }

    pub async fn pending(&self) -> Vec<ReconciliationJob> {
        self.pending.lock().await.clone()
    }

    pub async fn abandoned(&self) -> Vec<ReconciliationJob> {
        self.abandoned.lock().await.clone()
    }

    async fn attempt(&self, mut job: ReconciliationJob) -> ReconciliationOutcome {
        job.attempts += 1;
        let update = StatusUpdate::paid(job.payment_intent_id.clone());
        match self.records.update_status(&job.booking_id, &update).await {
            Ok(()) => {
                info!(
                    booking_id = %job.booking_id,
                    payment_intent_id = %job.payment_intent_id,
                    attempts = job.attempts,
                    "booking marked as paid"
                );
                ReconciliationOutcome::Reconciled
            }
            Err(err) if job.attempts >= self.max_attempts => {
                error!(
                    booking_id = %job.booking_id,
                    payment_intent_id = %job.payment_intent_id,
                    attempts = job.attempts,
                    error = %err,
                    "giving up on marking booking as paid"
                );
                self.abandoned.lock().await.push(job);
                ReconciliationOutcome::Abandoned
            }
            Err(err) => {
                warn!(
                    booking_id = %job.booking_id,
                    payment_intent_id = %job.payment_intent_id,
                    attempts = job.attempts,
                    error = %err,
                    "failed to mark booking as paid, will retry"
                );
                self.pending.lock().await.push(job);
                ReconciliationOutcome::Deferred
            }
        }
    }
}
