use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::controller::FunnelController;
use crate::domain::commands::FunnelCommand;
use crate::domain::funnel::FunnelError;
use crate::services::reconciliation::ReconciliationJob;
use crate::state::ApplicationState;

impl IntoResponse for FunnelError {
    fn into_response(self) -> Response {
        let status = match &self {
            FunnelError::NotFound => StatusCode::NOT_FOUND,
            FunnelError::Validation(_)
            | FunnelError::VehicleNotFound(_)
            | FunnelError::VehicleUnavailable(_)
            | FunnelError::InvalidPrice => StatusCode::UNPROCESSABLE_ENTITY,
            FunnelError::FareQuoteFailed(_)
            | FunnelError::LeadCaptureFailed(_)
            | FunnelError::PaymentIntentFailed(_) => StatusCode::BAD_GATEWAY,
            FunnelError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            FunnelError::AlreadyStarted
            | FunnelError::WrongStep { .. }
            | FunnelError::NotAnEarlierStep { .. }
            | FunnelError::JourneyMissing
            | FunnelError::NoVehicleSelected
            | FunnelError::NoPaymentSession
            | FunnelError::Superseded => StatusCode::CONFLICT,
            FunnelError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut body = json!({
            "error": self.to_string(),
            "retryable": self.is_retryable(),
        });
        if let FunnelError::Validation(fields) = &self {
            body["fields"] = json!(fields);
        }
        (status, Json(body)).into_response()
    }
}

async fn lookup(state: &ApplicationState, funnel_id: &str) -> Result<Arc<FunnelController>, Response> {
    let Ok(uuid) = Uuid::parse_str(funnel_id) else {
        return Err((StatusCode::BAD_REQUEST, "Invalid funnel ID format").into_response());
    };
    state
        .funnels
        .get(&uuid)
        .await
        .ok_or_else(|| FunnelError::NotFound.into_response())
}

// Starts a new funnel run and responds with its initial view.
pub async fn start_handler(State(state): State<ApplicationState>) -> Response {
    match state.funnels.start().await {
        Ok(controller) => match controller.view().await {
            Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
            Err(err) => err.into_response(),
        },
        Err(err) => {
            warn!(error = %err, "could not start funnel");
            err.into_response()
        }
    }
}

// Serves the materialized `FunnelView` for the requested run.
pub async fn query_handler(
    Path(funnel_id): Path<String>,
    State(state): State<ApplicationState>,
) -> Response {
    match lookup(&state, &funnel_id).await {
        Ok(controller) => match controller.view().await {
            Ok(view) => (StatusCode::OK, Json(view)).into_response(),
            Err(err) => err.into_response(),
        },
        Err(response) => response,
    }
}

// Applies a command to the run and responds with the updated view.
pub async fn command_handler(
    Path(funnel_id): Path<String>,
    State(state): State<ApplicationState>,
    Json(command): Json<FunnelCommand>,
) -> Response {
    let controller = match lookup(&state, &funnel_id).await {
        Ok(controller) => controller,
        Err(response) => return response,
    };
    let result = match command {
        FunnelCommand::SubmitJourney { journey } => controller.submit_journey(journey).await,
        command => controller.execute(command).await,
    };
    match result {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => {
            warn!(%funnel_id, error = %err, "command rejected");
            err.into_response()
        }
    }
}

// The vehicle step's list: every quote with its availability flag.
pub async fn vehicles_handler(
    Path(funnel_id): Path<String>,
    State(state): State<ApplicationState>,
) -> Response {
    match lookup(&state, &funnel_id).await {
        Ok(controller) => match controller.vehicle_list().await {
            Ok(list) => (StatusCode::OK, Json(list)).into_response(),
            Err(err) => err.into_response(),
        },
        Err(response) => response,
    }
}

pub async fn payment_config_handler(State(state): State<ApplicationState>) -> Response {
    (StatusCode::OK, Json(state.payment)).into_response()
}

#[derive(Debug, Serialize)]
pub struct ReconciliationReport {
    pub pending: Vec<ReconciliationJob>,
    pub abandoned: Vec<ReconciliationJob>,
}

// Paid-status updates still queued for retry, and those given up on.
pub async fn reconciliation_handler(State(state): State<ApplicationState>) -> Response {
    let queue = state.funnels.services().reconciliation();
    let report = ReconciliationReport {
        pending: queue.pending().await,
        abandoned: queue.abandoned().await,
    };
    (StatusCode::OK, Json(report)).into_response()
}
