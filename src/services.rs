pub mod booking_record;
pub mod fare_quote;
pub mod payment_confirmation;
pub mod payment_intent;
pub mod reconciliation;

#[cfg(test)]
pub(crate) mod testing;

use reqwest::Response;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure talking to one of the funnel's backend collaborators.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Reads a JSON body, turning non-2xx statuses into `Unavailable` (5xx) or
/// `Rejected` (everything else) with whatever message the service sent.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {body}")
        };
        return Err(if status.is_server_error() {
            ServiceError::Unavailable(message)
        } else {
            ServiceError::Rejected(message)
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ServiceError::Decode(e.to_string()))
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
