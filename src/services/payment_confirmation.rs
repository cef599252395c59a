use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::events::ClientSecret;
use crate::services::{ServiceError, endpoint, read_json};

const SUCCEEDED: &str = "succeeded";

/// A payment the provider reports as taken.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfirmedPayment {
    pub id: String,
    pub status: String,
}

/// Confirms a payment intent against its client secret. Declines come back as
/// `ServiceError::Rejected` carrying the provider's message.
#[async_trait]
pub trait PaymentConfirmer: Send + Sync {
    async fn confirm(&self, client_secret: &ClientSecret) -> Result<ConfirmedPayment, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfirmResponse {
    Confirmed {
        #[serde(rename = "paymentIntent")]
        payment_intent: ConfirmedPayment,
    },
    Failed {
        error: ProviderError,
    },
}

impl ConfirmResponse {
    fn into_result(self) -> Result<ConfirmedPayment, ServiceError> {
        match self {
            ConfirmResponse::Confirmed { payment_intent } if payment_intent.status == SUCCEEDED => {
                Ok(payment_intent)
            }
            ConfirmResponse::Confirmed { payment_intent } => Err(ServiceError::Rejected(format!(
                "payment {} is {}",
                payment_intent.id, payment_intent.status
            ))),
            ConfirmResponse::Failed { error } => Err(ServiceError::Rejected(
                error
                    .message
                    .unwrap_or_else(|| "payment was declined".to_string()),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRequest<'a> {
    client_secret: &'a str,
}

/// Stands in for the embedded payment form: posts the client secret to the
/// provider's confirm endpoint using the publishable key for the session.
pub struct HttpPaymentConfirmer {
    client: Client,
    base_url: String,
    publishable_key: String,
}

impl HttpPaymentConfirmer {
    pub fn new(client: Client, base_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            publishable_key: publishable_key.into(),
        }
    }
}

#[async_trait]
impl PaymentConfirmer for HttpPaymentConfirmer {
    async fn confirm(&self, client_secret: &ClientSecret) -> Result<ConfirmedPayment, ServiceError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "payment_intents/confirm"))
            .bearer_auth(&self.publishable_key)
            .json(&ConfirmRequest {
                client_secret: client_secret.expose(),
            })
            .send()
            .await?;
        let body: ConfirmResponse = read_json(response).await?;
        body.into_result()
    }
}
