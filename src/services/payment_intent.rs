use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::events::ClientSecret;
use crate::services::{ServiceError, endpoint, read_json};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    /// Full draft snapshot for server side reconciliation and audit.
    pub booking_data: Value,
    pub booking_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    pub client_secret: ClientSecret,
    pub is_test_mode: bool,
}

#[async_trait]
pub trait PaymentIntentService: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentResponse {
    success: bool,
    #[serde(default)]
    client_secret: Option<ClientSecret>,
    #[serde(default)]
    is_test_mode: bool,
    #[serde(default)]
    message: Option<String>,
}

pub struct HttpPaymentIntentService {
    client: Client,
    base_url: String,
}

impl HttpPaymentIntentService {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PaymentIntentService for HttpPaymentIntentService {
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "payments/create-intent"))
            .json(request)
            .send()
            .await?;
        let body: IntentResponse = read_json(response).await?;
        if !body.success {
            return Err(ServiceError::Rejected(body.message.unwrap_or_else(|| {
                "payment intent was not created".to_string()
            })));
        }
        let client_secret = body
            .client_secret
            .ok_or_else(|| ServiceError::Decode("payment intent has no client secret".to_string()))?;
        Ok(PaymentIntent {
            client_secret,
            is_test_mode: body.is_test_mode,
        })
    }
}
