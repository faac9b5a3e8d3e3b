//! Payment backend contract: intent lifecycle (create, authorize, capture, refund, cancel).

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PaymentBackendError {
    #[error("payment backend unavailable: {0}")]
    Unavailable(String),
    #[error("intent {0} not found")]
    IntentNotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Created,
    Authorized,
    Captured,
    Refunded,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub status: PaymentStatus,
    pub amount_q: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentBackend: Send + Sync {
    async fn create_intent(
        &self,
        amount_q: i64,
        currency: &str,
        reference: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<PaymentIntent, PaymentBackendError>;

    async fn authorize(&self, intent_id: &str) -> Result<PaymentIntent, PaymentBackendError>;

    async fn capture(
        &self,
        intent_id: &str,
        amount_q: Option<i64>,
        reference: Option<&str>,
    ) -> Result<PaymentIntent, PaymentBackendError>;

    async fn refund(
        &self,
        intent_id: &str,
        amount_q: Option<i64>,
        reason: Option<&str>,
    ) -> Result<PaymentIntent, PaymentBackendError>;

    async fn cancel(&self, intent_id: &str) -> Result<PaymentIntent, PaymentBackendError>;

    async fn get_status(&self, intent_id: &str) -> Result<PaymentIntent, PaymentBackendError>;
}
