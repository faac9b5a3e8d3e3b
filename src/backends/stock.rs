//! Stock backend contract: inventory availability checks and time-bounded holds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StockBackendError {
    #[error("stock backend unavailable: {0}")]
    Unavailable(String),
    #[error("hold {0} not found")]
    HoldNotFound(String),
}

#[derive(Debug, Clone)]
pub struct Availability {
    pub sku: String,
    pub available_qty: rust_decimal::Decimal,
    pub is_available: bool,
}

#[derive(Debug, Clone)]
pub struct Hold {
    pub hold_id: String,
    pub sku: String,
    pub qty: rust_decimal::Decimal,
    pub expires_at: DateTime<Utc>,
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct Alternative {
    pub sku: String,
    pub available_qty: rust_decimal::Decimal,
}

#[async_trait]
pub trait StockBackend: Send + Sync {
    async fn check_availability(
        &self,
        sku: &str,
        qty: rust_decimal::Decimal,
    ) -> Result<Availability, StockBackendError>;

    async fn create_hold(
        &self,
        sku: &str,
        qty: rust_decimal::Decimal,
        expires_at: DateTime<Utc>,
        reference: &str,
    ) -> Result<Hold, StockBackendError>;

    async fn release_hold(&self, hold_id: &str) -> Result<(), StockBackendError>;

    async fn fulfill_hold(&self, hold_id: &str, reference: &str) -> Result<(), StockBackendError>;

    async fn get_alternatives(&self, sku: &str) -> Result<Vec<Alternative>, StockBackendError>;

    /// Releases every hold tagged with `reference`, returning how many were released.
    /// Used by the stock-hold handler for idempotent retries.
    async fn release_holds_for_reference(&self, reference: &str) -> Result<u32, StockBackendError>;
}
