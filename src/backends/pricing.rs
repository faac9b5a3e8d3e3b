//! Pricing backend contract: authoritative price lookup for channels with
//! `pricing_policy = internal`.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PricingBackendError {
    #[error("pricing backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PricingBackend: Send + Sync {
    /// Returns the unit price in minor units for `sku` on `channel_code`, or
    /// `None` if the backend has no price on file for it.
    async fn get_price(&self, sku: &str, channel_code: &str) -> Result<Option<i64>, PricingBackendError>;
}
