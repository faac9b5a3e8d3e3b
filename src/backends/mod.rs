//! Backend adapter contracts: polymorphic capability sets for the concrete
//! stock/payment/pricing/notification systems a deployment plugs in. Only the
//! contracts are specified here; mock implementations back local runs and tests.

pub mod mock;
pub mod notification;
pub mod payment;
pub mod pricing;
pub mod stock;

pub use notification::NotificationBackend;
pub use payment::PaymentBackend;
pub use pricing::PricingBackend;
pub use stock::StockBackend;

use std::sync::Arc;

/// Bundles the four backend contracts behind `Arc` so engines and directive
/// handlers can share one set of adapters without cloning the adapters themselves.
#[derive(Clone)]
pub struct Backends {
    pub stock: Arc<dyn StockBackend>,
    pub payment: Arc<dyn PaymentBackend>,
    pub pricing: Arc<dyn PricingBackend>,
    pub notification: Arc<dyn NotificationBackend>,
}

impl Backends {
    pub fn mock() -> Self {
        Self {
            stock: Arc::new(mock::MockStockBackend::default()),
            payment: Arc::new(mock::MockPaymentBackend::default()),
            pricing: Arc::new(mock::MockPricingBackend::default()),
            notification: Arc::new(mock::MockNotificationBackend::default()),
        }
    }
}
