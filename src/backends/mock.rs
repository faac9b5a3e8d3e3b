//! In-process mock backends: deterministic, no network I/O, with knobs to
//! inject failures for exercising worker error paths in tests.

use super::notification::{NotificationBackend, NotificationBackendError, NotificationResult};
use super::payment::{PaymentBackend, PaymentBackendError, PaymentIntent, PaymentStatus};
use super::pricing::{PricingBackend, PricingBackendError};
use super::stock::{Alternative, Availability, Hold, StockBackend, StockBackendError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// Stock mock with a configurable per-SKU stock level. Defaults to "always
/// available" so most tests don't need setup; call `set_stock` to simulate
/// shortages.
pub struct MockStockBackend {
    stock: DashMap<String, Decimal>,
    holds: DashMap<String, Hold>,
    next_hold_id: AtomicI64,
    pub fail_next_create_hold: AtomicBool,
}

impl Default for MockStockBackend {
    fn default() -> Self {
        Self {
            stock: DashMap::new(),
            holds: DashMap::new(),
            next_hold_id: AtomicI64::new(1),
            fail_next_create_hold: AtomicBool::new(false),
        }
    }
}

impl MockStockBackend {
    pub fn set_stock(&self, sku: &str, qty: Decimal) {
        self.stock.insert(sku.to_string(), qty);
    }
}

#[async_trait]
impl StockBackend for MockStockBackend {
    async fn check_availability(
        &self,
        sku: &str,
        qty: Decimal,
    ) -> Result<Availability, StockBackendError> {
        let available_qty = self
            .stock
            .get(sku)
            .map(|v| *v)
            .unwrap_or_else(|| Decimal::new(1_000_000, 0));
        Ok(Availability {
            sku: sku.to_string(),
            available_qty,
            is_available: available_qty >= qty,
        })
    }

    async fn create_hold(
        &self,
        sku: &str,
        qty: Decimal,
        expires_at: DateTime<Utc>,
        reference: &str,
    ) -> Result<Hold, StockBackendError> {
        if self.fail_next_create_hold.swap(false, Ordering::SeqCst) {
            return Err(StockBackendError::Unavailable("injected failure".into()));
        }
        let id = self.next_hold_id.fetch_add(1, Ordering::SeqCst);
        let hold = Hold {
            hold_id: format!("H{id}"),
            sku: sku.to_string(),
            qty,
            expires_at,
            reference: reference.to_string(),
        };
        self.holds.insert(hold.hold_id.clone(), hold.clone());
        Ok(hold)
    }

    async fn release_hold(&self, hold_id: &str) -> Result<(), StockBackendError> {
        self.holds.remove(hold_id);
        Ok(())
    }

    async fn fulfill_hold(&self, hold_id: &str, _reference: &str) -> Result<(), StockBackendError> {
        self.holds.remove(hold_id);
        Ok(())
    }

    async fn get_alternatives(&self, _sku: &str) -> Result<Vec<Alternative>, StockBackendError> {
        Ok(vec![])
    }

    async fn release_holds_for_reference(&self, reference: &str) -> Result<u32, StockBackendError> {
        let to_remove: Vec<String> = self
            .holds
            .iter()
            .filter(|entry| entry.value().reference == reference)
            .map(|entry| entry.key().clone())
            .collect();
        let count = to_remove.len() as u32;
        for id in to_remove {
            self.holds.remove(&id);
        }
        Ok(count)
    }
}

#[derive(Default)]
pub struct MockPaymentBackend {
    intents: DashMap<String, PaymentIntent>,
    next_id: AtomicI64,
}

#[async_trait]
impl PaymentBackend for MockPaymentBackend {
    async fn create_intent(
        &self,
        amount_q: i64,
        currency: &str,
        _reference: Option<&str>,
        _metadata: Option<serde_json::Value>,
    ) -> Result<PaymentIntent, PaymentBackendError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let intent = PaymentIntent {
            intent_id: format!("PI{id}"),
            status: PaymentStatus::Created,
            amount_q,
            currency: currency.to_string(),
        };
        self.intents.insert(intent.intent_id.clone(), intent.clone());
        Ok(intent)
    }

    async fn authorize(&self, intent_id: &str) -> Result<PaymentIntent, PaymentBackendError> {
        self.set_status(intent_id, PaymentStatus::Authorized)
    }

    async fn capture(
        &self,
        intent_id: &str,
        _amount_q: Option<i64>,
        _reference: Option<&str>,
    ) -> Result<PaymentIntent, PaymentBackendError> {
        self.set_status(intent_id, PaymentStatus::Captured)
    }

    async fn refund(
        &self,
        intent_id: &str,
        _amount_q: Option<i64>,
        _reason: Option<&str>,
    ) -> Result<PaymentIntent, PaymentBackendError> {
        self.set_status(intent_id, PaymentStatus::Refunded)
    }

    async fn cancel(&self, intent_id: &str) -> Result<PaymentIntent, PaymentBackendError> {
        self.set_status(intent_id, PaymentStatus::Cancelled)
    }

    async fn get_status(&self, intent_id: &str) -> Result<PaymentIntent, PaymentBackendError> {
        self.intents
            .get(intent_id)
            .map(|e| e.clone())
            .ok_or_else(|| PaymentBackendError::IntentNotFound(intent_id.to_string()))
    }
}

impl MockPaymentBackend {
    fn set_status(
        &self,
        intent_id: &str,
        status: PaymentStatus,
    ) -> Result<PaymentIntent, PaymentBackendError> {
        let mut entry = self
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| PaymentBackendError::IntentNotFound(intent_id.to_string()))?;
        entry.status = status;
        Ok(entry.clone())
    }
}

#[derive(Default)]
pub struct MockPricingBackend {
    prices: DashMap<String, i64>,
}

impl MockPricingBackend {
    pub fn set_price(&self, sku: &str, price_q: i64) {
        self.prices.insert(sku.to_string(), price_q);
    }
}

#[async_trait]
impl PricingBackend for MockPricingBackend {
    async fn get_price(&self, sku: &str, _channel_code: &str) -> Result<Option<i64>, PricingBackendError> {
        Ok(self.prices.get(sku).map(|v| *v))
    }
}

#[derive(Default)]
pub struct MockNotificationBackend {
    pub sent_count: AtomicI64,
}

#[async_trait]
impl NotificationBackend for MockNotificationBackend {
    async fn send(
        &self,
        _event: &str,
        _recipient: &str,
        _context: serde_json::Value,
    ) -> Result<NotificationResult, NotificationBackendError> {
        self.sent_count.fetch_add(1, Ordering::SeqCst);
        Ok(NotificationResult {
            success: true,
            message_id: Some("mock-message".to_string()),
            error: None,
        })
    }
}

/// Convenience constructor mirroring `Backends::mock()` but returning the
/// concrete types so tests can poke at hold/intent state directly.
pub fn mock_stock() -> Arc<MockStockBackend> {
    Arc::new(MockStockBackend::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn check_availability_defaults_to_plentiful() {
        let backend = MockStockBackend::default();
        let avail = backend
            .check_availability("COFFEE", Decimal::new(2, 0))
            .await
            .unwrap();
        assert!(avail.is_available);
    }

    #[tokio::test]
    async fn check_availability_honors_configured_shortage() {
        let backend = MockStockBackend::default();
        backend.set_stock("COFFEE", Decimal::new(2, 0));
        let avail = backend
            .check_availability("COFFEE", Decimal::new(10, 0))
            .await
            .unwrap();
        assert!(!avail.is_available);
        assert_eq!(avail.available_qty, Decimal::new(2, 0));
    }

    #[tokio::test]
    async fn release_holds_for_reference_is_idempotent() {
        let backend = MockStockBackend::default();
        backend
            .create_hold("COFFEE", Decimal::new(1, 0), Utc::now(), "SESS-1")
            .await
            .unwrap();
        let released = backend.release_holds_for_reference("SESS-1").await.unwrap();
        assert_eq!(released, 1);
        let released_again = backend.release_holds_for_reference("SESS-1").await.unwrap();
        assert_eq!(released_again, 0);
    }

    #[tokio::test]
    async fn payment_capture_round_trip() {
        let backend = MockPaymentBackend::default();
        let intent = backend.create_intent(1000, "BRL", None, None).await.unwrap();
        let captured = backend.capture(&intent.intent_id, None, None).await.unwrap();
        assert_eq!(captured.status, PaymentStatus::Captured);
    }
}
