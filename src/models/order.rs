//! Order: an immutable sealed snapshot of a committed session, plus its
//! append-only lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Confirmed,
    Processing,
    Ready,
    Dispatched,
    Delivered,
    Completed,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Dispatched => "dispatched",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Returned => "returned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "new" => Self::New,
            "confirmed" => Self::Confirmed,
            "processing" => Self::Processing,
            "ready" => Self::Ready,
            "dispatched" => Self::Dispatched,
            "delivered" => Self::Delivered,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            "returned" => Self::Returned,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub items: Vec<crate::models::session::LineItem>,
    pub data: crate::models::session::SessionData,
    pub pricing: crate::models::session::PricingAggregate,
    pub rev: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLifecycleTimestamps {
    pub confirmed_at: Option<DateTime<Utc>>,
    pub processing_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl Default for OrderLifecycleTimestamps {
    fn default() -> Self {
        Self {
            confirmed_at: None,
            processing_at: None,
            ready_at: None,
            dispatched_at: None,
            delivered_at: None,
            completed_at: None,
            cancelled_at: None,
            returned_at: None,
        }
    }
}

impl OrderLifecycleTimestamps {
    /// Returns the timestamp slot for `status`, if it has one (every status but `new`).
    pub fn get(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
        match status {
            OrderStatus::New => None,
            OrderStatus::Confirmed => self.confirmed_at,
            OrderStatus::Processing => self.processing_at,
            OrderStatus::Ready => self.ready_at,
            OrderStatus::Dispatched => self.dispatched_at,
            OrderStatus::Delivered => self.delivered_at,
            OrderStatus::Completed => self.completed_at,
            OrderStatus::Cancelled => self.cancelled_at,
            OrderStatus::Returned => self.returned_at,
        }
    }

    /// Stamps `status`'s timestamp with `at` unless it is already set.
    pub fn stamp_if_unset(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        let slot = match status {
            OrderStatus::New => return,
            OrderStatus::Confirmed => &mut self.confirmed_at,
            OrderStatus::Processing => &mut self.processing_at,
            OrderStatus::Ready => &mut self.ready_at,
            OrderStatus::Dispatched => &mut self.dispatched_at,
            OrderStatus::Delivered => &mut self.delivered_at,
            OrderStatus::Completed => &mut self.completed_at,
            OrderStatus::Cancelled => &mut self.cancelled_at,
            OrderStatus::Returned => &mut self.returned_at,
        };
        if slot.is_none() {
            *slot = Some(at);
        }
    }
}

/// Sealed order. `status` is intentionally private: the only way to change it
/// is [`Order::transition_to`] (the commit engine sets the initial `New` value
/// via [`Order::new_from_commit`]). There is no public setter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub r#ref: String,
    pub channel_code: String,
    pub session_key: String,
    pub handle_type: Option<String>,
    pub handle_ref: Option<String>,
    pub external_ref: Option<String>,
    status: OrderStatus,
    pub snapshot: OrderSnapshot,
    pub currency: String,
    pub total_q: i64,
    pub created_at: DateTime<Utc>,
    pub timestamps: OrderLifecycleTimestamps,
}

impl Order {
    /// Constructs a brand-new order in `status = new`. Only the commit engine
    /// should call this.
    #[allow(clippy::too_many_arguments)]
    pub fn new_from_commit(
        id: i64,
        r#ref: String,
        channel_code: String,
        session_key: String,
        handle_type: Option<String>,
        handle_ref: Option<String>,
        snapshot: OrderSnapshot,
        currency: String,
        total_q: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            r#ref,
            channel_code,
            session_key,
            handle_type,
            handle_ref,
            external_ref: None,
            status: OrderStatus::New,
            snapshot,
            currency,
            total_q,
            created_at,
            timestamps: OrderLifecycleTimestamps::default(),
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Reconstructs an order from a persisted row. Used only by the repository
    /// layer when hydrating from storage, where `status` is already validated.
    #[allow(clippy::too_many_arguments)]
    pub fn from_row_parts(
        id: i64,
        r#ref: String,
        channel_code: String,
        session_key: String,
        handle_type: Option<String>,
        handle_ref: Option<String>,
        external_ref: Option<String>,
        status: OrderStatus,
        snapshot: OrderSnapshot,
        currency: String,
        total_q: i64,
        created_at: DateTime<Utc>,
        timestamps: OrderLifecycleTimestamps,
    ) -> Self {
        Self {
            id,
            r#ref,
            channel_code,
            session_key,
            handle_type,
            handle_ref,
            external_ref,
            status,
            snapshot,
            currency,
            total_q,
            created_at,
            timestamps,
        }
    }

    /// Applies a validated transition in-memory: sets `status`, stamps the
    /// lifecycle timestamp if unset, and returns the `status_changed` event
    /// payload the caller must persist as an [`OrderEvent`].
    pub fn transition_to(&mut self, new_status: OrderStatus, at: DateTime<Utc>) -> (OrderStatus, OrderStatus) {
        let old_status = self.status;
        self.status = new_status;
        self.timestamps.stamp_if_unset(new_status, at);
        (old_status, new_status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub line_id: String,
    pub sku: String,
    pub qty: rust_decimal::Decimal,
    pub unit_price_q: Option<i64>,
    pub line_total_q: i64,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: i64,
    pub order_id: i64,
    pub r#type: String,
    pub actor: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_order() -> Order {
        Order::new_from_commit(
            1,
            "ORD-20260101-AAAAAAAA".into(),
            "pos".into(),
            "SESS-AAAAAAAAAAAA".into(),
            None,
            None,
            OrderSnapshot {
                items: vec![],
                data: crate::models::session::SessionData::default(),
                pricing: crate::models::session::PricingAggregate::default(),
                rev: 1,
            },
            "BRL".into(),
            1000,
            Utc::now(),
        )
    }

    #[test]
    fn new_order_has_new_status_and_no_timestamps() {
        let order = sample_order();
        assert_eq!(order.status(), OrderStatus::New);
        assert!(order.timestamps.confirmed_at.is_none());
    }

    #[test]
    fn transition_stamps_timestamp_once() {
        let mut order = sample_order();
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap();

        order.transition_to(OrderStatus::Confirmed, t1);
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(order.timestamps.confirmed_at, Some(t1));

        // Re-stamping the same status (e.g. a replayed event) must not overwrite.
        order.timestamps.stamp_if_unset(OrderStatus::Confirmed, t2);
        assert_eq!(order.timestamps.confirmed_at, Some(t1));
    }

    #[test]
    fn status_as_str_round_trips() {
        for s in [
            OrderStatus::New,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Ready,
            OrderStatus::Dispatched,
            OrderStatus::Delivered,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::Returned,
        ] {
            assert_eq!(OrderStatus::parse(s.as_str()), Some(s));
        }
    }
}
