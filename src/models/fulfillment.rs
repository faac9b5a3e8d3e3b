//! Fulfillment / FulfillmentItem: optional grouping of order items under a
//! shipment lifecycle. Specified only structurally; transitions are out of
//! core scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    InProgress,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fulfillment {
    pub id: i64,
    pub order_id: i64,
    pub status: FulfillmentStatus,
    pub carrier: Option<String>,
    pub tracking_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentItem {
    pub id: i64,
    pub fulfillment_id: i64,
    pub order_item_id: i64,
    pub qty: rust_decimal::Decimal,
}
