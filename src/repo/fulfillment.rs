//! Fulfillment rows: ordinary, structural persistence only — no status
//! transition logic lives here (out of core scope; see `models::fulfillment`).

use crate::models::fulfillment::{Fulfillment, FulfillmentItem, FulfillmentStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct FulfillmentRepo {
    pool: PgPool,
}

impl FulfillmentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        order_id: i64,
        carrier: Option<&str>,
        tracking_code: Option<&str>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64, sqlx::Error> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO fulfillments_tb (order_id, status, carrier, tracking_code, created_at, updated_at)
            VALUES ($1, 'pending', $2, $3, $4, $4)
            RETURNING id
            "#,
        )
        .bind(order_id)
        .bind(carrier)
        .bind(tracking_code)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn add_item(&self, fulfillment_id: i64, order_item_id: i64, qty: rust_decimal::Decimal) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO fulfillment_items_tb (fulfillment_id, order_item_id, qty) VALUES ($1, $2, $3)")
            .bind(fulfillment_id)
            .bind(order_item_id)
            .bind(qty)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_for_order(&self, order_id: i64) -> Result<Vec<Fulfillment>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, status, carrier, tracking_code, created_at, updated_at
            FROM fulfillments_tb
            WHERE order_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_fulfillment).collect()
    }

    pub async fn items_for(&self, fulfillment_id: i64) -> Result<Vec<FulfillmentItem>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, fulfillment_id, order_item_id, qty
            FROM fulfillment_items_tb
            WHERE fulfillment_id = $1
            "#,
        )
        .bind(fulfillment_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row: PgRow| {
                Ok(FulfillmentItem {
                    id: row.try_get("id")?,
                    fulfillment_id: row.try_get("fulfillment_id")?,
                    order_item_id: row.try_get("order_item_id")?,
                    qty: row.try_get("qty")?,
                })
            })
            .collect()
    }
}

fn row_to_fulfillment(row: PgRow) -> Result<Fulfillment, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Fulfillment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        status: match status.as_str() {
            "in_progress" => FulfillmentStatus::InProgress,
            "shipped" => FulfillmentStatus::Shipped,
            "delivered" => FulfillmentStatus::Delivered,
            "cancelled" => FulfillmentStatus::Cancelled,
            _ => FulfillmentStatus::Pending,
        },
        carrier: row.try_get("carrier")?,
        tracking_code: row.try_get("tracking_code")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
