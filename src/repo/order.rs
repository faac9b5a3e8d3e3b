use crate::models::order::{Order, OrderItem, OrderLifecycleTimestamps, OrderSnapshot, OrderStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

pub struct OrderRepo {
    pool: PgPool,
}

impl OrderRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_session_key(&self, session_key: &str) -> Result<Option<Order>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, ref, channel_code, session_key, handle_type, handle_ref, external_ref,
                   status, snapshot, currency, total_q, created_at, timestamps
            FROM orders_tb
            WHERE session_key = $1
            "#,
        )
        .bind(session_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_order(row)?))
    }

    pub async fn find_by_ref(&self, order_ref: &str) -> Result<Option<Order>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, ref, channel_code, session_key, handle_type, handle_ref, external_ref,
                   status, snapshot, currency, total_q, created_at, timestamps
            FROM orders_tb
            WHERE ref = $1
            "#,
        )
        .bind(order_ref)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_order(row)?))
    }

    pub async fn list(&self, channel_code: Option<&str>) -> Result<Vec<Order>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, ref, channel_code, session_key, handle_type, handle_ref, external_ref,
                   status, snapshot, currency, total_q, created_at, timestamps
            FROM orders_tb
            WHERE $1::text IS NULL OR channel_code = $1
            ORDER BY created_at DESC
            LIMIT 200
            "#,
        )
        .bind(channel_code)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_order).collect()
    }

    pub async fn find_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_ref: &str,
    ) -> Result<Option<Order>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, ref, channel_code, session_key, handle_type, handle_ref, external_ref,
                   status, snapshot, currency, total_q, created_at, timestamps
            FROM orders_tb
            WHERE ref = $1
            FOR UPDATE
            "#,
        )
        .bind(order_ref)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_order(row)?))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_ref: &str,
        channel_code: &str,
        session_key: &str,
        handle_type: Option<&str>,
        handle_ref: Option<&str>,
        snapshot: &OrderSnapshot,
        currency: &str,
        total_q: i64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64, sqlx::Error> {
        let timestamps = OrderLifecycleTimestamps::default();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders_tb
                (ref, channel_code, session_key, handle_type, handle_ref, external_ref,
                 status, snapshot, currency, total_q, created_at, timestamps)
            VALUES ($1, $2, $3, $4, $5, NULL, 'new', $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(order_ref)
        .bind(channel_code)
        .bind(session_key)
        .bind(handle_type)
        .bind(handle_ref)
        .bind(serde_json::to_value(snapshot).unwrap_or_default())
        .bind(currency)
        .bind(total_q)
        .bind(now)
        .bind(serde_json::to_value(&timestamps).unwrap_or_default())
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    pub async fn insert_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        items: &[OrderItem],
    ) -> Result<(), sqlx::Error> {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items_tb (order_id, line_id, sku, qty, unit_price_q, line_total_q, name)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order_id)
            .bind(&item.line_id)
            .bind(&item.sku)
            .bind(item.qty)
            .bind(item.unit_price_q)
            .bind(item.line_total_q)
            .bind(&item.name)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub async fn update_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE orders_tb SET status = $1, timestamps = $2 WHERE id = $3")
            .bind(order.status().as_str())
            .bind(serde_json::to_value(&order.timestamps).unwrap_or_default())
            .bind(order.id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn emit_event(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        event_type: &str,
        actor: &str,
        payload: serde_json::Value,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO order_events_tb (order_id, type, actor, payload, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order_id)
        .bind(event_type)
        .bind(actor)
        .bind(payload)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn row_to_order(row: PgRow) -> Result<Order, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = OrderStatus::parse(&status_str).unwrap_or(OrderStatus::New);
    let snapshot_json: serde_json::Value = row.try_get("snapshot")?;
    let timestamps_json: serde_json::Value = row.try_get("timestamps")?;

    Ok(Order::from_row_parts(
        row.try_get("id")?,
        row.try_get("ref")?,
        row.try_get("channel_code")?,
        row.try_get("session_key")?,
        row.try_get("handle_type")?,
        row.try_get("handle_ref")?,
        row.try_get("external_ref")?,
        status,
        serde_json::from_value(snapshot_json).unwrap_or(OrderSnapshot {
            items: vec![],
            data: crate::models::session::SessionData::default(),
            pricing: crate::models::session::PricingAggregate::default(),
            rev: 0,
        }),
        row.try_get("currency")?,
        row.try_get("total_q")?,
        row.try_get("created_at")?,
        serde_json::from_value(timestamps_json).unwrap_or_default(),
    ))
}
