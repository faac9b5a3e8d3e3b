use crate::models::directive::{Directive, DirectiveStatus};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

pub struct DirectiveRepo {
    pool: PgPool,
}

impl DirectiveRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        topic: &str,
        payload: serde_json::Value,
        available_at: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO directives_tb (topic, status, payload, attempts, available_at, created_at, updated_at)
            VALUES ($1, 'queued', $2, 0, $3, $3, $3)
            RETURNING id
            "#,
        )
        .bind(topic)
        .bind(payload)
        .bind(available_at)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    /// Polls up to `limit` queued, due directives on `topics`, ordered by
    /// `(available_at, id)` — the order the worker processes them in.
    pub async fn poll_due(&self, topics: &[String], limit: i64) -> Result<Vec<Directive>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, topic, status, payload, attempts, available_at, last_error, created_at, started_at, updated_at
            FROM directives_tb
            WHERE status = 'queued' AND topic = ANY($1) AND available_at <= now()
            ORDER BY available_at, id
            LIMIT $2
            "#,
        )
        .bind(topics)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_directive).collect()
    }

    /// Lists the most recently created directives, newest first. Used by the
    /// read-only `GET /directives` listing endpoint.
    pub async fn list(&self, limit: i64) -> Result<Vec<Directive>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, topic, status, payload, attempts, available_at, last_error, created_at, started_at, updated_at
            FROM directives_tb
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_directive).collect()
    }

    pub async fn mark_running(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE directives_tb SET status = 'running', attempts = attempts + 1, started_at = now(), updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_done(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE directives_tb SET status = 'done', updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: i64, last_error: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE directives_tb SET status = 'failed', last_error = $1, updated_at = now() WHERE id = $2")
            .bind(last_error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Resets `failed` directives older than `cutoff` back to `queued`, for
    /// operator-driven retries. Returns the count reset.
    pub async fn requeue_failed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE directives_tb SET status = 'queued', updated_at = now() WHERE status = 'failed' AND updated_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_directive(row: PgRow) -> Result<Directive, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Directive {
        id: row.try_get("id")?,
        topic: row.try_get("topic")?,
        status: DirectiveStatus::parse(&status).unwrap_or(DirectiveStatus::Queued),
        payload: row.try_get("payload")?,
        attempts: row.try_get("attempts")?,
        available_at: row.try_get("available_at")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
