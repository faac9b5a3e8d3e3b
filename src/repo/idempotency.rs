use crate::models::idempotency::{IdempotencyKey, IdempotencyStatus};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

pub struct IdempotencyRepo {
    pool: PgPool,
}

impl IdempotencyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn find_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        scope: &str,
        key: &str,
    ) -> Result<Option<IdempotencyKey>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, scope, key, status, response_code, response_body, expires_at, created_at
            FROM idempotency_keys_tb
            WHERE scope = $1 AND key = $2
            FOR UPDATE
            "#,
        )
        .bind(scope)
        .bind(key)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_key(row)?))
    }

    pub async fn insert_in_progress(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        scope: &str,
        key: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO idempotency_keys_tb (scope, key, status, expires_at, created_at)
            VALUES ($1, $2, 'in_progress', $3, $4)
            RETURNING id
            "#,
        )
        .bind(scope)
        .bind(key)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    pub async fn reset_in_progress(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE idempotency_keys_tb SET status = 'in_progress', expires_at = $1 WHERE id = $2")
            .bind(expires_at)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn mark_done(
        &self,
        id: i64,
        response_code: i32,
        response_body: serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE idempotency_keys_tb SET status = 'done', response_code = $1, response_body = $2 WHERE id = $3",
        )
        .bind(response_code)
        .bind(response_body)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks a row `failed` on its own connection, independent of the
    /// (already rolled back) inner commit transaction.
    pub async fn mark_failed(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE idempotency_keys_tb SET status = 'failed' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes expired rows, and old done/failed rows older than `cutoff`;
    /// optionally also orphaned in-progress rows older than one hour.
    pub async fn cleanup(
        &self,
        cutoff: DateTime<Utc>,
        include_in_progress: bool,
        dry_run: bool,
    ) -> Result<u64, sqlx::Error> {
        if dry_run {
            let count: i64 = sqlx::query_scalar(&cleanup_count_query(include_in_progress))
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;
            return Ok(count as u64);
        }
        let result = sqlx::query(&cleanup_delete_query(include_in_progress))
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn cleanup_predicate(include_in_progress: bool) -> &'static str {
    if include_in_progress {
        "(expires_at < now() OR created_at < $1 OR (status = 'in_progress' AND created_at < now() - interval '1 hour'))"
    } else {
        "(expires_at < now() OR created_at < $1)"
    }
}

fn cleanup_count_query(include_in_progress: bool) -> String {
    format!(
        "SELECT count(*) FROM idempotency_keys_tb WHERE {}",
        cleanup_predicate(include_in_progress)
    )
}

fn cleanup_delete_query(include_in_progress: bool) -> String {
    format!(
        "DELETE FROM idempotency_keys_tb WHERE {}",
        cleanup_predicate(include_in_progress)
    )
}

fn row_to_key(row: PgRow) -> Result<IdempotencyKey, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(IdempotencyKey {
        id: row.try_get("id")?,
        scope: row.try_get("scope")?,
        key: row.try_get("key")?,
        status: IdempotencyStatus::parse(&status).unwrap_or(IdempotencyStatus::InProgress),
        response_code: row.try_get("response_code")?,
        response_body: row.try_get("response_body")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}
