use crate::models::refs::{Ref, RefScope, TargetKind};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

pub struct RefRepo {
    pool: PgPool,
}

impl RefRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds an active ref matching `(ref_type_slug, value, scope)`, locking
    /// candidate rows so concurrent `attach_ref` calls serialize.
    pub async fn find_active_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ref_type_slug: &str,
        value: &str,
        scope: &RefScope,
    ) -> Result<Option<Ref>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, ref_type_slug, target_kind, target_id, value, scope, is_active
            FROM refs_tb
            WHERE ref_type_slug = $1 AND value = $2 AND scope = $3 AND is_active = true
            FOR UPDATE
            "#,
        )
        .bind(ref_type_slug)
        .bind(value)
        .bind(serde_json::to_value(scope).unwrap_or_default())
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_ref(row)?))
    }

    pub async fn create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ref_type_slug: &str,
        target_kind: TargetKind,
        target_id: i64,
        value: &str,
        scope: &RefScope,
    ) -> Result<i64, sqlx::Error> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO refs_tb (ref_type_slug, target_kind, target_id, value, scope, is_active)
            VALUES ($1, $2, $3, $4, $5, true)
            RETURNING id
            "#,
        )
        .bind(ref_type_slug)
        .bind(target_kind.as_str())
        .bind(target_id)
        .bind(value)
        .bind(serde_json::to_value(scope).unwrap_or_default())
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    pub async fn resolve(
        &self,
        ref_type_slug: &str,
        value: &str,
        scope: &RefScope,
    ) -> Result<Option<(TargetKind, i64)>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT target_kind, target_id FROM refs_tb
            WHERE ref_type_slug = $1 AND value = $2 AND scope = $3 AND is_active = true
            "#,
        )
        .bind(ref_type_slug)
        .bind(value)
        .bind(serde_json::to_value(scope).unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let kind_str: String = row.try_get("target_kind")?;
        let kind = if kind_str == "order" { TargetKind::Order } else { TargetKind::Session };
        Ok(Some((kind, row.try_get("target_id")?)))
    }

    pub async fn deactivate(
        &self,
        target_kind: TargetKind,
        target_id: i64,
        ref_type_slugs: Option<&[String]>,
    ) -> Result<u64, sqlx::Error> {
        let result = if let Some(slugs) = ref_type_slugs {
            sqlx::query(
                "UPDATE refs_tb SET is_active = false WHERE target_kind = $1 AND target_id = $2 AND ref_type_slug = ANY($3) AND is_active = true",
            )
            .bind(target_kind.as_str())
            .bind(target_id)
            .bind(slugs)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE refs_tb SET is_active = false WHERE target_kind = $1 AND target_id = $2 AND is_active = true",
            )
            .bind(target_kind.as_str())
            .bind(target_id)
            .execute(&self.pool)
            .await?
        };
        Ok(result.rows_affected())
    }

    pub async fn active_for_target(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        target_kind: TargetKind,
        target_id: i64,
    ) -> Result<Vec<Ref>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, ref_type_slug, target_kind, target_id, value, scope, is_active
            FROM refs_tb
            WHERE target_kind = $1 AND target_id = $2 AND is_active = true
            "#,
        )
        .bind(target_kind.as_str())
        .bind(target_id)
        .fetch_all(&mut **tx)
        .await?;
        rows.into_iter().map(row_to_ref).collect()
    }

    /// Atomically increments the named sequence within `(sequence_name,
    /// scope_hash)` and returns the new value.
    pub async fn next_sequence_value(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sequence_name: &str,
        scope_hash: &str,
    ) -> Result<i64, sqlx::Error> {
        let counter: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO ref_sequences_tb (sequence_name, scope_hash, counter)
            VALUES ($1, $2, 1)
            ON CONFLICT (sequence_name, scope_hash) DO UPDATE
                SET counter = ref_sequences_tb.counter + 1
            RETURNING counter
            "#,
        )
        .bind(sequence_name)
        .bind(scope_hash)
        .fetch_one(&mut **tx)
        .await?;
        Ok(counter)
    }
}

fn row_to_ref(row: PgRow) -> Result<Ref, sqlx::Error> {
    let kind_str: String = row.try_get("target_kind")?;
    let scope_json: serde_json::Value = row.try_get("scope")?;
    Ok(Ref {
        id: row.try_get("id")?,
        ref_type_slug: row.try_get("ref_type_slug")?,
        target_kind: if kind_str == "order" { TargetKind::Order } else { TargetKind::Session },
        target_id: row.try_get("target_id")?,
        value: row.try_get("value")?,
        scope: serde_json::from_value(scope_json).unwrap_or_default(),
        is_active: row.try_get("is_active")?,
    })
}
