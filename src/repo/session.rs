use crate::models::channel::{EditPolicy, PricingPolicy};
use crate::models::session::{PricingAggregate, Session, SessionData, SessionState};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

pub struct SessionRepo {
    pool: PgPool,
}

pub enum FindByKeyOutcome {
    Found(Session),
    NotFound,
    Ambiguous,
}

impl SessionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Locates a session, taking `FOR UPDATE` on its row inside `tx`. Every
    /// write engine opens its transaction with this call first.
    pub async fn find_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        channel_code: &str,
        session_key: &str,
    ) -> Result<Option<Session>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, session_key, channel_code, handle_type, handle_ref, state,
                   pricing_policy, edit_policy, rev, items, pricing, pricing_trace,
                   data, opened_at, updated_at, committed_at, commit_token
            FROM sessions_tb
            WHERE channel_code = $1 AND session_key = $2
            FOR UPDATE
            "#,
        )
        .bind(channel_code)
        .bind(session_key)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_session(row)?))
    }

    pub async fn find(&self, channel_code: &str, session_key: &str) -> Result<Option<Session>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, session_key, channel_code, handle_type, handle_ref, state,
                   pricing_policy, edit_policy, rev, items, pricing, pricing_trace,
                   data, opened_at, updated_at, committed_at, commit_token
            FROM sessions_tb
            WHERE channel_code = $1 AND session_key = $2
            "#,
        )
        .bind(channel_code)
        .bind(session_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_session(row)?))
    }

    /// Lists sessions, optionally narrowed to one channel. Used by the
    /// read-only `GET /sessions` listing endpoint.
    pub async fn list(&self, channel_code: Option<&str>) -> Result<Vec<Session>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_key, channel_code, handle_type, handle_ref, state,
                   pricing_policy, edit_policy, rev, items, pricing, pricing_trace,
                   data, opened_at, updated_at, committed_at, commit_token
            FROM sessions_tb
            WHERE $1::text IS NULL OR channel_code = $1
            ORDER BY opened_at DESC
            LIMIT 200
            "#,
        )
        .bind(channel_code)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_session).collect()
    }

    /// Looks up a session by key alone, used when the caller omits
    /// `channel_code`. Returns `Ambiguous` if more than one channel has a
    /// session with this key.
    pub async fn find_by_key_only(&self, session_key: &str) -> Result<FindByKeyOutcome, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_key, channel_code, handle_type, handle_ref, state,
                   pricing_policy, edit_policy, rev, items, pricing, pricing_trace,
                   data, opened_at, updated_at, committed_at, commit_token
            FROM sessions_tb
            WHERE session_key = $1
            "#,
        )
        .bind(session_key)
        .fetch_all(&self.pool)
        .await?;

        match rows.len() {
            0 => Ok(FindByKeyOutcome::NotFound),
            1 => Ok(FindByKeyOutcome::Found(row_to_session(rows.into_iter().next().unwrap())?)),
            _ => Ok(FindByKeyOutcome::Ambiguous),
        }
    }

    pub async fn save(&self, tx: &mut Transaction<'_, Postgres>, session: &Session) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE sessions_tb
            SET state = $1, rev = $2, items = $3, pricing = $4, pricing_trace = $5,
                data = $6, updated_at = $7, committed_at = $8, commit_token = $9
            WHERE id = $10
            "#,
        )
        .bind(state_as_str(session.state))
        .bind(session.rev)
        .bind(serde_json::to_value(&session.items).unwrap_or_default())
        .bind(serde_json::to_value(&session.pricing).unwrap_or_default())
        .bind(serde_json::to_value(&session.pricing_trace).unwrap_or_default())
        .bind(serde_json::to_value(&session.data).unwrap_or_default())
        .bind(session.updated_at)
        .bind(session.committed_at)
        .bind(&session.commit_token)
        .bind(session.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Finds an existing open session for the same channel/handle, the
    /// re-open-by-handle check `POST /sessions` does before creating a new row.
    pub async fn find_open_by_handle(
        &self,
        channel_code: &str,
        handle_type: &str,
        handle_ref: &str,
    ) -> Result<Option<Session>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, session_key, channel_code, handle_type, handle_ref, state,
                   pricing_policy, edit_policy, rev, items, pricing, pricing_trace,
                   data, opened_at, updated_at, committed_at, commit_token
            FROM sessions_tb
            WHERE channel_code = $1 AND handle_type = $2 AND handle_ref = $3 AND state = 'open'
            ORDER BY opened_at DESC
            LIMIT 1
            "#,
        )
        .bind(channel_code)
        .bind(handle_type)
        .bind(handle_ref)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_session(row)?))
    }

    pub async fn create(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        session_key: &str,
        channel_code: &str,
        handle_type: Option<&str>,
        handle_ref: Option<&str>,
        pricing_policy: PricingPolicy,
        edit_policy: EditPolicy,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64, sqlx::Error> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sessions_tb
                (session_key, channel_code, handle_type, handle_ref, state,
                 pricing_policy, edit_policy, rev, items, pricing, pricing_trace,
                 data, opened_at, updated_at)
            VALUES ($1, $2, $3, $4, 'open', $5, $6, 0, '[]', '{}', '[]', '{}', $7, $7)
            RETURNING id
            "#,
        )
        .bind(session_key)
        .bind(channel_code)
        .bind(handle_type)
        .bind(handle_ref)
        .bind(policy_as_str(pricing_policy))
        .bind(edit_as_str(edit_policy))
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }
}

fn state_as_str(state: SessionState) -> &'static str {
    match state {
        SessionState::Open => "open",
        SessionState::Committed => "committed",
        SessionState::Abandoned => "abandoned",
    }
}

fn policy_as_str(policy: PricingPolicy) -> &'static str {
    match policy {
        PricingPolicy::Internal => "internal",
        PricingPolicy::External => "external",
    }
}

fn edit_as_str(policy: EditPolicy) -> &'static str {
    match policy {
        EditPolicy::Open => "open",
        EditPolicy::Locked => "locked",
    }
}

fn row_to_session(row: PgRow) -> Result<Session, sqlx::Error> {
    let state: String = row.try_get("state")?;
    let pricing_policy: String = row.try_get("pricing_policy")?;
    let edit_policy: String = row.try_get("edit_policy")?;
    let items_json: serde_json::Value = row.try_get("items")?;
    let pricing_json: serde_json::Value = row.try_get("pricing")?;
    let pricing_trace_json: serde_json::Value = row.try_get("pricing_trace")?;
    let data_json: serde_json::Value = row.try_get("data")?;

    Ok(Session {
        id: row.try_get("id")?,
        session_key: row.try_get("session_key")?,
        channel_code: row.try_get("channel_code")?,
        handle_type: row.try_get("handle_type")?,
        handle_ref: row.try_get("handle_ref")?,
        state: match state.as_str() {
            "committed" => SessionState::Committed,
            "abandoned" => SessionState::Abandoned,
            _ => SessionState::Open,
        },
        pricing_policy: if pricing_policy == "external" {
            PricingPolicy::External
        } else {
            PricingPolicy::Internal
        },
        edit_policy: if edit_policy == "locked" {
            EditPolicy::Locked
        } else {
            EditPolicy::Open
        },
        rev: row.try_get("rev")?,
        items: serde_json::from_value(items_json).unwrap_or_default(),
        pricing: serde_json::from_value::<PricingAggregate>(pricing_json).unwrap_or_default(),
        pricing_trace: serde_json::from_value(pricing_trace_json).unwrap_or_default(),
        data: serde_json::from_value::<SessionData>(data_json).unwrap_or_default(),
        opened_at: row.try_get("opened_at")?,
        updated_at: row.try_get("updated_at")?,
        committed_at: row.try_get("committed_at")?,
        commit_token: row.try_get("commit_token")?,
    })
}
