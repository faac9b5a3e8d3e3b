use crate::models::channel::{Channel, ChannelConfig, EditPolicy, PricingPolicy};
use sqlx::{PgPool, Row};

pub struct ChannelRepo {
    pool: PgPool,
}

impl ChannelRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<Channel>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, display_order, is_active, pricing_policy, edit_policy, config
            FROM channels_tb
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_channel(row)?))
    }

    pub async fn list(&self) -> Result<Vec<Channel>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, code, name, display_order, is_active, pricing_policy, edit_policy, config
            FROM channels_tb
            ORDER BY display_order, code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_channel).collect()
    }
}

fn row_to_channel(row: sqlx::postgres::PgRow) -> Result<Channel, sqlx::Error> {
    let pricing_policy: String = row.try_get("pricing_policy")?;
    let edit_policy: String = row.try_get("edit_policy")?;
    let config_json: serde_json::Value = row.try_get("config")?;

    // Channel config is only ever written by operators directly against
    // the database today (there's no provisioning endpoint in this kernel),
    // but a row that fails the whitelist or shape check still must not be
    // silently defaulted away — that would mask a bad deploy as an empty
    // config.
    if let serde_json::Value::Object(ref map) = config_json {
        if let Err(unknown) = ChannelConfig::validate_keys(map) {
            return Err(sqlx::Error::Decode(
                format!("channel config contains unknown keys: {}", unknown.join(", ")).into(),
            ));
        }
    }
    let config = serde_json::from_value::<ChannelConfig>(config_json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Channel {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        display_order: row.try_get("display_order")?,
        is_active: row.try_get("is_active")?,
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
        config,
    })
}
