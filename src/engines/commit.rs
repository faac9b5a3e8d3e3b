//! Commit engine (component G): seals a session into an order.
//!
//! Structured as a short outer transaction that claims the idempotency key,
//! followed by a long inner transaction that performs the commit proper.
//! Splitting them means a worker that crashes mid-commit leaves a visible
//! `in_progress` row with an expiry, rather than holding the lock forever.

use crate::ctx::EngineCtx;
use crate::error::{CommitError, EngineError, SessionError};
use crate::ids;
use crate::models::order::{OrderItem, OrderSnapshot};
use crate::models::session::SessionState;
use crate::money;
use crate::refs_service::RefsService;
use crate::registry::ValidationStage;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

const IDEMPOTENCY_SCOPE: &str = "commit";

pub async fn commit(
    ctx: &EngineCtx,
    channel_code: &str,
    session_key: &str,
    idempotency_key: &str,
) -> Result<Value, EngineError> {
    let idem_repo = crate::repo::IdempotencyRepo::new(ctx.db.pool().clone());
    let now = Utc::now();

    let lock = acquire_idempotency_lock(&idem_repo, idempotency_key, ctx.idempotency_ttl_hours, now).await?;
    let idempotency_row_id = match lock {
        LockOutcome::CachedResponse(body) => return Ok(body),
        LockOutcome::Acquired(id) => id,
    };

    match commit_body(ctx, channel_code, session_key, idempotency_key, now).await {
        Ok(body) => {
            idem_repo.mark_done(idempotency_row_id, 201, body.clone()).await?;
            Ok(body)
        }
        Err(err) => {
            if let Err(mark_err) = idem_repo.mark_failed(idempotency_row_id).await {
                tracing::error!(error = %mark_err, "commit: failed to mark idempotency row failed");
            }
            Err(err)
        }
    }
}

enum LockOutcome {
    CachedResponse(Value),
    Acquired(i64),
}

async fn acquire_idempotency_lock(
    idem_repo: &crate::repo::IdempotencyRepo,
    idempotency_key: &str,
    ttl_hours: i64,
    now: DateTime<Utc>,
) -> Result<LockOutcome, EngineError> {
    let mut tx = idem_repo.pool().begin().await?;
    let expires_at = now + Duration::hours(ttl_hours);

    let existing = idem_repo
        .find_for_update(&mut tx, IDEMPOTENCY_SCOPE, idempotency_key)
        .await?;

    let outcome = match existing {
        None => {
            let id = idem_repo
                .insert_in_progress(&mut tx, IDEMPOTENCY_SCOPE, idempotency_key, expires_at, now)
                .await?;
            LockOutcome::Acquired(id)
        }
        Some(row) => match row.status {
            crate::models::idempotency::IdempotencyStatus::Done => {
                LockOutcome::CachedResponse(row.response_body.unwrap_or(Value::Null))
            }
            crate::models::idempotency::IdempotencyStatus::InProgress => {
                let expired = row.expires_at.map(|e| e < now).unwrap_or(false);
                if expired {
                    idem_repo.reset_in_progress(&mut tx, row.id, expires_at).await?;
                    LockOutcome::Acquired(row.id)
                } else {
                    return Err(crate::error::CommitError::InProgress.into());
                }
            }
            crate::models::idempotency::IdempotencyStatus::Failed => {
                idem_repo.reset_in_progress(&mut tx, row.id, expires_at).await?;
                LockOutcome::Acquired(row.id)
            }
        },
    };

    tx.commit().await?;
    Ok(outcome)
}

async fn commit_body(
    ctx: &EngineCtx,
    channel_code: &str,
    session_key: &str,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<Value, EngineError> {
    let session_repo = crate::repo::SessionRepo::new(ctx.db.pool().clone());
    let channel_repo = crate::repo::ChannelRepo::new(ctx.db.pool().clone());
    let order_repo = crate::repo::OrderRepo::new(ctx.db.pool().clone());
    let directive_repo = crate::repo::DirectiveRepo::new(ctx.db.pool().clone());
    let ref_repo = crate::repo::RefRepo::new(ctx.db.pool().clone());
    let refs = RefsService::new(&ref_repo, &ctx.ref_types);

    let channel = channel_repo
        .find_by_code(channel_code)
        .await?
        .ok_or(SessionError::NotFound)?;

    let mut tx = ctx.db.pool().begin().await?;
    let mut session = session_repo
        .find_for_update(&mut tx, channel_code, session_key)
        .await?
        .ok_or(SessionError::NotFound)?;

    match session.state {
        SessionState::Committed => {
            let existing = order_repo.find_by_session_key(session_key).await?;
            return match existing {
                Some(order) => Ok(serde_json::json!({
                    "order_ref": order.r#ref,
                    "order_id": order.id,
                    "status": "already_committed",
                })),
                None => Err(CommitError::AlreadyCommittedNoOrder.into()),
            };
        }
        SessionState::Abandoned => return Err(CommitError::Abandoned.into()),
        SessionState::Open => {}
    }

    for check_code in &channel.config.required_checks_on_commit {
        let entry = session
            .data
            .checks
            .get(check_code)
            .ok_or_else(|| CommitError::MissingCheck(check_code.clone()))?;
        if entry.rev != session.rev {
            return Err(CommitError::StaleCheck(check_code.clone()).into());
        }
        if let Some(expired_hold) = find_expired_hold(&entry.result, now) {
            return Err(CommitError::HoldExpired { hold_id: expired_hold }.into());
        }
    }

    let blocking = session.blocking_issues();
    if !blocking.is_empty() {
        let issues = serde_json::to_value(&blocking).unwrap_or(Value::Array(vec![]));
        return Err(CommitError::BlockingIssues { issues }.into());
    }

    for validator in ctx.registry.validators_for(ValidationStage::Commit) {
        validator.validate(&session, None).await?;
    }

    if session.items.is_empty() {
        return Err(CommitError::EmptySession.into());
    }

    let order_ref = ids::generate_order_ref();
    let snapshot = OrderSnapshot {
        items: session.items.clone(),
        data: session.data.clone(),
        pricing: session.pricing.clone(),
        rev: session.rev,
    };
    let total_q = session
        .items
        .iter()
        .try_fold(0i64, |acc, line| -> Result<i64, EngineError> {
            let line_total = match line.line_total_q {
                Some(t) => t,
                None => {
                    let price = line.unit_price_q.ok_or_else(|| {
                        EngineError::Internal(format!("line {} has no price to commit with", line.line_id))
                    })?;
                    money::multiply(line.qty, price)
                        .map_err(|e| EngineError::Internal(format!("commit total: {e}")))?
                }
            };
            Ok(acc + line_total)
        })?;

    let order_id = order_repo
        .create(
            &mut tx,
            &order_ref,
            channel_code,
            session_key,
            session.handle_type.as_deref(),
            session.handle_ref.as_deref(),
            &snapshot,
            "BRL",
            total_q,
            now,
        )
        .await?;

    let order_items: Vec<OrderItem> = session
        .items
        .iter()
        .enumerate()
        .map(|(idx, line)| OrderItem {
            id: 0,
            order_id,
            line_id: line.line_id.clone(),
            sku: line.sku.clone(),
            qty: line.qty,
            unit_price_q: line.unit_price_q,
            line_total_q: line.line_total_q.unwrap_or(0),
            name: line.name.clone().or(Some(format!("line {idx}"))),
        })
        .collect();
    order_repo.insert_items(&mut tx, order_id, &order_items).await?;

    order_repo
        .emit_event(
            &mut tx,
            order_id,
            "created",
            &ctx.actor,
            serde_json::json!({ "from_session": session_key }),
            now,
        )
        .await?;

    session.state = SessionState::Committed;
    session.committed_at = Some(now);
    session.commit_token = Some(idempotency_key.to_string());
    session.updated_at = now;
    session_repo.save(&mut tx, &session).await?;

    for topic in &channel.config.post_commit_directives {
        let mut payload = serde_json::json!({
            "order_ref": order_ref,
            "channel_code": channel_code,
            "session_key": session_key,
        });
        if topic == "stock.commit" {
            if let Some(stock_check) = session.data.checks.get("stock") {
                if let Some(holds) = stock_check.result.get("holds") {
                    payload["holds"] = holds.clone();
                }
            }
        }
        directive_repo.enqueue(&mut tx, topic, payload, now).await?;
    }

    refs.on_session_committed(&mut tx, session.id, order_id).await?;

    tx.commit().await?;

    Ok(serde_json::json!({
        "order_ref": order_ref,
        "order_id": order_id,
        "status": "committed",
        "total_q": total_q,
        "items_count": order_items.len(),
    }))
}

/// Looks for an expired hold in a stock-check result: either a top-level
/// `hold_expires_at` or any entry in `holds[].expires_at`.
fn find_expired_hold(result: &Value, now: DateTime<Utc>) -> Option<String> {
    if let Some(expires_at) = result.get("hold_expires_at").and_then(Value::as_str) {
        if parse_as_utc(expires_at).map(|t| t < now).unwrap_or(false) {
            return Some("primary".to_string());
        }
    }
    if let Some(holds) = result.get("holds").and_then(Value::as_array) {
        for hold in holds {
            let expires_at = hold.get("expires_at").and_then(Value::as_str);
            let hold_id = hold.get("hold_id").and_then(Value::as_str).unwrap_or("unknown");
            if let Some(expires_at) = expires_at {
                if parse_as_utc(expires_at).map(|t| t < now).unwrap_or(false) {
                    return Some(hold_id.to_string());
                }
            }
        }
    }
    None
}

/// Naive timestamps (no offset) are treated as UTC.
fn parse_as_utc(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
