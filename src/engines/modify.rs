//! Modify engine (component E): applies a batch of [`Op`]s to a session in
//! a single transaction, runs modifiers and draft validators, and enqueues
//! the checks configured for the channel.

use crate::ctx::EngineCtx;
use crate::error::{EngineError, SessionError, ValidationError};
use crate::ids;
use crate::json_path;
use crate::models::channel::{EditPolicy, PricingPolicy};
use crate::models::session::{is_reserved_data_key, LineItem, Session, SessionState};
use crate::money;
use crate::ops::Op;
use crate::registry::ValidationStage;
use chrono::Utc;

pub async fn modify_session(
    ctx: &EngineCtx,
    channel_code: &str,
    session_key: &str,
    ops: &[Op],
) -> Result<Session, EngineError> {
    let session_repo = crate::repo::SessionRepo::new(ctx.db.pool().clone());
    let channel_repo = crate::repo::ChannelRepo::new(ctx.db.pool().clone());

    let channel = channel_repo
        .find_by_code(channel_code)
        .await?
        .ok_or(EngineError::Session(SessionError::NotFound))?;

    let mut tx = ctx.db.pool().begin().await?;
    let mut session = session_repo
        .find_for_update(&mut tx, channel_code, session_key)
        .await?
        .ok_or(SessionError::NotFound)?;

    apply_ops_locked(ctx, &mut tx, &channel, &mut session, ops).await?;

    tx.commit().await?;
    Ok(session)
}

/// Applies `ops` plus modifiers, draft validators and the commit-check
/// enqueue to a `session` that the caller already holds a row lock on
/// within `tx`. Shared by [`modify_session`] and the resolve engine, which
/// locks the session itself so the staleness check in its resolver runs
/// against the same row it then mutates, under one transaction.
pub(crate) async fn apply_ops_locked(
    ctx: &EngineCtx,
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    channel: &crate::models::channel::Channel,
    session: &mut Session,
    ops: &[Op],
) -> Result<(), EngineError> {
    let session_repo = crate::repo::SessionRepo::new(ctx.db.pool().clone());
    let directive_repo = crate::repo::DirectiveRepo::new(ctx.db.pool().clone());

    match session.state {
        SessionState::Committed => return Err(SessionError::AlreadyCommitted.into()),
        SessionState::Abandoned => return Err(SessionError::AlreadyAbandoned.into()),
        SessionState::Open => {}
    }
    // The session's own edit_policy is authoritative once it is open: it was
    // copied from the channel at create time and may since have been
    // overridden, so the channel's current (possibly since-changed) policy
    // must not retroactively lock or unlock it.
    if session.edit_policy == EditPolicy::Locked {
        return Err(SessionError::Locked {
            channel_name: channel.name.clone(),
        }
        .into());
    }

    for op in ops {
        apply_op(session, op)?;
    }

    for modifier in ctx.registry.modifiers_ordered() {
        modifier.apply(session).await?;
    }
    for validator in ctx.registry.validators_for(ValidationStage::Draft) {
        validator.validate(session, None).await?;
    }

    session.rev += 1;
    session.data.checks.clear();
    session.data.issues.clear();
    session.updated_at = Utc::now();

    session_repo.save(tx, session).await?;

    for check_code in &channel.config.required_checks_on_commit {
        let topic = channel.config.directive_topic_for(check_code);
        let payload = serde_json::json!({
            "session_key": session.session_key,
            "channel_code": session.channel_code,
            "rev": session.rev,
            "items": session.items,
        });
        directive_repo.enqueue(tx, &topic, payload, Utc::now()).await?;
    }

    Ok(())
}

fn apply_op(session: &mut Session, op: &Op) -> Result<(), ValidationError> {
    match op {
        Op::AddLine {
            sku,
            qty,
            unit_price_q,
            meta,
            name,
        } => {
            if sku.trim().is_empty() {
                return Err(ValidationError::MissingSku);
            }
            let qty = money::parse_qty(qty).map_err(|_| ValidationError::InvalidQty)?;
            if session.pricing_policy == PricingPolicy::External && unit_price_q.is_none() {
                return Err(ValidationError::MissingUnitPriceQ);
            }
            session.items.push(LineItem {
                line_id: ids::generate_line_id(),
                sku: sku.clone(),
                qty,
                unit_price_q: *unit_price_q,
                line_total_q: None,
                name: name.clone(),
                meta: meta.clone().unwrap_or(serde_json::Value::Null),
            });
            Ok(())
        }
        Op::RemoveLine { line_id } => {
            let before = session.items.len();
            session.items.retain(|l| &l.line_id != line_id);
            if session.items.len() == before {
                return Err(ValidationError::UnknownLineId(line_id.clone()));
            }
            Ok(())
        }
        Op::SetQty { line_id, qty } => {
            let qty = money::parse_qty(qty).map_err(|_| ValidationError::InvalidQty)?;
            let line = session
                .find_line_mut(line_id)
                .ok_or_else(|| ValidationError::UnknownLineId(line_id.clone()))?;
            line.qty = qty;
            Ok(())
        }
        Op::ReplaceSku {
            line_id,
            sku,
            unit_price_q,
            meta,
        } => {
            if session.pricing_policy == PricingPolicy::External && unit_price_q.is_none() {
                return Err(ValidationError::MissingUnitPriceQ);
            }
            let line = session
                .find_line_mut(line_id)
                .ok_or_else(|| ValidationError::UnknownLineId(line_id.clone()))?;
            line.sku = sku.clone();
            if unit_price_q.is_some() {
                line.unit_price_q = *unit_price_q;
            }
            if let Some(meta) = meta {
                line.meta = meta.clone();
            }
            Ok(())
        }
        Op::SetData { path, value } => {
            let root_segment = path.split('.').next().unwrap_or("");
            if is_reserved_data_key(root_segment) {
                return Err(ValidationError::DataPathForbidden(path.clone()));
            }
            json_path::set_path(&mut session.data.extra, path, value.clone())
                .map_err(|_| ValidationError::DataPathForbidden(path.clone()))
        }
        Op::MergeLines {
            from_line_id,
            into_line_id,
        } => {
            if from_line_id == into_line_id {
                return Err(ValidationError::InvalidMerge);
            }
            let from_qty = session
                .find_line(from_line_id)
                .ok_or_else(|| ValidationError::UnknownLineId(from_line_id.clone()))?
                .qty;
            let from_sku = session.find_line(from_line_id).unwrap().sku.clone();
            {
                let into = session
                    .find_line_mut(into_line_id)
                    .ok_or_else(|| ValidationError::UnknownLineId(into_line_id.clone()))?;
                if into.sku != from_sku {
                    return Err(ValidationError::SkuMismatch);
                }
                into.qty += from_qty;
            }
            session.items.retain(|l| &l.line_id != from_line_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{PricingAggregate, SessionData};

    fn empty_session(pricing_policy: PricingPolicy) -> Session {
        Session {
            id: 1,
            session_key: "SESS-AAAAAAAAAAAA".into(),
            channel_code: "pos".into(),
            handle_type: None,
            handle_ref: None,
            state: SessionState::Open,
            pricing_policy,
            edit_policy: EditPolicy::Open,
            rev: 0,
            items: vec![],
            pricing: PricingAggregate::default(),
            pricing_trace: vec![],
            data: SessionData::default(),
            opened_at: Utc::now(),
            updated_at: Utc::now(),
            committed_at: None,
            commit_token: None,
        }
    }

    #[test]
    fn add_line_requires_unit_price_when_externally_priced() {
        let mut session = empty_session(PricingPolicy::External);
        let op = Op::AddLine {
            sku: "COFFEE".into(),
            qty: serde_json::json!(2),
            unit_price_q: None,
            meta: None,
            name: None,
        };
        let err = apply_op(&mut session, &op).unwrap_err();
        assert!(matches!(err, ValidationError::MissingUnitPriceQ));
    }

    #[test]
    fn add_line_generates_a_line_id() {
        let mut session = empty_session(PricingPolicy::Internal);
        let op = Op::AddLine {
            sku: "COFFEE".into(),
            qty: serde_json::json!(2),
            unit_price_q: Some(500),
            meta: None,
            name: None,
        };
        apply_op(&mut session, &op).unwrap();
        assert_eq!(session.items.len(), 1);
        assert!(session.items[0].line_id.starts_with("L-"));
    }

    #[test]
    fn merge_lines_requires_matching_sku() {
        let mut session = empty_session(PricingPolicy::Internal);
        session.items.push(LineItem {
            line_id: "L-1".into(),
            sku: "COFFEE".into(),
            qty: rust_decimal::Decimal::new(1, 0),
            unit_price_q: Some(500),
            line_total_q: None,
            name: None,
            meta: serde_json::Value::Null,
        });
        session.items.push(LineItem {
            line_id: "L-2".into(),
            sku: "TEA".into(),
            qty: rust_decimal::Decimal::new(1, 0),
            unit_price_q: Some(400),
            line_total_q: None,
            name: None,
            meta: serde_json::Value::Null,
        });
        let op = Op::MergeLines {
            from_line_id: "L-1".into(),
            into_line_id: "L-2".into(),
        };
        let err = apply_op(&mut session, &op).unwrap_err();
        assert!(matches!(err, ValidationError::SkuMismatch));
    }

    #[test]
    fn set_data_rejects_reserved_root_key() {
        let mut session = empty_session(PricingPolicy::Internal);
        let op = Op::SetData {
            path: "rev".into(),
            value: serde_json::json!(99),
        };
        let err = apply_op(&mut session, &op).unwrap_err();
        assert!(matches!(err, ValidationError::DataPathForbidden(_)));
    }

    #[test]
    fn set_data_accepts_caller_key() {
        let mut session = empty_session(PricingPolicy::Internal);
        let op = Op::SetData {
            path: "table_number".into(),
            value: serde_json::json!(12),
        };
        apply_op(&mut session, &op).unwrap();
        assert_eq!(session.data.extra.get("table_number"), Some(&serde_json::json!(12)));
    }
}
