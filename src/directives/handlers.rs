//! The four built-in directive handlers described in §4.I. Each owns its
//! own terminal-status bookkeeping on the directive row; `handle` returning
//! `Err` means something unexpected happened (a database error, say), not a
//! routine business failure, which the handler marks `failed` itself.

use crate::backends::payment::PaymentStatus;
use crate::ctx::EngineCtx;
use crate::engines::write_back::apply_check_result;
use crate::error::EngineError;
use crate::models::directive::Directive;
use crate::models::session::{Issue, IssueAction, IssueContext};
use crate::registry::DirectiveHandler;
use crate::repo::DirectiveRepo;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

fn directive_repo(ctx: &EngineCtx) -> DirectiveRepo {
    DirectiveRepo::new(ctx.db.pool().clone())
}

/// Aggregates line items by SKU: `(total qty, contributing line ids)`.
fn aggregate_by_sku(items: &[serde_json::Value]) -> HashMap<String, (Decimal, Vec<String>)> {
    let mut agg: HashMap<String, (Decimal, Vec<String>)> = HashMap::new();
    for item in items {
        let sku = item.get("sku").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let line_id = item.get("line_id").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let qty = item
            .get("qty")
            .map(crate::money::parse_qty)
            .and_then(Result::ok)
            .unwrap_or(Decimal::ZERO);
        let entry = agg.entry(sku).or_insert((Decimal::ZERO, vec![]));
        entry.0 += qty;
        entry.1.push(line_id);
    }
    agg
}

pub struct StockHoldHandler {
    pub ctx: EngineCtx,
}

#[async_trait]
impl DirectiveHandler for StockHoldHandler {
    async fn handle(&self, directive: &Directive) -> Result<(), EngineError> {
        let repo = directive_repo(&self.ctx);
        let session_repo = crate::repo::SessionRepo::new(self.ctx.db.pool().clone());

        let channel_code = directive.payload["channel_code"].as_str().unwrap_or_default();
        let session_key = directive.payload["session_key"].as_str().unwrap_or_default();
        let expected_rev = directive.payload["rev"].as_i64().unwrap_or(-1);

        let Some(session) = session_repo.find(channel_code, session_key).await? else {
            repo.mark_failed(directive.id, "session not found").await?;
            return Ok(());
        };
        if session.rev != expected_rev {
            repo.mark_failed(directive.id, "stale directive").await?;
            return Ok(());
        }
        if session.state != crate::models::session::SessionState::Open {
            repo.mark_done(directive.id).await?;
            return Ok(());
        }

        self.ctx
            .backends
            .stock
            .release_holds_for_reference(session_key)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        let items = directive.payload["items"].as_array().cloned().unwrap_or_default();
        let aggregated = aggregate_by_sku(&items);

        let mut holds = vec![];
        let mut issues = vec![];
        let expires_at = Utc::now() + Duration::minutes(self.ctx.hold_ttl_minutes);

        for (sku, (qty, line_ids)) in &aggregated {
            let availability = self
                .ctx
                .backends
                .stock
                .check_availability(sku, *qty)
                .await
                .map_err(|e| EngineError::Internal(e.to_string()))?;

            if availability.is_available {
                match self
                    .ctx
                    .backends
                    .stock
                    .create_hold(sku, *qty, expires_at, session_key)
                    .await
                {
                    Ok(hold) => holds.push(serde_json::json!({
                        "hold_id": hold.hold_id,
                        "sku": hold.sku,
                        "qty": hold.qty,
                        "expires_at": hold.expires_at,
                    })),
                    Err(_) => issues.push(stock_issue(sku, line_ids, Decimal::ZERO, session.rev)),
                }
            } else {
                issues.push(stock_issue(sku, line_ids, availability.available_qty, session.rev));
            }
        }

        let result = serde_json::json!({
            "hold_expires_at": expires_at,
            "holds": holds,
        });

        let wrote = apply_check_result(
            &self.ctx,
            channel_code,
            session_key,
            expected_rev,
            "stock",
            result,
            issues,
        )
        .await?;

        if wrote {
            repo.mark_done(directive.id).await?;
        } else {
            repo.mark_failed(directive.id, "stale_rev").await?;
        }
        Ok(())
    }
}

fn stock_issue(sku: &str, line_ids: &[String], available_qty: Decimal, rev: i64) -> Issue {
    let mut actions = vec![IssueAction {
        id: crate::ids::generate_action_id(),
        label: "remove line".to_string(),
        rev,
        ops: line_ids
            .iter()
            .map(|id| serde_json::json!({ "op": "remove_line", "line_id": id }))
            .collect(),
    }];
    if available_qty > Decimal::ZERO {
        actions.push(IssueAction {
            id: crate::ids::generate_action_id(),
            label: format!("set qty to {available_qty}"),
            rev,
            ops: line_ids
                .iter()
                .map(|id| serde_json::json!({ "op": "set_qty", "line_id": id, "qty": available_qty }))
                .collect(),
        });
    }
    Issue {
        id: crate::ids::generate_issue_id(),
        source: "stock".to_string(),
        code: "stock.insufficient".to_string(),
        blocking: true,
        message: format!("insufficient stock for {sku}"),
        context: IssueContext {
            line_id: line_ids.first().cloned(),
            sku: Some(sku.to_string()),
            actions,
            extra: Default::default(),
        },
    }
}

pub struct StockCommitHandler {
    pub ctx: EngineCtx,
}

#[async_trait]
impl DirectiveHandler for StockCommitHandler {
    async fn handle(&self, directive: &Directive) -> Result<(), EngineError> {
        let repo = directive_repo(&self.ctx);
        let order_ref = directive.payload["order_ref"].as_str().unwrap_or_default();

        let holds: Vec<serde_json::Value> = directive
            .payload
            .get("holds")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_else(|| {
                // Fall back to the session's stock check result, per §4.I.
                directive
                    .payload
                    .get("session_stock_holds")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default()
            });

        for hold in &holds {
            if let Some(hold_id) = hold.get("hold_id").and_then(|v| v.as_str()) {
                if let Err(e) = self.ctx.backends.stock.fulfill_hold(hold_id, order_ref).await {
                    tracing::warn!(hold_id, error = %e, "stock.commit: fulfill_hold failed, backend owns its own idempotency");
                }
            }
        }

        repo.mark_done(directive.id).await?;
        Ok(())
    }
}

/// Reads `intent_id` from the directive payload, falling back to the
/// referenced session's own `data.payment.intent_id` — the commit engine's
/// `post_commit_directives` payload only ever carries `order_ref`,
/// `channel_code` and `session_key`, so the payment handlers have to go
/// back to the session to find what they're supposed to capture/refund.
async fn resolve_intent_id(ctx: &EngineCtx, payload: &serde_json::Value) -> Result<Option<String>, EngineError> {
    if let Some(intent_id) = payload.get("intent_id").and_then(|v| v.as_str()) {
        return Ok(Some(intent_id.to_string()));
    }
    let (Some(channel_code), Some(session_key)) = (
        payload.get("channel_code").and_then(|v| v.as_str()),
        payload.get("session_key").and_then(|v| v.as_str()),
    ) else {
        return Ok(None);
    };
    let session_repo = crate::repo::SessionRepo::new(ctx.db.pool().clone());
    let Some(session) = session_repo.find(channel_code, session_key).await? else {
        return Ok(None);
    };
    Ok(session
        .data
        .extra
        .get("payment")
        .and_then(|v| v.get("intent_id"))
        .and_then(|v| v.as_str())
        .map(str::to_string))
}

pub struct PaymentCaptureHandler {
    pub ctx: EngineCtx,
}

#[async_trait]
impl DirectiveHandler for PaymentCaptureHandler {
    async fn handle(&self, directive: &Directive) -> Result<(), EngineError> {
        let repo = directive_repo(&self.ctx);
        let order_ref = directive.payload.get("order_ref").and_then(|v| v.as_str());

        let Some(intent_id) = resolve_intent_id(&self.ctx, &directive.payload).await? else {
            repo.mark_failed(directive.id, "no_intent_id").await?;
            return Ok(());
        };

        let status = self
            .ctx
            .backends
            .payment
            .get_status(&intent_id)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        if status.status == PaymentStatus::Captured {
            repo.mark_done(directive.id).await?;
            return Ok(());
        }

        match self.ctx.backends.payment.capture(&intent_id, None, None).await {
            Ok(intent) => {
                if let Some(order_ref) = order_ref {
                    self.emit_order_event(order_ref, "payment.captured", &intent.intent_id).await?;
                }
                repo.mark_done(directive.id).await?;
            }
            Err(e) => {
                repo.mark_failed(directive.id, &e.to_string()).await?;
            }
        }
        Ok(())
    }
}

impl PaymentCaptureHandler {
    async fn emit_order_event(&self, order_ref: &str, event_type: &str, intent_id: &str) -> Result<(), EngineError> {
        let order_repo = crate::repo::OrderRepo::new(self.ctx.db.pool().clone());
        let Some(order) = order_repo.find_by_ref(order_ref).await? else {
            return Ok(());
        };
        let mut tx = self.ctx.db.pool().begin().await?;
        order_repo
            .emit_event(
                &mut tx,
                order.id,
                event_type,
                &self.ctx.actor,
                serde_json::json!({ "intent_id": intent_id }),
                Utc::now(),
            )
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

pub struct PaymentRefundHandler {
    pub ctx: EngineCtx,
}

#[async_trait]
impl DirectiveHandler for PaymentRefundHandler {
    async fn handle(&self, directive: &Directive) -> Result<(), EngineError> {
        let repo = directive_repo(&self.ctx);
        let order_ref = directive.payload.get("order_ref").and_then(|v| v.as_str());

        let Some(intent_id) = resolve_intent_id(&self.ctx, &directive.payload).await? else {
            repo.mark_failed(directive.id, "no_intent_id").await?;
            return Ok(());
        };

        match self.ctx.backends.payment.refund(&intent_id, None, None).await {
            Ok(intent) => {
                if let Some(order_ref) = order_ref {
                    let order_repo = crate::repo::OrderRepo::new(self.ctx.db.pool().clone());
                    if let Some(order) = order_repo.find_by_ref(order_ref).await? {
                        let mut tx = self.ctx.db.pool().begin().await?;
                        order_repo
                            .emit_event(
                                &mut tx,
                                order.id,
                                "payment.refunded",
                                &self.ctx.actor,
                                serde_json::json!({ "intent_id": intent.intent_id }),
                                Utc::now(),
                            )
                            .await?;
                        tx.commit().await?;
                    }
                }
                repo.mark_done(directive.id).await?;
            }
            Err(e) => {
                repo.mark_failed(directive.id, &e.to_string()).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_by_sku_sums_quantities() {
        let items = vec![
            serde_json::json!({ "sku": "COFFEE", "line_id": "L-1", "qty": 2 }),
            serde_json::json!({ "sku": "COFFEE", "line_id": "L-2", "qty": 1 }),
            serde_json::json!({ "sku": "TEA", "line_id": "L-3", "qty": 3 }),
        ];
        let agg = aggregate_by_sku(&items);
        assert_eq!(agg["COFFEE"].0, Decimal::new(3, 0));
        assert_eq!(agg["COFFEE"].1, vec!["L-1".to_string(), "L-2".to_string()]);
        assert_eq!(agg["TEA"].0, Decimal::new(3, 0));
    }

    #[test]
    fn stock_issue_includes_set_qty_action_when_some_stock_remains() {
        let issue = stock_issue("COFFEE", &["L-1".to_string()], Decimal::new(1, 0), 4);
        assert_eq!(issue.context.actions.len(), 2);
    }

    #[test]
    fn stock_issue_omits_set_qty_action_when_none_available() {
        let issue = stock_issue("COFFEE", &["L-1".to_string()], Decimal::ZERO, 4);
        assert_eq!(issue.context.actions.len(), 1);
    }
}
