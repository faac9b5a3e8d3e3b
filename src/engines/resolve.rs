//! Resolve engine (component H): applies a caller-chosen remediation to an
//! open issue by delegating to the resolver registered for its `source`.

use crate::ctx::EngineCtx;
use crate::engines::modify::apply_ops_locked;
use crate::error::{EngineError, IssueResolveError, SessionError};
use crate::models::session::Session;

/// Resolves an open issue by locking the session once, running the
/// registered resolver's staleness check against that locked row, and
/// applying the resulting ops in the same transaction — so no other
/// request can re-lock and advance the session's `rev` between the check
/// and the write, the way a split-transaction design would allow.
pub async fn resolve(
    ctx: &EngineCtx,
    channel_code: &str,
    session_key: &str,
    issue_id: &str,
    action_id: &str,
    input: serde_json::Value,
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
        .ok_or_else(IssueResolveError::session_not_found)?;

    let issue = session
        .find_issue(issue_id)
        .cloned()
        .ok_or_else(IssueResolveError::issue_not_found)?;

    let resolver = ctx
        .registry
        .issue_resolver(&issue.source)
        .ok_or_else(|| IssueResolveError::no_resolver(&issue.source))?;

    let ops = resolver
        .resolve(&session, issue_id, action_id, input)
        .await?;

    apply_ops_locked(ctx, &mut tx, &channel, &mut session, &ops).await?;

    tx.commit().await?;
    Ok(session)
}

/// The standard stock resolver, grounded directly in the algorithm §4.H
/// describes: every stock-insufficient issue carries pre-baked remediation
/// ops in its `context.actions`, so resolving just means picking one whose
/// `rev` still matches and replaying its ops through the modify engine.
pub struct StockIssueResolver;

#[async_trait::async_trait]
impl crate::registry::IssueResolver for StockIssueResolver {
    async fn resolve(
        &self,
        session: &Session,
        issue_id: &str,
        action_id: &str,
        _input: serde_json::Value,
    ) -> Result<Vec<crate::ops::Op>, IssueResolveError> {
        let issue = session
            .find_issue(issue_id)
            .ok_or_else(IssueResolveError::issue_not_found)?;

        let action = issue
            .context
            .actions
            .iter()
            .find(|a| a.id == action_id)
            .ok_or_else(IssueResolveError::action_not_found)?;

        if action.rev != session.rev {
            return Err(IssueResolveError::stale_action());
        }
        if action.ops.is_empty() {
            return Err(IssueResolveError::no_ops());
        }

        action
            .ops
            .iter()
            .map(|raw| {
                serde_json::from_value(raw.clone()).map_err(|e| {
                    IssueResolveError::resolver_error(format!("malformed action op: {e}")).with_context(
                        serde_json::json!({ "source": issue.source, "issue_id": issue_id, "action_id": action_id }),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::channel::{EditPolicy, PricingPolicy};
    use crate::models::session::{Issue, IssueAction, IssueContext, PricingAggregate, SessionData, SessionState};
    use crate::registry::IssueResolver;
    use chrono::Utc;

    fn session_with_issue(action_rev: i64, session_rev: i64) -> Session {
        Session {
            id: 1,
            session_key: "SESS-AAAAAAAAAAAA".into(),
            channel_code: "pos".into(),
            handle_type: None,
            handle_ref: None,
            state: SessionState::Open,
            pricing_policy: PricingPolicy::Internal,
            edit_policy: EditPolicy::Open,
            rev: session_rev,
            items: vec![],
            pricing: PricingAggregate::default(),
            pricing_trace: vec![],
            data: SessionData {
                checks: Default::default(),
                issues: vec![Issue {
                    id: "ISS-1".into(),
                    source: "stock".into(),
                    code: "stock.insufficient".into(),
                    blocking: true,
                    message: "not enough stock".into(),
                    context: IssueContext {
                        line_id: Some("L-1".into()),
                        sku: Some("COFFEE".into()),
                        actions: vec![IssueAction {
                            id: "ACT-1".into(),
                            label: "remove line".into(),
                            rev: action_rev,
                            ops: vec![serde_json::json!({ "op": "remove_line", "line_id": "L-1" })],
                        }],
                        extra: Default::default(),
                    },
                }],
                extra: Default::default(),
            },
            opened_at: Utc::now(),
            updated_at: Utc::now(),
            committed_at: None,
            commit_token: None,
        }
    }

    #[tokio::test]
    async fn rejects_stale_action() {
        let session = session_with_issue(1, 2);
        let err = StockIssueResolver
            .resolve(&session, "ISS-1", "ACT-1", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code, "stale_action");
    }

    #[tokio::test]
    async fn returns_ops_when_action_is_current() {
        let session = session_with_issue(5, 5);
        let ops = StockIssueResolver
            .resolve(&session, "ISS-1", "ACT-1", serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], crate::ops::Op::RemoveLine { .. }));
    }

    #[tokio::test]
    async fn unknown_action_id_fails() {
        let session = session_with_issue(5, 5);
        let err = StockIssueResolver
            .resolve(&session, "ISS-1", "ACT-404", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code, "action_not_found");
    }
}
