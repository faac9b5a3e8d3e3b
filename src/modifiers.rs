//! Built-in modifiers registered at process start. Deployments may register
//! further ones (e.g. loyalty pricing) through the same [`Modifier`] trait.

use crate::error::EngineError;
use crate::models::session::Session;
use crate::money;
use crate::registry::Modifier;
use async_trait::async_trait;

/// Recomputes each line's `line_total_q` from `qty * unit_price_q` and the
/// session's aggregate totals. Runs first (`order = 0`) so later modifiers
/// see up-to-date totals.
pub struct PricingModifier;

#[async_trait]
impl Modifier for PricingModifier {
    fn name(&self) -> &'static str {
        "pricing"
    }

    async fn apply(&self, session: &mut Session) -> Result<(), EngineError> {
        let mut total_q = 0i64;
        for line in session.items.iter_mut() {
            if let Some(unit_price_q) = line.unit_price_q {
                let computed = money::multiply(line.qty, unit_price_q)
                    .map_err(|e| EngineError::Internal(format!("pricing modifier: {e}")))?;
                line.line_total_q = Some(computed);
                total_q += computed;
            } else if let Some(existing) = line.line_total_q {
                total_q += existing;
            }
        }
        session.pricing.total_q = total_q;
        session.pricing.items_count = session.items.len() as i64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::channel::{EditPolicy, PricingPolicy};
    use crate::models::session::{LineItem, PricingAggregate, SessionData, SessionState};
    use chrono::Utc;

    fn session_with_lines(lines: Vec<LineItem>) -> Session {
        Session {
            id: 1,
            session_key: "SESS-AAAAAAAAAAAA".into(),
            channel_code: "pos".into(),
            handle_type: None,
            handle_ref: None,
            state: SessionState::Open,
            pricing_policy: PricingPolicy::Internal,
            edit_policy: EditPolicy::Open,
            rev: 0,
            items: lines,
            pricing: PricingAggregate::default(),
            pricing_trace: vec![],
            data: SessionData::default(),
            opened_at: Utc::now(),
            updated_at: Utc::now(),
            committed_at: None,
            commit_token: None,
        }
    }

    #[tokio::test]
    async fn computes_line_totals_and_aggregate() {
        let mut session = session_with_lines(vec![LineItem {
            line_id: "L-1".into(),
            sku: "COFFEE".into(),
            qty: rust_decimal::Decimal::new(2, 0),
            unit_price_q: Some(500),
            line_total_q: None,
            name: None,
            meta: serde_json::Value::Null,
        }]);
        PricingModifier.apply(&mut session).await.unwrap();
        assert_eq!(session.items[0].line_total_q, Some(1000));
        assert_eq!(session.pricing.total_q, 1000);
    }
}
