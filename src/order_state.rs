//! Order state machine (component J): the only write path for `Order.status`.
//!
//! The default transition graph lives here as plain data; a channel may
//! override both the graph and the terminal set via `channel.config.order_flow`.

use crate::error::{EngineError, TransitionError};
use crate::models::channel::ChannelConfig;
use crate::models::order::{Order, OrderStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

fn status_name(status: OrderStatus) -> &'static str {
    status.as_str()
}

fn default_transitions() -> HashMap<&'static str, Vec<&'static str>> {
    HashMap::from([
        ("new", vec!["confirmed", "cancelled"]),
        ("confirmed", vec!["processing", "ready", "cancelled"]),
        ("processing", vec!["ready", "cancelled"]),
        ("ready", vec!["dispatched", "completed"]),
        ("dispatched", vec!["delivered", "returned"]),
        ("delivered", vec!["completed", "returned"]),
        ("completed", vec![]),
        ("cancelled", vec![]),
        ("returned", vec!["completed"]),
    ])
}

fn default_terminal_statuses() -> Vec<&'static str> {
    vec!["completed", "cancelled"]
}

/// The transition graph resolved for a specific channel: the channel's
/// `order_flow` override where present, the kernel defaults otherwise.
pub struct OrderFlow {
    transitions: HashMap<String, Vec<String>>,
    terminal_statuses: Vec<String>,
}

impl OrderFlow {
    pub fn for_channel(config: &ChannelConfig) -> Self {
        let transitions = config.order_flow.transitions.clone().unwrap_or_else(|| {
            default_transitions()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into_iter().map(str::to_string).collect()))
                .collect()
        });
        let terminal_statuses = config
            .order_flow
            .terminal_statuses
            .clone()
            .unwrap_or_else(|| default_terminal_statuses().into_iter().map(str::to_string).collect());
        Self { transitions, terminal_statuses }
    }

    fn is_terminal(&self, status: OrderStatus) -> bool {
        self.terminal_statuses.iter().any(|s| s == status_name(status))
    }

    fn allows(&self, from: OrderStatus, to: OrderStatus) -> bool {
        self.transitions
            .get(status_name(from))
            .map(|allowed| allowed.iter().any(|s| s == status_name(to)))
            .unwrap_or(false)
    }
}

/// Validates and applies `new_status` to `order`, returning the
/// `status_changed` event payload the caller must persist as an `OrderEvent`.
///
/// Any attempt to change `status` other than through this function (or the
/// commit engine's initial `new` assignment) is refused structurally: `status`
/// has no public setter outside [`Order::transition_to`].
pub fn transition_status(
    flow: &OrderFlow,
    order: &mut Order,
    new_status: OrderStatus,
    at: DateTime<Utc>,
) -> Result<serde_json::Value, EngineError> {
    let current = order.status();
    if flow.is_terminal(current) {
        return Err(TransitionError::TerminalStatus(status_name(current).to_string()).into());
    }
    if !flow.allows(current, new_status) {
        return Err(TransitionError::InvalidTransition {
            from: status_name(current).to_string(),
            to: status_name(new_status).to_string(),
        }
        .into());
    }

    let (old_status, new_status) = order.transition_to(new_status, at);
    Ok(serde_json::json!({
        "old_status": status_name(old_status),
        "new_status": status_name(new_status),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::OrderSnapshot;

    fn sample_order() -> Order {
        Order::new_from_commit(
            1,
            "ORD-20260101-AAAAAAAA".into(),
            "pos".into(),
            "SESS-AAAAAAAAAAAA".into(),
            None,
            None,
            OrderSnapshot {
                items: vec![],
                data: crate::models::session::SessionData::default(),
                pricing: crate::models::session::PricingAggregate::default(),
                rev: 1,
            },
            "BRL".into(),
            1000,
            Utc::now(),
        )
    }

    #[test]
    fn default_flow_rejects_skipping_ahead() {
        let flow = OrderFlow::for_channel(&ChannelConfig::default());
        let mut order = sample_order();
        let err = transition_status(&flow, &mut order, OrderStatus::Dispatched, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
    }

    #[test]
    fn default_flow_walks_the_happy_path() {
        let flow = OrderFlow::for_channel(&ChannelConfig::default());
        let mut order = sample_order();
        transition_status(&flow, &mut order, OrderStatus::Confirmed, Utc::now()).unwrap();
        transition_status(&flow, &mut order, OrderStatus::Processing, Utc::now()).unwrap();
        transition_status(&flow, &mut order, OrderStatus::Ready, Utc::now()).unwrap();
        transition_status(&flow, &mut order, OrderStatus::Dispatched, Utc::now()).unwrap();
        transition_status(&flow, &mut order, OrderStatus::Delivered, Utc::now()).unwrap();
        transition_status(&flow, &mut order, OrderStatus::Completed, Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Completed);
    }

    #[test]
    fn terminal_status_rejects_further_transitions() {
        let flow = OrderFlow::for_channel(&ChannelConfig::default());
        let mut order = sample_order();
        transition_status(&flow, &mut order, OrderStatus::Cancelled, Utc::now()).unwrap();
        let err = transition_status(&flow, &mut order, OrderStatus::Confirmed, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "terminal_status");
    }

    #[test]
    fn channel_override_adds_a_custom_status() {
        let mut config = ChannelConfig::default();
        config.order_flow.transitions = Some(HashMap::from([
            ("new".to_string(), vec!["processing".to_string()]),
            ("processing".to_string(), vec!["completed".to_string()]),
        ]));
        config.order_flow.terminal_statuses = Some(vec!["completed".to_string()]);
        let flow = OrderFlow::for_channel(&config);
        let mut order = sample_order();

        let err = transition_status(&flow, &mut order, OrderStatus::Confirmed, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "invalid_transition");

        transition_status(&flow, &mut order, OrderStatus::Processing, Utc::now()).unwrap();
        transition_status(&flow, &mut order, OrderStatus::Completed, Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Completed);
    }
}
