//! Session: a mutable order-in-progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Committed,
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub line_id: String,
    pub sku: String,
    pub qty: rust_decimal::Decimal,
    pub unit_price_q: Option<i64>,
    pub line_total_q: Option<i64>,
    pub name: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// One computed annotation left on a session by an asynchronous worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckEntry {
    pub rev: i64,
    pub at: DateTime<Utc>,
    pub result: serde_json::Value,
}

/// A remediation recipe attached to an issue: applying it means calling the
/// modify engine with `ops`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueAction {
    pub id: String,
    pub label: String,
    pub rev: i64,
    pub ops: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub source: String,
    pub code: String,
    #[serde(default)]
    pub blocking: bool,
    pub message: String,
    #[serde(default)]
    pub context: IssueContext,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IssueContext {
    #[serde(default)]
    pub line_id: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub actions: Vec<IssueAction>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Computed pricing aggregates, refreshed by modifiers on every modify.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PricingAggregate {
    pub total_q: i64,
    pub items_count: i64,
}

/// The `Session.data` bag: two kernel-managed subkeys plus a free-form,
/// whitelist-gated map for caller data.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionData {
    #[serde(default)]
    pub checks: HashMap<String, CheckEntry>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Root segments reserved for kernel bookkeeping; `set_data` may never target
/// these, nor any key starting with `__`.
pub const RESERVED_DATA_KEYS: &[&str] = &[
    "checks",
    "issues",
    "items",
    "pricing",
    "pricing_trace",
    "state",
    "status",
    "rev",
    "session_key",
    "channel",
];

pub fn is_reserved_data_key(root: &str) -> bool {
    RESERVED_DATA_KEYS.contains(&root) || root.starts_with("__")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub session_key: String,
    pub channel_code: String,
    pub handle_type: Option<String>,
    pub handle_ref: Option<String>,
    pub state: SessionState,
    pub pricing_policy: crate::models::channel::PricingPolicy,
    pub edit_policy: crate::models::channel::EditPolicy,
    pub rev: i64,
    pub items: Vec<LineItem>,
    pub pricing: PricingAggregate,
    #[serde(default)]
    pub pricing_trace: Vec<serde_json::Value>,
    pub data: SessionData,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
    pub commit_token: Option<String>,
}

impl Session {
    pub fn find_line_mut(&mut self, line_id: &str) -> Option<&mut LineItem> {
        self.items.iter_mut().find(|l| l.line_id == line_id)
    }

    pub fn find_line(&self, line_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|l| l.line_id == line_id)
    }

    pub fn find_issue(&self, issue_id: &str) -> Option<&Issue> {
        self.data.issues.iter().find(|i| i.id == issue_id)
    }

    pub fn has_blocking_issues(&self) -> bool {
        self.data.issues.iter().any(|i| i.blocking)
    }

    pub fn blocking_issues(&self) -> Vec<&Issue> {
        self.data.issues.iter().filter(|i| i.blocking).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_keys_are_rejected() {
        assert!(is_reserved_data_key("checks"));
        assert!(is_reserved_data_key("issues"));
        assert!(is_reserved_data_key("rev"));
        assert!(is_reserved_data_key("__secret"));
        assert!(!is_reserved_data_key("table_number"));
    }

    #[test]
    fn find_line_locates_by_id() {
        let session = Session {
            id: 1,
            session_key: "SESS-AAAAAAAAAAAA".into(),
            channel_code: "pos".into(),
            handle_type: None,
            handle_ref: None,
            state: SessionState::Open,
            pricing_policy: crate::models::channel::PricingPolicy::External,
            edit_policy: crate::models::channel::EditPolicy::Open,
            rev: 0,
            items: vec![LineItem {
                line_id: "L-1".into(),
                sku: "COFFEE".into(),
                qty: rust_decimal::Decimal::new(2, 0),
                unit_price_q: Some(500),
                line_total_q: Some(1000),
                name: None,
                meta: serde_json::Value::Null,
            }],
            pricing: PricingAggregate::default(),
            pricing_trace: vec![],
            data: SessionData::default(),
            opened_at: Utc::now(),
            updated_at: Utc::now(),
            committed_at: None,
            commit_token: None,
        };
        assert!(session.find_line("L-1").is_some());
        assert!(session.find_line("L-404").is_none());
    }
}
