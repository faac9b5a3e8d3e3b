//! Channel: a sales origin with its own pricing/edit policy and order-flow config.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Config keys the kernel understands. Anything else is rejected at construction
/// time, mirroring the source's `Channel.clean()` whitelist check.
const KNOWN_CONFIG_KEYS: &[&str] = &[
    "icon",
    "required_checks_on_commit",
    "checks",
    "post_commit_directives",
    "order_flow",
    "notifications",
    "terminology",
    "status_flow",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingPolicy {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditPolicy {
    Open,
    Locked,
}

/// Per-check configuration: which directive topic to enqueue on modify.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckConfig {
    pub directive_topic: Option<String>,
}

/// Channel-overridable order-flow graph; absent fields fall back to the
/// kernel defaults in [`crate::order_state`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrderFlowConfig {
    pub transitions: Option<HashMap<String, Vec<String>>>,
    pub terminal_statuses: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    #[serde(default)]
    pub required_checks_on_commit: Vec<String>,
    #[serde(default)]
    pub checks: HashMap<String, CheckConfig>,
    #[serde(default)]
    pub post_commit_directives: Vec<String>,
    #[serde(default)]
    pub order_flow: OrderFlowConfig,
    #[serde(default)]
    pub notifications: serde_json::Value,
    #[serde(default)]
    pub terminology: serde_json::Value,
    #[serde(default)]
    pub status_flow: serde_json::Value,
    #[serde(default)]
    pub icon: Option<String>,
}

impl ChannelConfig {
    /// Directive topic for a given check code: the check's configured topic, or
    /// `<check>.hold` by default.
    pub fn directive_topic_for(&self, check_code: &str) -> String {
        self.checks
            .get(check_code)
            .and_then(|c| c.directive_topic.clone())
            .unwrap_or_else(|| format!("{check_code}.hold"))
    }

    /// Validates a raw JSON config object against the known-keys whitelist,
    /// returning the offending keys if any are unknown.
    pub fn validate_keys(raw: &serde_json::Map<String, serde_json::Value>) -> Result<(), Vec<String>> {
        let unknown: Vec<String> = raw
            .keys()
            .filter(|k| !KNOWN_CONFIG_KEYS.contains(&k.as_str()))
            .cloned()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(unknown)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub display_order: i32,
    pub is_active: bool,
    pub pricing_policy: PricingPolicy,
    pub edit_policy: EditPolicy,
    pub config: ChannelConfig,
}

impl Channel {
    pub fn requires_external_pricing(&self) -> bool {
        self.pricing_policy == PricingPolicy::External
    }

    pub fn is_locked(&self) -> bool {
        self.edit_policy == EditPolicy::Locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_topic_defaults_to_check_dot_hold() {
        let config = ChannelConfig::default();
        assert_eq!(config.directive_topic_for("stock"), "stock.hold");
    }

    #[test]
    fn directive_topic_honors_override() {
        let mut config = ChannelConfig::default();
        config.checks.insert(
            "stock".to_string(),
            CheckConfig {
                directive_topic: Some("custom.topic".to_string()),
            },
        );
        assert_eq!(config.directive_topic_for("stock"), "custom.topic");
    }

    #[test]
    fn validate_keys_rejects_unknown() {
        let mut raw = serde_json::Map::new();
        raw.insert("bogus_key".to_string(), serde_json::json!(true));
        let err = ChannelConfig::validate_keys(&raw).unwrap_err();
        assert_eq!(err, vec!["bogus_key".to_string()]);
    }

    #[test]
    fn validate_keys_accepts_known() {
        let mut raw = serde_json::Map::new();
        raw.insert("required_checks_on_commit".to_string(), serde_json::json!([]));
        assert!(ChannelConfig::validate_keys(&raw).is_ok());
    }
}
