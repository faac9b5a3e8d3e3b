//! Refs subsystem types: scoped external locators attached to sessions/orders.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Session,
    Order,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Order => "order",
        }
    }
}

/// A ref type's declaration, registered at process start (analogous to the
/// source's static `RefType` rows).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefType {
    pub slug: String,
    pub label: String,
    /// `None` means the type accepts either target kind (`BOTH` in the source).
    pub target_kind: Option<TargetKind>,
    pub scope_keys: Vec<String>,
    pub unique_while_active: bool,
    pub expires_on_session_close: bool,
    pub copy_to_order: bool,
}

impl RefType {
    pub fn accepts(&self, kind: TargetKind) -> bool {
        match self.target_kind {
            None => true,
            Some(k) => k == kind,
        }
    }
}

/// Normalized, declared-keys-only scope bag. Ordered so that equal scopes
/// compare equal regardless of insertion order.
pub type RefScope = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ref {
    pub id: i64,
    pub ref_type_slug: String,
    pub target_kind: TargetKind,
    pub target_id: i64,
    pub value: String,
    pub scope: RefScope,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefSequence {
    pub sequence_name: String,
    pub scope_hash: String,
    pub counter: i64,
}

pub fn normalize_value(value: &str) -> String {
    value.trim().to_uppercase()
}

pub fn restrict_scope(scope: &RefScope, declared_keys: &[String]) -> RefScope {
    scope
        .iter()
        .filter(|(k, _)| declared_keys.contains(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_and_uppercases() {
        assert_eq!(normalize_value("  abc123  "), "ABC123");
    }

    #[test]
    fn restrict_scope_drops_undeclared_keys() {
        let mut scope = RefScope::new();
        scope.insert("table".to_string(), "12".to_string());
        scope.insert("extra".to_string(), "noise".to_string());
        let restricted = restrict_scope(&scope, &["table".to_string()]);
        assert_eq!(restricted.len(), 1);
        assert!(restricted.contains_key("table"));
    }

    #[test]
    fn ref_type_accepts_both_when_unspecified() {
        let rt = RefType {
            slug: "table".into(),
            label: "Table".into(),
            target_kind: None,
            scope_keys: vec![],
            unique_while_active: true,
            expires_on_session_close: true,
            copy_to_order: true,
        };
        assert!(rt.accepts(TargetKind::Session));
        assert!(rt.accepts(TargetKind::Order));
    }
}
