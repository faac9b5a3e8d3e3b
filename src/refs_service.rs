//! Refs subsystem (component K): scoped external locators attached to
//! sessions and orders (table numbers, marketplace order ids, delivery
//! tracking codes), plus sequence allocation for caller-facing counters.

use crate::error::RefError;
use crate::models::refs::{normalize_value, restrict_scope, RefScope, RefType, TargetKind};
use dashmap::DashMap;
use sqlx::{Postgres, Transaction};

/// Ref types declared at process start. Looked up by slug on every call;
/// registering the same slug twice is a startup bug, not a runtime error,
/// so the last registration silently wins (mirrors how channel configs are
/// loaded once and never contested at runtime).
#[derive(Default)]
pub struct RefTypeRegistry {
    types: DashMap<String, RefType>,
}

impl RefTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, ref_type: RefType) {
        self.types.insert(ref_type.slug.clone(), ref_type);
    }

    pub fn get(&self, slug: &str) -> Option<RefType> {
        self.types.get(slug).map(|e| e.value().clone())
    }
}

pub struct RefsService<'a> {
    pub repo: &'a crate::repo::RefRepo,
    pub types: &'a RefTypeRegistry,
}

impl<'a> RefsService<'a> {
    pub fn new(repo: &'a crate::repo::RefRepo, types: &'a RefTypeRegistry) -> Self {
        Self { repo, types }
    }

    pub async fn attach_ref(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        target_kind: TargetKind,
        target_id: i64,
        ref_type_slug: &str,
        value: &str,
        scope: RefScope,
    ) -> Result<i64, RefError> {
        let ref_type = self
            .types
            .get(ref_type_slug)
            .ok_or_else(|| RefError::RefTypeNotFound(ref_type_slug.to_string()))?;

        if !ref_type.accepts(target_kind) {
            return Err(RefError::RefTypeNotFound(ref_type_slug.to_string()));
        }

        let missing: Vec<String> = ref_type
            .scope_keys
            .iter()
            .filter(|k| !scope.contains_key(*k))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(RefError::RefScopeInvalid(missing));
        }

        let value = normalize_value(value);
        let scope = restrict_scope(&scope, &ref_type.scope_keys);

        if ref_type.unique_while_active {
            let existing = self
                .repo
                .find_active_for_update(tx, ref_type_slug, &value, &scope)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "refs: lookup failed");
                    RefError::RefTypeNotFound(ref_type_slug.to_string())
                })?;
            if let Some(existing) = existing {
                if existing.target_kind == target_kind && existing.target_id == target_id {
                    return Ok(existing.id);
                }
                return Err(RefError::RefConflict {
                    ref_type_slug: ref_type_slug.to_string(),
                    value,
                    existing_target_kind: existing.target_kind.as_str().to_string(),
                    existing_target_id: existing.target_id.to_string(),
                });
            }
        }

        self.repo
            .create(tx, ref_type_slug, target_kind, target_id, &value, &scope)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "refs: create failed");
                RefError::RefTypeNotFound(ref_type_slug.to_string())
            })
    }

    pub async fn resolve_ref(
        &self,
        ref_type_slug: &str,
        value: &str,
        scope: &RefScope,
    ) -> Result<Option<(TargetKind, i64)>, sqlx::Error> {
        let value = normalize_value(value);
        self.repo.resolve(ref_type_slug, &value, scope).await
    }

    pub async fn deactivate_refs(
        &self,
        target_kind: TargetKind,
        target_id: i64,
        ref_type_slugs: Option<&[String]>,
    ) -> Result<u64, sqlx::Error> {
        self.repo.deactivate(target_kind, target_id, ref_type_slugs).await
    }

    /// Called by the commit engine once the order row exists: copies refs
    /// flagged `copy_to_order` onto the new order, and deactivates session
    /// refs flagged `expires_on_session_close`.
    pub async fn on_session_committed(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        session_id: i64,
        order_id: i64,
    ) -> Result<(), sqlx::Error> {
        let active = self
            .repo
            .active_for_target(tx, TargetKind::Session, session_id)
            .await?;

        for r in &active {
            let Some(ref_type) = self.types.get(&r.ref_type_slug) else {
                continue;
            };
            if ref_type.copy_to_order {
                self.repo
                    .create(tx, &r.ref_type_slug, TargetKind::Order, order_id, &r.value, &r.scope)
                    .await?;
            }
        }

        let expiring_slugs: Vec<String> = active
            .iter()
            .filter(|r| self.types.get(&r.ref_type_slug).map(|t| t.expires_on_session_close).unwrap_or(false))
            .map(|r| r.ref_type_slug.clone())
            .collect();
        if !expiring_slugs.is_empty() {
            sqlx::query(
                "UPDATE refs_tb SET is_active = false WHERE target_kind = 'session' AND target_id = $1 AND ref_type_slug = ANY($2) AND is_active = true",
            )
            .bind(session_id)
            .bind(&expiring_slugs)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

/// Zero-pads a sequence counter to `width` digits.
pub fn format_sequence(counter: i64, width: usize) -> String {
    format!("{counter:0width$}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_type_registry_round_trips() {
        let registry = RefTypeRegistry::new();
        registry.register(RefType {
            slug: "table".into(),
            label: "Table".into(),
            target_kind: None,
            scope_keys: vec!["store_id".into()],
            unique_while_active: true,
            expires_on_session_close: true,
            copy_to_order: false,
        });
        assert!(registry.get("table").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn format_sequence_zero_pads() {
        assert_eq!(format_sequence(7, 4), "0007");
        assert_eq!(format_sequence(12345, 4), "12345");
    }
}
