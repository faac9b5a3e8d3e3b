//! Shared context threaded through the engines, directive handlers and
//! issue resolvers: the backend adapters and the extension registry, plus
//! the identity of whoever is driving the current operation (used for
//! audit trails on order events).

use crate::backends::Backends;
use crate::db::Database;
use crate::refs_service::RefTypeRegistry;
use crate::registry::Registry;
use std::sync::Arc;

#[derive(Clone)]
pub struct EngineCtx {
    pub db: Database,
    pub backends: Backends,
    pub registry: Arc<Registry>,
    pub ref_types: Arc<RefTypeRegistry>,
    /// Who/what is driving this call: a user id, an API key name, or
    /// "system" for directive workers. Stamped onto `OrderEvent.actor`.
    pub actor: String,
    /// Minutes a stock hold stays valid before it must be recreated;
    /// configured by `HOLD_TTL_MINUTES`.
    pub hold_ttl_minutes: i64,
    /// Hours an idempotency lock is held before being considered orphaned;
    /// configured by `IDEMPOTENCY_TTL_HOURS`.
    pub idempotency_ttl_hours: i64,
}

impl EngineCtx {
    pub fn new(
        db: Database,
        backends: Backends,
        registry: Arc<Registry>,
        ref_types: Arc<RefTypeRegistry>,
        actor: impl Into<String>,
        hold_ttl_minutes: i64,
        idempotency_ttl_hours: i64,
    ) -> Self {
        Self {
            db,
            backends,
            registry,
            ref_types,
            actor: actor.into(),
            hold_ttl_minutes,
            idempotency_ttl_hours,
        }
    }

    /// Context for a background worker acting without an end-user request,
    /// using the defaults an `AppConfig::from_env()` would produce with no
    /// TTL env vars set.
    pub fn system(db: Database, backends: Backends, registry: Arc<Registry>, ref_types: Arc<RefTypeRegistry>) -> Self {
        Self::new(db, backends, registry, ref_types, "system", 15, 24)
    }

    pub fn with_actor(&self, actor: impl Into<String>) -> Self {
        Self {
            db: self.db.clone(),
            backends: self.backends.clone(),
            registry: self.registry.clone(),
            ref_types: self.ref_types.clone(),
            actor: actor.into(),
            hold_ttl_minutes: self.hold_ttl_minutes,
            idempotency_ttl_hours: self.idempotency_ttl_hours,
        }
    }
}
