use crate::ctx::EngineCtx;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-scope call counters backing the `omniman_modify` / `omniman_commit`
/// rate-limit scopes named in the HTTP contract. Observation only: this
/// implementation counts calls, it does not reject them.
#[derive(Default)]
pub struct RateLimitCounters {
    modify: AtomicU64,
    commit: AtomicU64,
}

impl RateLimitCounters {
    pub fn record_modify(&self) -> u64 {
        self.modify.fetch_add(1, Ordering::Relaxed)
    }

    pub fn record_commit(&self) -> u64 {
        self.commit.fetch_add(1, Ordering::Relaxed)
    }
}

/// Gateway application state (shared).
#[derive(Clone)]
pub struct AppState {
    /// Everything a write engine or directive handler needs: db pool,
    /// backend adapters, the four extension registries, and the calling actor.
    pub ctx: EngineCtx,
    pub rate_limits: Arc<RateLimitCounters>,
}

impl AppState {
    pub fn new(ctx: EngineCtx) -> Self {
        Self {
            ctx,
            rate_limits: Arc::new(RateLimitCounters::default()),
        }
    }
}
