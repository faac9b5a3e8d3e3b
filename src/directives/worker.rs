//! Poll loop: pulls due directives off the queue and dispatches them to
//! whatever handler the registry has for their topic.

use crate::ctx::EngineCtx;
use crate::models::directive::Directive;
use crate::repo::DirectiveRepo;
use std::time::Duration;

/// Runs one poll-and-dispatch cycle over `topics`, processing up to `limit`
/// due directives. Returns how many were dispatched.
pub async fn run_cycle(ctx: &EngineCtx, topics: &[String], limit: i64) -> Result<usize, sqlx::Error> {
    let repo = DirectiveRepo::new(ctx.db.pool().clone());
    let due = repo.poll_due(topics, limit).await?;
    let count = due.len();

    for directive in due {
        dispatch_one(ctx, &repo, directive).await;
    }
    Ok(count)
}

async fn dispatch_one(ctx: &EngineCtx, repo: &DirectiveRepo, directive: Directive) {
    if let Err(e) = repo.mark_running(directive.id).await {
        tracing::error!(directive_id = directive.id, error = %e, "directive: failed to mark running");
        return;
    }

    let Some(handler) = ctx.registry.directive_handler(&directive.topic) else {
        tracing::warn!(directive_id = directive.id, topic = %directive.topic, "no handler registered for topic, leaving running");
        return;
    };

    match handler.handle(&directive).await {
        Ok(()) => {
            // Handlers own their own terminal status (see the stock-hold
            // handler, which may mark `failed` on a stale rev even though
            // dispatch itself succeeded).
        }
        Err(e) => {
            tracing::error!(directive_id = directive.id, topic = %directive.topic, error = %e, "directive handler failed");
            if let Err(mark_err) = repo.mark_failed(directive.id, &e.to_string()).await {
                tracing::error!(directive_id = directive.id, error = %mark_err, "directive: failed to mark failed");
            }
        }
    }
}

/// A standalone poll loop for the `process-directives --watch` CLI mode:
/// runs `run_cycle` every `interval` until the process is killed.
pub struct Worker {
    pub topics: Vec<String>,
    pub limit: i64,
    pub interval: Duration,
}

impl Worker {
    pub async fn run_once(&self, ctx: &EngineCtx) -> Result<usize, sqlx::Error> {
        run_cycle(ctx, &self.topics, self.limit).await
    }

    pub async fn run_forever(&self, ctx: &EngineCtx) -> Result<(), sqlx::Error> {
        loop {
            let n = self.run_once(ctx).await?;
            if n > 0 {
                tracing::info!(dispatched = n, "directive cycle complete");
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
