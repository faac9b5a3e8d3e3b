//! Omniman order-hub binary: serves the HTTP gateway, drives the directive
//! queue, and houses the idempotency-key janitor.

use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use omniman::backends::Backends;
use omniman::config::AppConfig;
use omniman::ctx::EngineCtx;
use omniman::db::Database;
use omniman::directives::handlers::{
    PaymentCaptureHandler, PaymentRefundHandler, StockCommitHandler, StockHoldHandler,
};
use omniman::directives::worker::Worker;
use omniman::engines::resolve::StockIssueResolver;
use omniman::gateway;
use omniman::logging;
use omniman::modifiers::PricingModifier;
use omniman::refs_service::RefTypeRegistry;
use omniman::registry::Registry;
use omniman::repo::IdempotencyRepo;

#[derive(Parser)]
#[command(name = "omniman", about = "Omnichannel order hub")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the HTTP gateway until killed.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Polls the directive queue and dispatches due directives.
    ProcessDirectives {
        /// Topics to poll; defaults to all four built-in topics.
        #[arg(long = "topic")]
        topics: Vec<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        /// Keep polling on an interval instead of running one cycle.
        #[arg(long)]
        watch: bool,
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
    /// Deletes expired and stale idempotency-key rows.
    CleanupIdempotencyKeys {
        #[arg(long, default_value_t = 7)]
        days: i64,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        include_in_progress: bool,
    },
}

fn default_topics() -> Vec<String> {
    vec![
        "stock.hold".to_string(),
        "stock.commit".to_string(),
        "payment.capture".to_string(),
        "payment.refund".to_string(),
    ]
}

fn build_registry() -> Result<Registry, Box<dyn std::error::Error>> {
    let registry = Registry::new();
    registry.register_modifier(0, Arc::new(PricingModifier))?;
    registry.register_issue_resolver("stock", Arc::new(StockIssueResolver))?;
    Ok(registry)
}

fn register_directive_handlers(registry: &Registry, ctx: &EngineCtx) -> Result<(), Box<dyn std::error::Error>> {
    registry.register_directive_handler("stock.hold", Arc::new(StockHoldHandler { ctx: ctx.clone() }))?;
    registry.register_directive_handler("stock.commit", Arc::new(StockCommitHandler { ctx: ctx.clone() }))?;
    registry.register_directive_handler("payment.capture", Arc::new(PaymentCaptureHandler { ctx: ctx.clone() }))?;
    registry.register_directive_handler("payment.refund", Arc::new(PaymentRefundHandler { ctx: ctx.clone() }))?;
    Ok(())
}

async fn bootstrap(config: &AppConfig) -> Result<EngineCtx, Box<dyn std::error::Error>> {
    let db = Database::connect(&config.database_url, config.db_pool_max_connections).await?;
    db.health_check().await?;

    let registry = Arc::new(build_registry()?);
    let ctx = EngineCtx::new(
        db,
        Backends::mock(),
        registry.clone(),
        Arc::new(RefTypeRegistry::default()),
        "system",
        config.hold_ttl_minutes,
        config.idempotency_ttl_hours,
    );
    register_directive_handlers(&registry, &ctx)?;
    Ok(ctx)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let _log_guard = logging::init_logging(&config);

    let cli = Cli::parse();
    let ctx = bootstrap(&config).await?;

    match cli.command {
        Command::Serve { bind } => {
            let bind_addr = bind.unwrap_or(config.bind_addr.clone());
            gateway::run_server(ctx, &bind_addr).await?;
        }
        Command::ProcessDirectives { topics, limit, watch, interval } => {
            let topics = if topics.is_empty() { default_topics() } else { topics };
            let worker = Worker { topics, limit, interval: std::time::Duration::from_secs(interval) };
            if watch {
                worker.run_forever(&ctx).await?;
            } else {
                let n = worker.run_once(&ctx).await?;
                tracing::info!(dispatched = n, "directive cycle complete");
            }
        }
        Command::CleanupIdempotencyKeys { days, dry_run, include_in_progress } => {
            let repo = IdempotencyRepo::new(ctx.db.pool().clone());
            let cutoff = Utc::now() - Duration::days(days);
            let affected = repo.cleanup(cutoff, include_in_progress, dry_run).await?;
            if dry_run {
                tracing::info!(affected, cutoff = %cutoff, "cleanup-idempotency-keys: would delete");
            } else {
                tracing::info!(affected, cutoff = %cutoff, "cleanup-idempotency-keys: deleted");
            }
        }
    }

    Ok(())
}
