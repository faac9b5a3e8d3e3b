//! HTTP surface (§6.1): a thin axum layer in front of the four write engines
//! and the read-only repositories. No auth middleware — out of scope per the
//! spec's non-goals.

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::ctx::EngineCtx;
use state::AppState;

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/channels", get(handlers::list_channels))
        .route("/channels/{code}", get(handlers::get_channel))
        .route("/sessions", get(handlers::list_sessions).post(handlers::create_session))
        .route("/sessions/{key}", get(handlers::get_session))
        .route("/sessions/{key}/modify", post(handlers::modify_session))
        .route("/sessions/{key}/resolve", post(handlers::resolve_session))
        .route("/sessions/{key}/commit", post(handlers::commit_session))
        .route("/orders", get(handlers::list_orders))
        .route("/orders/{ref}", get(handlers::get_order))
        .route("/directives", get(handlers::list_directives))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Starts the HTTP surface, binding to `bind_addr` and serving until the
/// process is killed.
pub async fn run_server(ctx: EngineCtx, bind_addr: &str) -> Result<(), std::io::Error> {
    let state = Arc::new(AppState::new(ctx));
    let app = build_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(bind_addr, "gateway listening");
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::Backends;
    use crate::refs_service::RefTypeRegistry;
    use crate::registry::Registry;

    #[tokio::test]
    #[ignore = "Requires PostgreSQL running"]
    async fn router_builds_with_a_mock_backed_context() {
        let db = crate::db::Database::connect("postgres://localhost/omniman_test", 1)
            .await
            .expect("connect");
        let ctx = EngineCtx::system(db, Backends::mock(), Arc::new(Registry::default()), Arc::new(RefTypeRegistry::default()));
        let state = Arc::new(AppState::new(ctx));
        let _app = build_router(state);
    }
}
