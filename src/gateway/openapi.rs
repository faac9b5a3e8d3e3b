//! OpenAPI / Swagger UI documentation for the order-hub HTTP surface.
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Omniman Order Hub API",
        version = "1.0.0",
        description = "Transactional engine turning channel sessions into sealed orders.",
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::list_channels,
        crate::gateway::handlers::get_channel,
        crate::gateway::handlers::list_sessions,
        crate::gateway::handlers::get_session,
        crate::gateway::handlers::create_session,
        crate::gateway::handlers::modify_session,
        crate::gateway::handlers::resolve_session,
        crate::gateway::handlers::commit_session,
        crate::gateway::handlers::list_orders,
        crate::gateway::handlers::get_order,
        crate::gateway::handlers::list_directives,
    ),
    components(schemas(
        crate::gateway::types::ErrorResponse,
        crate::gateway::types::CreateSessionRequest,
        crate::gateway::types::ModifyRequest,
        crate::gateway::types::ResolveRequest,
        crate::gateway::types::CommitRequest,
        crate::gateway::types::HealthResponse,
        crate::ops::Op,
    )),
)]
pub struct ApiDoc;
