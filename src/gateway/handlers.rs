//! HTTP handlers for the order-hub surface (§6.1). Each handler is a thin
//! translation layer: parse the request, call exactly one engine or
//! repository method, map the result to a response.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use super::state::AppState;
use super::types::{
    CommitRequest, CreateSessionRequest, ErrorResponse, HealthResponse, ListOrdersQuery,
    ListSessionsQuery, ModifyRequest, ResolveRequest, SessionKeyQuery,
};
use crate::engines;
use crate::error::EngineError;
use crate::ids;
use crate::repo::session::FindByKeyOutcome;
use crate::repo::{ChannelRepo, DirectiveRepo, OrderRepo, SessionRepo};

/// Wraps an `EngineError` so it can be returned directly from a handler; the
/// HTTP status and `{code, message, context}` body are derived from it.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse::from(&self.0);
        (status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> ApiError {
    ApiError(EngineError::NotFound(message.into()))
}

#[utoipa::path(get, path = "/health", responses((status = 200, description = "Liveness probe")))]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

#[utoipa::path(get, path = "/channels", responses((status = 200, description = "List channels")))]
pub async fn list_channels(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let repo = ChannelRepo::new(state.ctx.db.pool().clone());
    let channels = repo.list().await?;
    Ok(Json(channels))
}

#[utoipa::path(get, path = "/channels/{code}", responses((status = 200, description = "Get a channel"), (status = 404, description = "Not found")))]
pub async fn get_channel(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = ChannelRepo::new(state.ctx.db.pool().clone());
    let channel = repo.find_by_code(&code).await?.ok_or_else(|| not_found("channel not found"))?;
    Ok(Json(channel))
}

#[utoipa::path(get, path = "/sessions", responses((status = 200, description = "List sessions")))]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = SessionRepo::new(state.ctx.db.pool().clone());
    let sessions = repo.list(query.channel_code.as_deref()).await?;
    Ok(Json(sessions))
}

#[utoipa::path(get, path = "/sessions/{key}", responses((status = 200, description = "Get a session"), (status = 404, description = "Not found")))]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<SessionKeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = SessionRepo::new(state.ctx.db.pool().clone());

    let session = match query.channel_code {
        Some(channel_code) => repo.find(&channel_code, &key).await?.ok_or_else(|| not_found("session not found"))?,
        None => match repo.find_by_key_only(&key).await? {
            FindByKeyOutcome::Found(session) => session,
            FindByKeyOutcome::NotFound => return Err(not_found("session not found")),
            FindByKeyOutcome::Ambiguous => {
                return Err(ApiError(EngineError::Internal(
                    "session_key is ambiguous across channels; pass channel_code".to_string(),
                )))
            }
        },
    };
    Ok(Json(session))
}

#[utoipa::path(post, path = "/sessions", request_body = CreateSessionRequest, responses((status = 201, description = "Session created"), (status = 200, description = "Existing open session for the same handle")))]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel_repo = ChannelRepo::new(state.ctx.db.pool().clone());
    let session_repo = SessionRepo::new(state.ctx.db.pool().clone());

    let channel = channel_repo
        .find_by_code(&req.channel_code)
        .await?
        .ok_or_else(|| not_found("channel not found"))?;

    if let (Some(handle_type), Some(handle_ref)) = (req.handle_type.as_deref(), req.handle_ref.as_deref()) {
        if let Some(existing) = session_repo.find_open_by_handle(&req.channel_code, handle_type, handle_ref).await? {
            return Ok((StatusCode::OK, Json(existing)));
        }
    }

    let session_key = req.session_key.unwrap_or_else(ids::generate_session_key);
    let now = chrono::Utc::now();
    let mut tx = state.ctx.db.pool().begin().await.map_err(EngineError::from)?;
    let id = session_repo
        .create(
            &mut tx,
            &session_key,
            &req.channel_code,
            req.handle_type.as_deref(),
            req.handle_ref.as_deref(),
            channel.pricing_policy,
            channel.edit_policy,
            now,
        )
        .await?;
    tx.commit().await.map_err(EngineError::from)?;

    let session = session_repo
        .find(&req.channel_code, &session_key)
        .await?
        .ok_or_else(|| not_found("session vanished right after creation"))?;
    tracing::info!(session_id = id, session_key = %session_key, channel_code = %req.channel_code, "session opened");
    Ok((StatusCode::CREATED, Json(session)))
}

#[utoipa::path(post, path = "/sessions/{key}/modify", request_body = ModifyRequest, responses((status = 200, description = "Session after applying ops")))]
pub async fn modify_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(req): Json<ModifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.rate_limits.record_modify();
    let span = tracing::info_span!("modify_session", session_key = %key, channel_code = %req.channel_code);
    let _enter = span.enter();

    let session = engines::modify_session(&state.ctx, &req.channel_code, &key, &req.ops).await?;
    Ok(Json(session))
}

#[utoipa::path(post, path = "/sessions/{key}/resolve", request_body = ResolveRequest, responses((status = 200, description = "Session after resolving the issue")))]
pub async fn resolve_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(req): Json<ResolveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let span = tracing::info_span!("resolve", session_key = %key, channel_code = %req.channel_code, issue_id = %req.issue_id);
    let _enter = span.enter();

    let session = engines::resolve(&state.ctx, &req.channel_code, &key, &req.issue_id, &req.action_id, req.input).await?;
    Ok(Json(session))
}

#[utoipa::path(post, path = "/sessions/{key}/commit", request_body = CommitRequest, responses((status = 201, description = "New order"), (status = 200, description = "Replayed idempotent commit")))]
pub async fn commit_session(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(req): Json<CommitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.rate_limits.record_commit();
    let idempotency_key = req.idempotency_key.unwrap_or_else(ids::generate_idempotency_key);
    let span = tracing::info_span!("commit", session_key = %key, channel_code = %req.channel_code, idempotency_key = %idempotency_key);
    let _enter = span.enter();

    let body = engines::commit(&state.ctx, &req.channel_code, &key, &idempotency_key).await?;
    let status = if body.get("status").and_then(|v| v.as_str()) == Some("already_committed") {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(body)))
}

#[utoipa::path(get, path = "/orders", responses((status = 200, description = "List orders")))]
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = OrderRepo::new(state.ctx.db.pool().clone());
    let orders = repo.list(query.channel_code.as_deref()).await?;
    Ok(Json(orders))
}

#[utoipa::path(get, path = "/orders/{ref}", responses((status = 200, description = "Get an order"), (status = 404, description = "Not found")))]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_ref): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = OrderRepo::new(state.ctx.db.pool().clone());
    let order = repo.find_by_ref(&order_ref).await?.ok_or_else(|| not_found("order not found"))?;
    Ok(Json(order))
}

#[utoipa::path(get, path = "/directives", responses((status = 200, description = "List directives")))]
pub async fn list_directives(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let repo = DirectiveRepo::new(state.ctx.db.pool().clone());
    let directives = repo.list(200).await?;
    Ok(Json(directives))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_preserves_the_wrapped_status() {
        let engine_err: EngineError = crate::error::SessionError::NotFound.into();
        let err: ApiError = engine_err.into();
        assert_eq!(err.0.http_status(), 404);
    }
}
