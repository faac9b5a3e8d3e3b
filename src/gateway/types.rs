//! HTTP request/response DTOs for the order-hub surface (§6.1).
//!
//! Domain types (`Session`, `Order`, `Directive`, `Channel`) are served
//! as-is via `Json<T>`; this module only covers request bodies and the
//! uniform error envelope.

use crate::ops::Op;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Uniform error envelope returned for every non-2xx response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[schema(value_type = Object)]
    pub context: serde_json::Value,
}

impl From<&crate::error::EngineError> for ErrorResponse {
    fn from(err: &crate::error::EngineError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            context: err.context(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub channel_code: String,
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub handle_type: Option<String>,
    #[serde(default)]
    pub handle_ref: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModifyRequest {
    pub channel_code: String,
    pub ops: Vec<Op>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveRequest {
    pub channel_code: String,
    pub issue_id: String,
    pub action_id: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub input: serde_json::Value,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CommitRequest {
    pub channel_code: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub channel_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub channel_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionKeyQuery {
    pub channel_code: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
