//! Error taxonomy for the order-hub kernel.
//!
//! Every engine surfaces its own family. Each variant carries a stable machine
//! `code`, a human message, and optional structured context for the HTTP envelope
//! `{code, message, context}`.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct OmnimanError {
    pub code: &'static str,
    pub message: String,
    pub context: Value,
    pub http_status: u16,
}

impl OmnimanError {
    pub fn new(code: &'static str, message: impl Into<String>, http_status: u16) -> Self {
        Self {
            code,
            message: message.into(),
            context: Value::Object(Default::default()),
            http_status,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// `ValidationError`: Validator/modifier pipeline rejected the request.
/// Codes: `missing_sku`, `invalid_qty`, `unsupported_op`, `missing_unit_price_q`,
/// `unknown_line_id`, `invalid_merge`, `sku_mismatch`, `data_path_forbidden`.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("sku is required")]
    MissingSku,
    #[error("qty must be a positive number")]
    InvalidQty,
    #[error("unsupported operation: {0}")]
    UnsupportedOp(String),
    #[error("unit_price_q is required for channels with external pricing policy")]
    MissingUnitPriceQ,
    #[error("no line with id {0}")]
    UnknownLineId(String),
    #[error("merge_lines requires two distinct line ids")]
    InvalidMerge,
    #[error("merge_lines requires both lines to share the same sku")]
    SkuMismatch,
    #[error("data path '{0}' is not writable by this op")]
    DataPathForbidden(String),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSku => "missing_sku",
            Self::InvalidQty => "invalid_qty",
            Self::UnsupportedOp(_) => "unsupported_op",
            Self::MissingUnitPriceQ => "missing_unit_price_q",
            Self::UnknownLineId(_) => "unknown_line_id",
            Self::InvalidMerge => "invalid_merge",
            Self::SkuMismatch => "sku_mismatch",
            Self::DataPathForbidden(_) => "data_path_forbidden",
        }
    }
}

/// `SessionError`: session lookup/state errors common to every write engine.
/// Codes: `not_found`, `already_committed`, `already_abandoned`, `locked`.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session is already committed")]
    AlreadyCommitted,
    #[error("session is already abandoned")]
    AlreadyAbandoned,
    #[error(
        "channel '{channel_name}' is locked; its contents are managed by a platform outside this system's control"
    )]
    Locked { channel_name: String },
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyCommitted => "already_committed",
            Self::AlreadyAbandoned => "already_abandoned",
            Self::Locked { .. } => "locked",
        }
    }
}

/// `CommitError`: raised by the commit engine.
/// Codes: `in_progress`, `missing_check`, `stale_check`, `hold_expired`,
/// `blocking_issues`, `empty_session`, `already_committed`, `abandoned`.
#[derive(Debug, Clone, Error)]
pub enum CommitError {
    #[error("a commit with this idempotency key is already in progress")]
    InProgress,
    #[error("required check '{0}' has not been computed")]
    MissingCheck(String),
    #[error("check '{0}' is stale: session has advanced since it was computed")]
    StaleCheck(String),
    #[error("a hold has expired")]
    HoldExpired { hold_id: String },
    #[error("session has blocking issues")]
    BlockingIssues { issues: Value },
    #[error("session has no items to commit")]
    EmptySession,
    #[error("session is committed but no matching order exists")]
    AlreadyCommittedNoOrder,
    #[error("session is abandoned")]
    Abandoned,
}

impl CommitError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::MissingCheck(_) => "missing_check",
            Self::StaleCheck(_) => "stale_check",
            Self::HoldExpired { .. } => "hold_expired",
            Self::BlockingIssues { .. } => "blocking_issues",
            Self::EmptySession => "empty_session",
            Self::AlreadyCommittedNoOrder => "already_committed",
            Self::Abandoned => "abandoned",
        }
    }
}

/// `DirectiveError`: raised while dispatching a directive to its handler.
/// Codes: `no_handler`, `handler_failed`.
#[derive(Debug, Clone, Error)]
pub enum DirectiveError {
    #[error("no handler registered for topic '{0}'")]
    NoHandler(String),
    #[error("handler failed: {0}")]
    HandlerFailed(String),
}

impl DirectiveError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoHandler(_) => "no_handler",
            Self::HandlerFailed(_) => "handler_failed",
        }
    }
}

/// `IssueResolveError`: raised by the resolve engine, wrapping inner errors with
/// their original code preserved so callers can always identify the failing component.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct IssueResolveError {
    pub code: String,
    pub message: String,
    pub context: Value,
}

impl IssueResolveError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: Value::Object(Default::default()),
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn session_not_found() -> Self {
        Self::new("session_not_found", "session not found")
    }

    pub fn issue_not_found() -> Self {
        Self::new("issue_not_found", "issue not found")
    }

    pub fn no_resolver(source: &str) -> Self {
        Self::new("no_resolver", format!("no resolver registered for source '{source}'"))
    }

    pub fn action_not_found() -> Self {
        Self::new("action_not_found", "action not found on issue")
    }

    pub fn stale_action() -> Self {
        Self::new(
            "stale_action",
            "action's rev no longer matches the session's current rev",
        )
    }

    pub fn no_ops() -> Self {
        Self::new("no_ops", "action has no ops to apply")
    }

    pub fn resolver_error(message: impl Into<String>) -> Self {
        Self::new("resolver_error", message)
    }
}

/// `IdempotencyError`. Codes: `in_progress`, `conflict`.
#[derive(Debug, Clone, Error)]
pub enum IdempotencyError {
    #[error("operation with this idempotency key is already in progress")]
    InProgress,
    #[error("idempotency key reused with conflicting payload")]
    Conflict,
}

/// `InvalidTransition`: raised by the order state machine.
/// Codes: `invalid_transition`, `terminal_status`.
#[derive(Debug, Clone, Error)]
pub enum TransitionError {
    #[error("cannot transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },
    #[error("order is in terminal status '{0}'")]
    TerminalStatus(String),
}

impl TransitionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::TerminalStatus(_) => "terminal_status",
        }
    }
}

/// `RefError`: raised by the refs subsystem.
/// Codes: `RefTypeNotFound`, `RefScopeInvalid`, `RefConflict`.
#[derive(Debug, Clone, Error)]
pub enum RefError {
    #[error("unknown ref type '{0}'")]
    RefTypeNotFound(String),
    #[error("scope is missing required key(s): {0:?}")]
    RefScopeInvalid(Vec<String>),
    #[error("ref value already attached to a different target")]
    RefConflict {
        ref_type_slug: String,
        value: String,
        existing_target_kind: String,
        existing_target_id: String,
    },
}

impl RefError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RefTypeNotFound(_) => "RefTypeNotFound",
            Self::RefScopeInvalid(_) => "RefScopeInvalid",
            Self::RefConflict { .. } => "RefConflict",
        }
    }
}

/// Top-level error type composing all families, used at engine boundaries so `?`
/// can propagate cleanly through repository -> engine -> HTTP handler.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Directive(#[from] DirectiveError),
    #[error(transparent)]
    Resolve(#[from] IssueResolveError),
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Ref(#[from] RefError),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{0}")]
    NotFound(String),
}

impl EngineError {
    pub fn code(&self) -> String {
        match self {
            Self::Validation(e) => e.code().to_string(),
            Self::Session(e) => e.code().to_string(),
            Self::Commit(e) => e.code().to_string(),
            Self::Directive(e) => e.code().to_string(),
            Self::Resolve(e) => e.code.clone(),
            Self::Idempotency(IdempotencyError::InProgress) => "in_progress".to_string(),
            Self::Idempotency(IdempotencyError::Conflict) => "conflict".to_string(),
            Self::Transition(e) => e.code().to_string(),
            Self::Ref(e) => e.code().to_string(),
            Self::Internal(_) => "internal".to_string(),
            Self::NotFound(_) => "not_found".to_string(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Session(SessionError::NotFound) => 404,
            Self::Session(_) => 400,
            Self::Commit(CommitError::InProgress) => 409,
            Self::Commit(_) => 400,
            Self::Directive(_) => 500,
            Self::Resolve(_) => 400,
            Self::Idempotency(IdempotencyError::InProgress) => 409,
            Self::Idempotency(IdempotencyError::Conflict) => 409,
            Self::Transition(_) => 400,
            Self::Ref(RefError::RefTypeNotFound(_)) => 404,
            Self::Ref(_) => 400,
            Self::Internal(_) => 500,
            Self::NotFound(_) => 404,
        }
    }

    pub fn context(&self) -> Value {
        match self {
            Self::Commit(CommitError::HoldExpired { hold_id }) => {
                serde_json::json!({ "hold_id": hold_id })
            }
            Self::Commit(CommitError::BlockingIssues { issues }) => {
                serde_json::json!({ "blocking_issues": issues })
            }
            Self::Session(SessionError::Locked { channel_name }) => {
                serde_json::json!({ "channel": channel_name })
            }
            Self::Resolve(e) => e.context.clone(),
            Self::Ref(RefError::RefScopeInvalid(missing)) => {
                serde_json::json!({ "missing_scope_keys": missing })
            }
            Self::Ref(RefError::RefConflict {
                ref_type_slug,
                value,
                existing_target_kind,
                existing_target_id,
            }) => serde_json::json!({
                "ref_type": ref_type_slug,
                "value": value,
                "existing_target_kind": existing_target_kind,
                "existing_target_id": existing_target_id,
            }),
            _ => Value::Object(Default::default()),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "database error");
        EngineError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_codes() {
        assert_eq!(SessionError::NotFound.code(), "not_found");
        assert_eq!(SessionError::AlreadyCommitted.code(), "already_committed");
    }

    #[test]
    fn engine_error_maps_http_status() {
        let err: EngineError = SessionError::NotFound.into();
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn commit_in_progress_is_409() {
        let err: EngineError = CommitError::InProgress.into();
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn locked_session_names_the_channel() {
        let err = SessionError::Locked {
            channel_name: "iFood".to_string(),
        };
        assert!(err.to_string().contains("iFood"));
    }
}
