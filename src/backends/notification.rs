//! Notification backend contract: best-effort delivery of lifecycle events to
//! a recipient (email, SMS, webhook, whatever a deployment wires in).

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum NotificationBackendError {
    #[error("notification backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait NotificationBackend: Send + Sync {
    async fn send(
        &self,
        event: &str,
        recipient: &str,
        context: Value,
    ) -> Result<NotificationResult, NotificationBackendError>;
}
