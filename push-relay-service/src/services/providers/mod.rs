pub mod push;

use crate::models::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use push::{FcmProvider, MockPushProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not enabled: {0}")]
    NotEnabled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),

    #[error("Authentication error: {0}")]
    Authentication(String),
}

/// Result of a single direct send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub provider_id: Option<String>,
    pub success: bool,
    pub message: Option<String>,
}

impl ProviderResponse {
    pub fn success(provider_id: Option<String>) -> Self {
        Self {
            provider_id,
            success: true,
            message: None,
        }
    }
}

/// Aggregate outcome of one multi-send call (a single chunk).
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub success_count: usize,
    pub failure_count: usize,
}

#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Send one message to its token or topic target.
    async fn send(&self, message: &Message) -> Result<ProviderResponse, ProviderError>;

    /// Submit one chunk of per-token messages as a single multi-send call.
    ///
    /// Per-message rejections are reflected in the outcome counts; only a
    /// transport-level failure returns `Err`, which aborts the caller's
    /// remaining chunks.
    async fn send_each(&self, messages: &[Message]) -> Result<BatchOutcome, ProviderError>;

    /// Subscribe a device token to a topic.
    async fn subscribe_to_topic(&self, device_token: &str, topic: &str)
        -> Result<(), ProviderError>;

    async fn health_check(&self) -> Result<(), ProviderError>;

    fn is_enabled(&self) -> bool;
}
