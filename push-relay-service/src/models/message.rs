use serde::{Deserialize, Serialize};

/// Inbound relay request. Wire names are camelCase for compatibility with
/// existing clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub message: Option<Message>,
    #[serde(default)]
    pub additional_tokens: Option<Vec<String>>,
}

/// An FCM v1 message body. `notification`, `data` and `android` are carried
/// as opaque JSON: FCM is the final validator for their contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android: Option<serde_json::Value>,
}

impl Message {
    /// Non-empty token target. Legacy clients send `token: ""` to mean
    /// "absent", so empty strings don't count.
    pub fn token_target(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.is_empty())
    }

    /// Non-empty topic target; same empty-string rule as [`token_target`].
    ///
    /// [`token_target`]: Message::token_target
    pub fn topic_target(&self) -> Option<&str> {
        self.topic.as_deref().filter(|topic| !topic.is_empty())
    }

    /// Same content retargeted at a different device token.
    pub fn with_token(&self, token: &str) -> Message {
        Message {
            token: Some(token.to_string()),
            topic: None,
            notification: self.notification.clone(),
            data: self.data.clone(),
            android: self.android.clone(),
        }
    }
}

/// One entry in the `results` array of a successful relay response: the
/// provider message id for a direct send, or an aggregate for one batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DispatchEntry {
    MessageId(String),
    Batch(BatchSummary),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_size: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
    pub results: Vec<DispatchEntry>,
}
