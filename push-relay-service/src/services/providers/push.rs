use super::{BatchOutcome, ProviderError, ProviderResponse, PushProvider};
use crate::config::FcmConfig;
use crate::models::Message;
use crate::services::metrics::record_provider_call;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

const FCM_API_URL: &str = "https://fcm.googleapis.com/v1/projects";
const IID_BATCH_ADD_URL: &str = "https://iid.googleapis.com/iid/v1:batchAdd";
const OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

/// FCM HTTP v1 provider.
///
/// Mints OAuth2 access tokens from the configured service account key and
/// caches them until near expiry.
pub struct FcmProvider {
    config: FcmConfig,
    credentials: Arc<ServiceAccountKey>,
    token_cache: Arc<Mutex<Option<TokenCache>>>,
    client: Client,
}

/// Google service account key, as downloaded from the console.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub private_key: String,
    pub client_email: String,
    pub client_id: String,
    pub token_uri: String,
}

#[derive(Debug, Clone)]
struct TokenCache {
    access_token: String,
    expires_at: i64,
}

#[derive(Debug, Serialize)]
struct OauthClaims {
    iss: String,
    sub: String,
    scope: String,
    aud: String,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Serialize)]
struct FcmRequest<'a> {
    message: &'a Message,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    name: Option<String>,
}

impl FcmProvider {
    pub fn new(config: FcmConfig) -> Result<Self, ProviderError> {
        if config.project_id.is_empty() {
            return Err(ProviderError::Configuration(
                "FCM project_id is not configured".to_string(),
            ));
        }

        let credentials: ServiceAccountKey = serde_json::from_str(&config.service_account_key)
            .map_err(|e| {
                ProviderError::Configuration(format!("Invalid FCM service account key: {}", e))
            })?;

        Ok(Self {
            config,
            credentials: Arc::new(credentials),
            token_cache: Arc::new(Mutex::new(None)),
            client: Client::new(),
        })
    }

    /// Get an OAuth2 access token, reusing the cached one while it has at
    /// least 60 seconds of validity left.
    async fn get_access_token(&self) -> Result<String, ProviderError> {
        {
            let cache = self
                .token_cache
                .lock()
                .map_err(|_| ProviderError::Authentication("Token cache poisoned".to_string()))?;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Utc::now().timestamp() + 60 {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let now = Utc::now();
        let claims = OauthClaims {
            iss: self.credentials.client_email.clone(),
            sub: self.credentials.client_email.clone(),
            scope: OAUTH_SCOPE.to_string(),
            aud: self.credentials.token_uri.clone(),
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        };

        let encoding_key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .map_err(|e| {
                ProviderError::Authentication(format!("Failed to parse private key: {}", e))
            })?;

        let assertion = encode(
            &Header::new(jsonwebtoken::Algorithm::RS256),
            &claims,
            &encoding_key,
        )
        .map_err(|e| ProviderError::Authentication(format!("Failed to sign assertion: {}", e)))?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];

        let response = self
            .client
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(format!("Token endpoint unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(ProviderError::Authentication(format!(
                "Token request failed with status {}",
                response.status()
            )));
        }

        let token: GoogleTokenResponse = response.json().await.map_err(|e| {
            ProviderError::Authentication(format!("Failed to parse token response: {}", e))
        })?;

        let expires_at = Utc::now().timestamp() + token.expires_in;
        {
            let mut cache = self
                .token_cache
                .lock()
                .map_err(|_| ProviderError::Authentication("Token cache poisoned".to_string()))?;
            *cache = Some(TokenCache {
                access_token: token.access_token.clone(),
                expires_at,
            });
        }

        Ok(token.access_token)
    }

    async fn post_message(&self, message: &Message) -> Result<ProviderResponse, ProviderError> {
        let access_token = self.get_access_token().await?;
        let url = format!("{}/{}/messages:send", FCM_API_URL, self.config.project_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&access_token)
            .header("Content-Type", "application/json")
            .json(&FcmRequest { message })
            .send()
            .await
            .map_err(|e| ProviderError::Connection(format!("Failed to connect to FCM: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            record_provider_call("fcm", "failure");
            return Err(ProviderError::SendFailed(format!(
                "FCM API returned error status {}: {}",
                status, body
            )));
        }

        let fcm_response: FcmResponse = response.json().await.map_err(|e| {
            ProviderError::SendFailed(format!("Failed to parse FCM response: {}", e))
        })?;

        record_provider_call("fcm", "success");
        Ok(ProviderResponse::success(fcm_response.name))
    }
}

#[async_trait]
impl PushProvider for FcmProvider {
    async fn send(&self, message: &Message) -> Result<ProviderResponse, ProviderError> {
        let response = self.post_message(message).await?;
        tracing::info!(
            target_token = message.token.as_deref().unwrap_or(""),
            target_topic = message.topic.as_deref().unwrap_or(""),
            provider_id = response.provider_id.as_deref().unwrap_or(""),
            "Push notification sent via FCM"
        );
        Ok(response)
    }

    async fn send_each(&self, messages: &[Message]) -> Result<BatchOutcome, ProviderError> {
        let mut outcome = BatchOutcome::default();

        for message in messages {
            match self.post_message(message).await {
                Ok(_) => outcome.success_count += 1,
                // A rejected message counts against the chunk; only transport
                // or auth failures abort the whole call.
                Err(ProviderError::SendFailed(reason)) => {
                    tracing::warn!(reason = %reason, "FCM rejected message in batch");
                    outcome.failure_count += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(outcome)
    }

    async fn subscribe_to_topic(
        &self,
        device_token: &str,
        topic: &str,
    ) -> Result<(), ProviderError> {
        let access_token = self.get_access_token().await?;

        let body = serde_json::json!({
            "to": format!("/topics/{}", topic),
            "registration_tokens": [device_token],
        });

        let response = self
            .client
            .post(IID_BATCH_ADD_URL)
            .bearer_auth(&access_token)
            .header("access_token_auth", "true")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(format!("Failed to connect to IID: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            record_provider_call("iid", "failure");
            return Err(ProviderError::SendFailed(format!(
                "Topic subscription returned error status {}: {}",
                status, body
            )));
        }

        record_provider_call("iid", "success");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.config.project_id.is_empty() {
            return Err(ProviderError::Configuration(
                "FCM project_id is not configured".to_string(),
            ));
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// Mock push provider for tests and disabled environments.
pub struct MockPushProvider {
    enabled: bool,
    batch_failure_after: Option<u64>,
    send_count: std::sync::atomic::AtomicU64,
    batch_calls: std::sync::atomic::AtomicU64,
    batch_message_count: std::sync::atomic::AtomicU64,
    subscribe_count: std::sync::atomic::AtomicU64,
}

impl MockPushProvider {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            batch_failure_after: None,
            send_count: std::sync::atomic::AtomicU64::new(0),
            batch_calls: std::sync::atomic::AtomicU64::new(0),
            batch_message_count: std::sync::atomic::AtomicU64::new(0),
            subscribe_count: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Let the first `n` multi-send calls succeed, then fail every further
    /// one with a connection error. Failed calls are not counted.
    pub fn with_batch_failure_after(mut self, n: u64) -> Self {
        self.batch_failure_after = Some(n);
        self
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> u64 {
        self.batch_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn batch_message_count(&self) -> u64 {
        self.batch_message_count
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> u64 {
        self.subscribe_count
            .load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl PushProvider for MockPushProvider {
    async fn send(&self, message: &Message) -> Result<ProviderResponse, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::NotEnabled(
                "Mock push provider is not enabled".to_string(),
            ));
        }

        let n = self
            .send_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;

        tracing::info!(
            target_token = message.token.as_deref().unwrap_or(""),
            target_topic = message.topic.as_deref().unwrap_or(""),
            "[MOCK] Push notification would be sent"
        );

        Ok(ProviderResponse::success(Some(format!("mock-push-{}", n))))
    }

    async fn send_each(&self, messages: &[Message]) -> Result<BatchOutcome, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::NotEnabled(
                "Mock push provider is not enabled".to_string(),
            ));
        }

        if let Some(limit) = self.batch_failure_after {
            if self.batch_calls.load(std::sync::atomic::Ordering::SeqCst) >= limit {
                return Err(ProviderError::Connection(
                    "Mock transport failure".to_string(),
                ));
            }
        }

        self.batch_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.batch_message_count
            .fetch_add(messages.len() as u64, std::sync::atomic::Ordering::SeqCst);

        Ok(BatchOutcome {
            success_count: messages.len(),
            failure_count: 0,
        })
    }

    async fn subscribe_to_topic(
        &self,
        device_token: &str,
        topic: &str,
    ) -> Result<(), ProviderError> {
        if !self.enabled {
            return Err(ProviderError::NotEnabled(
                "Mock push provider is not enabled".to_string(),
            ));
        }

        self.subscribe_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        tracing::info!(
            device_token = %device_token,
            topic = %topic,
            "[MOCK] Device would be subscribed to topic"
        );

        Ok(())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_counts_individual_sends() {
        let provider = MockPushProvider::new(true);
        let message = Message {
            token: Some("T1".to_string()),
            ..Default::default()
        };

        let response = provider.send(&message).await.unwrap();
        assert!(response.success);
        assert_eq!(provider.send_count(), 1);
    }

    #[tokio::test]
    async fn mock_batch_reports_full_success() {
        let provider = MockPushProvider::new(true);
        let messages: Vec<Message> = (0..3)
            .map(|i| Message {
                token: Some(format!("T{}", i)),
                ..Default::default()
            })
            .collect();

        let outcome = provider.send_each(&messages).await.unwrap();
        assert_eq!(outcome.success_count, 3);
        assert_eq!(outcome.failure_count, 0);
        assert_eq!(provider.batch_calls(), 1);
        assert_eq!(provider.batch_message_count(), 3);
    }

    #[tokio::test]
    async fn mock_batch_fails_with_connection_error_after_limit() {
        let provider = MockPushProvider::new(true).with_batch_failure_after(1);
        let messages = vec![Message {
            token: Some("T1".to_string()),
            ..Default::default()
        }];

        assert!(provider.send_each(&messages).await.is_ok());
        assert!(matches!(
            provider.send_each(&messages).await,
            Err(ProviderError::Connection(_))
        ));
        assert_eq!(provider.batch_calls(), 1);
    }

    #[tokio::test]
    async fn disabled_mock_rejects_sends() {
        let provider = MockPushProvider::new(false);
        let message = Message::default();
        assert!(matches!(
            provider.send(&message).await,
            Err(ProviderError::NotEnabled(_))
        ));
    }

    #[test]
    fn fcm_provider_requires_project_id() {
        let config = FcmConfig {
            project_id: "".to_string(),
            service_account_key: "{}".to_string(),
            enabled: true,
        };
        assert!(matches!(
            FcmProvider::new(config),
            Err(ProviderError::Configuration(_))
        ));
    }
}
