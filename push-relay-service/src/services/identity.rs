//! Bearer credential verification against the external identity service.

use crate::config::IdentityConfig;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

const SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const KEY_CACHE_TTL_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Credential rejected: {0}")]
    Rejected(String),

    #[error("Identity service unreachable: {0}")]
    Connection(String),
}

/// Claims decoded from a verified ID token. Unused beyond authentication in
/// this design; no role-based authorization is enforced.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<IdentityClaims, VerifyError>;
}

/// Verifies Firebase ID tokens using Google's securetoken signing keys.
pub struct GoogleIdentityVerifier {
    config: IdentityConfig,
    client: reqwest::Client,
    key_cache: Mutex<Option<KeySet>>,
}

struct KeySet {
    keys: HashMap<String, DecodingKey>,
    expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

impl GoogleIdentityVerifier {
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            key_cache: Mutex::new(None),
        }
    }

    fn cached_key(&self, kid: &str) -> Option<DecodingKey> {
        let cache = self.key_cache.lock().ok()?;
        let set = cache.as_ref()?;
        if set.expires_at <= Utc::now().timestamp() {
            return None;
        }
        set.keys.get(kid).cloned()
    }

    async fn fetch_keys(&self) -> Result<(), VerifyError> {
        let url = self
            .config
            .jwks_url
            .as_deref()
            .unwrap_or(SECURETOKEN_JWKS_URL);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| VerifyError::Connection(format!("JWKS fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(VerifyError::Connection(format!(
                "JWKS fetch returned status {}",
                response.status()
            )));
        }

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| VerifyError::Connection(format!("Invalid JWKS payload: {}", e)))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys.insert(jwk.kid, key);
                }
                Err(e) => {
                    tracing::warn!(kid = %jwk.kid, error = %e, "Skipping unparseable JWK");
                }
            }
        }

        let mut cache = self
            .key_cache
            .lock()
            .map_err(|_| VerifyError::Connection("Key cache poisoned".to_string()))?;
        *cache = Some(KeySet {
            keys,
            expires_at: Utc::now().timestamp() + KEY_CACHE_TTL_SECS,
        });

        Ok(())
    }
}

#[async_trait]
impl IdentityVerifier for GoogleIdentityVerifier {
    async fn verify(&self, id_token: &str) -> Result<IdentityClaims, VerifyError> {
        let header = decode_header(id_token)
            .map_err(|e| VerifyError::Rejected(format!("Malformed token header: {}", e)))?;
        let kid = header
            .kid
            .ok_or_else(|| VerifyError::Rejected("Token header missing kid".to_string()))?;

        let key = match self.cached_key(&kid) {
            Some(key) => key,
            None => {
                self.fetch_keys().await?;
                self.cached_key(&kid).ok_or_else(|| {
                    VerifyError::Rejected(format!("No signing key for kid {}", kid))
                })?
            }
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.config.project_id.as_str()]);
        validation.set_issuer(&[format!(
            "https://securetoken.google.com/{}",
            self.config.project_id
        )]);

        let data = decode::<IdentityClaims>(id_token, &key, &validation)
            .map_err(|e| VerifyError::Rejected(e.to_string()))?;

        Ok(data.claims)
    }
}

/// Mock verifier for tests and disabled environments.
pub struct MockIdentityVerifier {
    allow: bool,
    reachable: bool,
}

impl MockIdentityVerifier {
    pub fn new(allow: bool) -> Self {
        Self {
            allow,
            reachable: true,
        }
    }

    /// A verifier whose identity service cannot be reached: every call fails
    /// with `VerifyError::Connection`.
    pub fn unreachable() -> Self {
        Self {
            allow: false,
            reachable: false,
        }
    }
}

#[async_trait]
impl IdentityVerifier for MockIdentityVerifier {
    async fn verify(&self, id_token: &str) -> Result<IdentityClaims, VerifyError> {
        if !self.reachable {
            return Err(VerifyError::Connection(
                "Identity service unreachable".to_string(),
            ));
        }

        if !self.allow || id_token.is_empty() {
            return Err(VerifyError::Rejected(
                "Invalid or expired token".to_string(),
            ));
        }

        let now = Utc::now().timestamp();
        Ok(IdentityClaims {
            sub: "mock-user".to_string(),
            email: Some("mock-user@example.com".to_string()),
            exp: now + 3600,
            iat: now,
        })
    }
}
