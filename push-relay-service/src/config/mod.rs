use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub fcm: FcmConfig,
    pub identity: IdentityConfig,
    pub broadcast_topic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmConfig {
    pub project_id: String,
    /// Service account key JSON. When empty or `enabled` is false, the mock
    /// provider is used instead.
    pub service_account_key: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Project id used as the expected audience of incoming ID tokens.
    pub project_id: String,
    /// Override for the securetoken JWKS endpoint (tests point this at a
    /// local stub).
    pub jwks_url: Option<String>,
    pub enabled: bool,
}

impl RelayConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(RelayConfig {
            common: common_config,
            fcm: FcmConfig {
                project_id: get_env("FCM_PROJECT_ID", Some(""), is_prod)?,
                service_account_key: get_env("FCM_SERVICE_ACCOUNT_KEY", Some(""), is_prod)?,
                enabled: env::var("FCM_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
            },
            identity: IdentityConfig {
                project_id: get_env("IDENTITY_PROJECT_ID", Some(""), is_prod)?,
                jwks_url: env::var("IDENTITY_JWKS_URL").ok(),
                enabled: env::var("IDENTITY_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
            },
            broadcast_topic: get_env("BROADCAST_TOPIC", Some("all"), is_prod)?,
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
