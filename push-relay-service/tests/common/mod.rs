use push_relay_service::config::{FcmConfig, IdentityConfig, RelayConfig};
use push_relay_service::startup::Application;
use service_core::config::Config as CoreConfig;
use std::time::Duration;

pub struct TestApp {
    pub address: String,
    pub port: u16,
}

pub fn test_config() -> RelayConfig {
    RelayConfig {
        common: CoreConfig { port: 0 },
        fcm: FcmConfig {
            project_id: "test-project".to_string(),
            service_account_key: "".to_string(),
            enabled: false, // Use mock
        },
        identity: IdentityConfig {
            project_id: "test-project".to_string(),
            jwks_url: None,
            enabled: false, // Use mock
        },
        broadcast_topic: "all".to_string(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        // Use random port for testing (port 0)
        let app = Application::build(test_config())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp { address, port }
    }
}
