//! Application startup and lifecycle management.

use crate::config::RelayConfig;
use crate::handlers::{
    device_token_written, health_check, metrics_endpoint, preflight, promotion_created,
    readiness_check, send_notification,
};
use crate::services::{
    FcmProvider, GoogleIdentityVerifier, IdentityVerifier, MockIdentityVerifier, MockPushProvider,
    PushProvider,
};
use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub push_provider: Arc<dyn PushProvider>,
}

/// Permissive CORS headers on every response, matching what browser clients
/// of the relay endpoint expect.
async fn cors_headers_middleware(req: Request, next: Next) -> impl IntoResponse {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );

    response
}

/// Assemble the service router. Public so router-level tests can drive it
/// with injected mock providers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/notifications/send",
            post(send_notification).options(preflight),
        )
        .route("/hooks/device-token", post(device_token_written))
        .route("/hooks/promotion", post(promotion_created))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .layer(axum::middleware::from_fn(cors_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: RelayConfig) -> Result<Self, AppError> {
        let push_provider: Arc<dyn PushProvider> = if config.fcm.enabled {
            match FcmProvider::new(config.fcm.clone()) {
                Ok(provider) => {
                    tracing::info!("FCM push provider initialized");
                    Arc::new(provider)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize FCM provider: {}. Using mock.", e);
                    Arc::new(MockPushProvider::new(true))
                }
            }
        } else {
            tracing::info!("FCM provider disabled, using mock push provider");
            Arc::new(MockPushProvider::new(true))
        };

        let verifier: Arc<dyn IdentityVerifier> = if config.identity.enabled {
            tracing::info!("Google identity verifier initialized");
            Arc::new(GoogleIdentityVerifier::new(config.identity.clone()))
        } else {
            tracing::info!("Identity verification disabled, using mock verifier");
            Arc::new(MockIdentityVerifier::new(true))
        };

        let state = AppState {
            config: config.clone(),
            verifier,
            push_provider,
        };

        // Bind listener (port 0 = random port for testing)
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Push relay service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        axum::serve(self.listener, router).await
    }
}
