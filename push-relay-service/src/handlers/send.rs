use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};

use crate::models::{SendRequest, SendResponse};
use crate::services::metrics::record_dispatch;
use crate::services::{dispatch, validate, VerifyError};
use crate::startup::AppState;
use service_core::error::AppError;

/// Relay endpoint: authenticate the caller, validate the request, fan out to
/// the push provider.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn send_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SendResponse>), AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Forbidden(anyhow::anyhow!(
                "Unauthorized: No valid authentication token provided"
            ))
        })?;

    let claims = state.verifier.verify(token).await.map_err(|e| match e {
        VerifyError::Rejected(msg) => AppError::Unauthorized(anyhow::anyhow!(msg)),
        VerifyError::Connection(msg) => AppError::BadGateway(msg),
    })?;

    // Any verified caller may send; role-based authorization is a known gap.
    tracing::debug!(caller = %claims.sub, "Caller authenticated");

    let Json(request) =
        payload.map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid request body")))?;
    validate(&request)?;

    let target = match request.message.as_ref().and_then(|m| m.token_target()) {
        Some(_) => "token",
        None => "topic",
    };

    let results = match dispatch(state.push_provider.as_ref(), &request).await {
        Ok(results) => results,
        Err(e) => {
            record_dispatch(target, "failure");
            return Err(e);
        }
    };

    record_dispatch(target, "success");
    tracing::info!(result_count = results.len(), target, "Notifications sent");

    Ok((
        StatusCode::OK,
        Json(SendResponse {
            success: true,
            results,
        }),
    ))
}

/// CORS preflight for the relay endpoint.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}
