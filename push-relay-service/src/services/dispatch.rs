//! Request validation and batched fan-out to the push provider.

use crate::models::{BatchSummary, DispatchEntry, SendRequest};
use crate::services::providers::{ProviderError, PushProvider};
use service_core::error::AppError;

/// FCM rejects multi-send calls above this size, so chunking must be exact.
pub const MAX_BATCH_SIZE: usize = 500;

/// Check the inbound request shape.
///
/// The payload contents (`notification` fields, `data`, `android`) are not
/// inspected further; the push service is the final validator.
pub fn validate(request: &SendRequest) -> Result<(), AppError> {
    let message = request
        .message
        .as_ref()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid request body")))?;

    if message.notification.is_none() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Invalid request body")));
    }

    if message.token_target().is_none() && message.topic_target().is_none() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid message: must include either token or topic"
        )));
    }

    Ok(())
}

/// Forward a validated request to the provider.
///
/// Token targets: the base message is sent first, then any additional tokens
/// are fanned out in chunks of at most [`MAX_BATCH_SIZE`], one provider call
/// and one result entry per chunk, in input order. Topic targets are a single
/// send. A transport failure aborts the remaining chunks and propagates.
pub async fn dispatch(
    provider: &dyn PushProvider,
    request: &SendRequest,
) -> Result<Vec<DispatchEntry>, AppError> {
    let message = request
        .message
        .as_ref()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid request body")))?;

    let mut results = Vec::new();

    if message.token_target().is_some() {
        let response = provider.send(message).await.map_err(provider_error)?;
        results.push(DispatchEntry::MessageId(message_id(response.provider_id)));

        let additional = request
            .additional_tokens
            .as_deref()
            .unwrap_or_default();
        if !additional.is_empty() {
            let derived: Vec<_> = additional
                .iter()
                .map(|token| message.with_token(token))
                .collect();

            for chunk in derived.chunks(MAX_BATCH_SIZE) {
                let outcome = provider.send_each(chunk).await.map_err(provider_error)?;
                results.push(DispatchEntry::Batch(BatchSummary {
                    batch_size: chunk.len(),
                    success_count: outcome.success_count,
                    failure_count: outcome.failure_count,
                }));
            }
        }
    } else if message.topic_target().is_some() {
        let response = provider.send(message).await.map_err(provider_error)?;
        results.push(DispatchEntry::MessageId(message_id(response.provider_id)));
    } else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid message: must include either token or topic"
        )));
    }

    Ok(results)
}

fn message_id(provider_id: Option<String>) -> String {
    provider_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn provider_error(err: ProviderError) -> AppError {
    match err {
        ProviderError::Connection(msg) => AppError::BadGateway(msg),
        other => AppError::InternalError(anyhow::anyhow!(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;
    use crate::services::providers::MockPushProvider;

    fn token_request(token: &str, additional: Vec<String>) -> SendRequest {
        SendRequest {
            message: Some(Message {
                token: Some(token.to_string()),
                notification: Some(serde_json::json!({"title": "A", "body": "B"})),
                ..Default::default()
            }),
            additional_tokens: Some(additional),
        }
    }

    fn batch_sizes(results: &[DispatchEntry]) -> Vec<usize> {
        results
            .iter()
            .filter_map(|entry| match entry {
                DispatchEntry::Batch(summary) => Some(summary.batch_size),
                DispatchEntry::MessageId(_) => None,
            })
            .collect()
    }

    #[test]
    fn missing_message_is_invalid() {
        let err = validate(&SendRequest::default()).unwrap_err();
        match err {
            AppError::BadRequest(e) => assert_eq!(e.to_string(), "Invalid request body"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_notification_is_invalid() {
        let request = SendRequest {
            message: Some(Message {
                token: Some("T1".to_string()),
                ..Default::default()
            }),
            additional_tokens: None,
        };
        let err = validate(&request).unwrap_err();
        match err {
            AppError::BadRequest(e) => assert_eq!(e.to_string(), "Invalid request body"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_target_is_invalid() {
        let request = SendRequest {
            message: Some(Message {
                notification: Some(serde_json::json!({"title": "A"})),
                ..Default::default()
            }),
            additional_tokens: None,
        };
        let err = validate(&request).unwrap_err();
        match err {
            AppError::BadRequest(e) => assert_eq!(
                e.to_string(),
                "Invalid message: must include either token or topic"
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_token_string_alone_is_invalid() {
        let request = SendRequest {
            message: Some(Message {
                token: Some("".to_string()),
                notification: Some(serde_json::json!({"title": "A"})),
                ..Default::default()
            }),
            additional_tokens: None,
        };
        let err = validate(&request).unwrap_err();
        match err {
            AppError::BadRequest(e) => assert_eq!(
                e.to_string(),
                "Invalid message: must include either token or topic"
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_topic_string_alone_is_invalid() {
        let request = SendRequest {
            message: Some(Message {
                topic: Some("".to_string()),
                notification: Some(serde_json::json!({"title": "A"})),
                ..Default::default()
            }),
            additional_tokens: None,
        };
        assert!(validate(&request).is_err());
    }

    #[tokio::test]
    async fn empty_token_with_topic_dispatches_to_topic() {
        let provider = MockPushProvider::new(true);
        let request = SendRequest {
            message: Some(Message {
                token: Some("".to_string()),
                topic: Some("all".to_string()),
                notification: Some(serde_json::json!({"title": "A"})),
                ..Default::default()
            }),
            additional_tokens: Some(vec!["T2".to_string()]),
        };

        assert!(validate(&request).is_ok());
        let results = dispatch(&provider, &request).await.unwrap();

        // Topic path: single send, additional tokens not applicable.
        assert_eq!(results.len(), 1);
        assert_eq!(provider.send_count(), 1);
        assert_eq!(provider.batch_calls(), 0);
    }

    #[test]
    fn token_or_topic_is_valid() {
        assert!(validate(&token_request("T1", vec![])).is_ok());

        let topic = SendRequest {
            message: Some(Message {
                topic: Some("all".to_string()),
                notification: Some(serde_json::json!({"title": "A"})),
                ..Default::default()
            }),
            additional_tokens: None,
        };
        assert!(validate(&topic).is_ok());
    }

    #[tokio::test]
    async fn single_token_send_yields_one_entry() {
        let provider = MockPushProvider::new(true);
        let results = dispatch(&provider, &token_request("T1", vec![]))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], DispatchEntry::MessageId(_)));
        assert_eq!(provider.send_count(), 1);
        assert_eq!(provider.batch_calls(), 0);
    }

    #[tokio::test]
    async fn one_additional_token_yields_base_entry_plus_batch() {
        let provider = MockPushProvider::new(true);
        let results = dispatch(&provider, &token_request("T1", vec!["T2".to_string()]))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[1],
            DispatchEntry::Batch(BatchSummary {
                batch_size: 1,
                success_count: 1,
                failure_count: 0,
            })
        );
    }

    #[tokio::test]
    async fn exactly_500_tokens_is_one_full_batch() {
        let provider = MockPushProvider::new(true);
        let tokens: Vec<String> = (0..500).map(|i| format!("T{}", i)).collect();
        let results = dispatch(&provider, &token_request("T0", tokens))
            .await
            .unwrap();

        assert_eq!(batch_sizes(&results), vec![500]);
        assert_eq!(provider.batch_calls(), 1);
    }

    #[tokio::test]
    async fn batches_split_at_501_tokens() {
        let provider = MockPushProvider::new(true);
        let tokens: Vec<String> = (0..501).map(|i| format!("T{}", i)).collect();
        let results = dispatch(&provider, &token_request("T0", tokens))
            .await
            .unwrap();

        assert_eq!(batch_sizes(&results), vec![500, 1]);
    }

    #[tokio::test]
    async fn batch_count_and_sizes_cover_all_tokens() {
        let provider = MockPushProvider::new(true);
        let n: usize = 1203;
        let tokens: Vec<String> = (0..n).map(|i| format!("T{}", i)).collect();
        let results = dispatch(&provider, &token_request("T0", tokens))
            .await
            .unwrap();

        let sizes = batch_sizes(&results);
        assert_eq!(results.len(), 1 + n.div_ceil(MAX_BATCH_SIZE));
        assert_eq!(sizes, vec![500, 500, 203]);
        assert_eq!(sizes.iter().sum::<usize>(), n);
        assert_eq!(provider.batch_message_count(), n as u64);
    }

    #[tokio::test]
    async fn transport_failure_aborts_remaining_batches() {
        let provider = MockPushProvider::new(true).with_batch_failure_after(1);
        let tokens: Vec<String> = (0..1203).map(|i| format!("T{}", i)).collect();
        let err = dispatch(&provider, &token_request("T0", tokens))
            .await
            .unwrap_err();

        match err {
            AppError::BadGateway(_) => {}
            other => panic!("unexpected error: {other}"),
        }
        // Only the first chunk went out; the failed call stopped the rest.
        assert_eq!(provider.batch_calls(), 1);
        assert_eq!(provider.batch_message_count(), 500);
    }

    #[tokio::test]
    async fn empty_additional_tokens_sends_no_batches() {
        let provider = MockPushProvider::new(true);
        let results = dispatch(&provider, &token_request("T1", vec![]))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(provider.batch_calls(), 0);
    }

    #[tokio::test]
    async fn topic_send_ignores_additional_tokens() {
        let provider = MockPushProvider::new(true);
        let request = SendRequest {
            message: Some(Message {
                topic: Some("all".to_string()),
                notification: Some(serde_json::json!({"title": "A"})),
                ..Default::default()
            }),
            additional_tokens: Some(vec!["T2".to_string()]),
        };
        let results = dispatch(&provider, &request).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(provider.batch_calls(), 0);
    }
}
