//! Data-change hooks invoked by the hosting platform.
//!
//! Both hooks are fire-and-forget: they always answer `204` and never
//! propagate a provider failure back to the data layer.

use axum::{extract::State, http::StatusCode, Json};

use crate::models::{DeviceTokenWrite, Message, Promotion, PromotionCreated};
use crate::startup::AppState;

/// Write to a per-user device-token record: subscribe the new token to the
/// broadcast topic. Deleted or empty tokens are a no-op.
#[tracing::instrument(skip(state, event), fields(user_id = %event.user_id))]
pub async fn device_token_written(
    State(state): State<AppState>,
    Json(event): Json<DeviceTokenWrite>,
) -> StatusCode {
    let token = match event.after.as_deref() {
        Some(token) if !token.is_empty() => token,
        _ => {
            tracing::info!("Device token removed or empty, skipping subscription");
            return StatusCode::NO_CONTENT;
        }
    };

    match state
        .push_provider
        .subscribe_to_topic(token, &state.config.broadcast_topic)
        .await
    {
        Ok(()) => {
            tracing::info!(topic = %state.config.broadcast_topic, "Subscribed device to broadcast topic");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to subscribe device to broadcast topic");
        }
    }

    StatusCode::NO_CONTENT
}

/// Creation of a promotion record: notify the broadcast topic if the record
/// is marked active.
#[tracing::instrument(skip(state, event), fields(promotion_id = %event.promotion_id))]
pub async fn promotion_created(
    State(state): State<AppState>,
    Json(event): Json<PromotionCreated>,
) -> StatusCode {
    let promotion = match &event.promotion {
        Some(promotion) if promotion.active => promotion,
        _ => {
            tracing::debug!("Promotion absent or inactive, skipping notification");
            return StatusCode::NO_CONTENT;
        }
    };

    let message = build_promotion_message(
        &state.config.broadcast_topic,
        &event.promotion_id,
        promotion,
    );

    match state.push_provider.send(&message).await {
        Ok(response) => {
            tracing::info!(
                provider_id = response.provider_id.as_deref().unwrap_or(""),
                "Promotion notification sent"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to send promotion notification");
        }
    }

    StatusCode::NO_CONTENT
}

fn build_promotion_message(topic: &str, promotion_id: &str, promotion: &Promotion) -> Message {
    let mut notification = serde_json::json!({
        "title": "New Promotion Available!",
        "body": promotion
            .title
            .clone()
            .unwrap_or_else(|| "Check out our latest offer in the app".to_string()),
    });
    let mut android_notification = serde_json::json!({
        "icon": "ic_launcher_foreground",
        "color": "#6200EE",
        "click_action": "OPEN_PROMOTION",
    });

    if let Some(image) = &promotion.image_url {
        notification["image"] = serde_json::json!(image);
        android_notification["image"] = serde_json::json!(image);
    }

    Message {
        token: None,
        topic: Some(topic.to_string()),
        notification: Some(notification),
        data: Some(serde_json::json!({
            "type": "promotion",
            "promotionId": promotion_id,
        })),
        android: Some(serde_json::json!({ "notification": android_notification })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_message_targets_topic_with_defaults() {
        let promotion = Promotion {
            active: true,
            title: None,
            image_url: None,
        };
        let message = build_promotion_message("all", "p1", &promotion);

        assert_eq!(message.topic.as_deref(), Some("all"));
        assert!(message.token.is_none());

        let notification = message.notification.unwrap();
        assert_eq!(notification["title"], "New Promotion Available!");
        assert_eq!(notification["body"], "Check out our latest offer in the app");
        assert!(notification.get("image").is_none());

        let data = message.data.unwrap();
        assert_eq!(data["promotionId"], "p1");
    }

    #[test]
    fn promotion_title_becomes_body() {
        let promotion = Promotion {
            active: true,
            title: Some("Summer Sale".to_string()),
            image_url: None,
        };
        let message = build_promotion_message("all", "p2", &promotion);
        assert_eq!(message.notification.unwrap()["body"], "Summer Sale");
    }

    #[test]
    fn image_is_copied_into_both_notification_blocks() {
        let promotion = Promotion {
            active: true,
            title: Some("Sale".to_string()),
            image_url: Some("https://cdn.example.com/sale.png".to_string()),
        };
        let message = build_promotion_message("all", "p3", &promotion);

        assert_eq!(
            message.notification.unwrap()["image"],
            "https://cdn.example.com/sale.png"
        );
        assert_eq!(
            message.android.unwrap()["notification"]["image"],
            "https://cdn.example.com/sale.png"
        );
    }
}
