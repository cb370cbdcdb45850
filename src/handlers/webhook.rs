use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::WebhookOutcome;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// `processed` or `ignored`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<WebhookOutcome> for WebhookAck {
    fn from(outcome: WebhookOutcome) -> Self {
        match outcome {
            WebhookOutcome::Processed(transaction) => WebhookAck {
                status: "processed".to_string(),
                transaction_id: Some(transaction.id),
                charge_status: Some(transaction.status.to_string()),
                reason: None,
            },
            WebhookOutcome::Ignored { reason } => WebhookAck {
                status: "ignored".to_string(),
                transaction_id: None,
                charge_status: None,
                reason: Some(reason),
            },
        }
    }
}

/// Gateway notification endpoint. Any 5xx tells the gateway to deliver again
/// later; 2xx and 4xx end the delivery.
#[utoipa::path(
    post,
    path = "/webhooks/omise",
    request_body(content = String, description = "Gateway notification; only `object` and `id` are read", content_type = "application/json"),
    responses(
        (status = 200, description = "Notification verified and processed, or acknowledged and ignored", body = WebhookAck),
        (status = 400, description = "Body is not JSON or carries no id"),
        (status = 500, description = "Verification or reconciliation failed; the gateway should retry")
    ),
    tag = "Webhooks"
)]
pub async fn omise_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let outcome = state.payments.handle_webhook(&body).await?;
    Ok(Json(outcome.into()))
}
