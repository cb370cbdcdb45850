//! Inbound gateway notifications.
//!
//! The notification body is never trusted beyond its `object` and `id`: the
//! referenced event or charge is always re-fetched from the gateway with the
//! secret key, so a forged body can at worst trigger a reconciliation of a
//! charge that really exists.

use std::sync::Arc;

use serde::Deserialize;

use crate::domain::{is_gateway_id, Transaction};
use crate::error::AppError;
use crate::gateway::{Charge, PaymentGateway};
use crate::services::ledger::TransactionLedger;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl WebhookEnvelope {
    /// Parses the raw body. Anything without a usable `id` is a bad request,
    /// and so is an id that is not shaped like a gateway object id.
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("invalid webhook body: {}", e)))?;
        match envelope.id.as_deref().map(str::trim) {
            Some(id) if is_gateway_id(id) => Ok(envelope),
            Some(id) if !id.is_empty() => Err(AppError::BadRequest(
                "webhook id is not a gateway object id".to_string(),
            )),
            _ => Err(AppError::BadRequest("webhook body has no id".to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    Processed(Transaction),
    Ignored { reason: String },
}

#[derive(Clone)]
pub struct WebhookVerifier {
    gateway: Arc<dyn PaymentGateway>,
    ledger: TransactionLedger,
}

impl WebhookVerifier {
    pub fn new(gateway: Arc<dyn PaymentGateway>, ledger: TransactionLedger) -> Self {
        Self { gateway, ledger }
    }

    pub async fn handle(&self, body: &[u8]) -> Result<WebhookOutcome, AppError> {
        let envelope = WebhookEnvelope::parse(body)?;
        let charge_id = match self.resolve_charge_id(&envelope).await? {
            Ok(charge_id) => charge_id,
            Err(reason) => {
                tracing::info!(id = ?envelope.id, object = ?envelope.object, %reason, "Webhook ignored");
                return Ok(WebhookOutcome::Ignored { reason });
            }
        };

        let charge = self.verified_charge(&charge_id).await?;
        let reconciliation = self.ledger.reconcile(&charge, None).await.map_err(|e| {
            tracing::error!(charge_id = %charge.id, operation = "reconcile", error = %e, "Webhook reconciliation failed");
            AppError::reconciliation(charge.id.clone(), e)
        })?;

        Ok(WebhookOutcome::Processed(reconciliation.transaction))
    }

    /// Works out which charge a notification is about. The inner `Err` is a
    /// reason to acknowledge without doing anything.
    async fn resolve_charge_id(
        &self,
        envelope: &WebhookEnvelope,
    ) -> Result<Result<String, String>, AppError> {
        let id = envelope.id.as_deref().unwrap_or_default().trim();
        match envelope.object.as_deref() {
            Some("event") => {
                let event = self.gateway.retrieve_event(id).await.map_err(|e| {
                    tracing::error!(event_id = id, operation = "retrieve_event", error = %e, "Event verification failed");
                    AppError::Gateway(e)
                })?;
                match event.embedded_charge_id() {
                    Some(charge_id) if is_gateway_id(charge_id) => Ok(Ok(charge_id.to_string())),
                    None => Ok(Err(format!(
                        "event {} ({}) is not about a charge",
                        event.id,
                        event.key.as_deref().unwrap_or("unknown")
                    ))),
                }
            }
            Some("charge") => Ok(Ok(id.to_string())),
            Some(other) => Ok(Err(format!("unsupported object type '{}'", other))),
            None => Ok(Err("notification has no object type".to_string())),
        }
    }

    async fn verified_charge(&self, charge_id: &str) -> Result<Charge, AppError> {
        self.gateway.retrieve_charge(charge_id).await.map_err(|e| {
            tracing::error!(charge_id, operation = "retrieve_charge", error = %e, "Charge verification failed");
            AppError::Gateway(e)
        })
    }
}
