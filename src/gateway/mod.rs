//! Typed boundary to the external payment gateway.

pub mod omise;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ChargeMetadata, ChargeStatus, Channel};

pub use omise::OmiseClient;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Gateway rejected request ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::Api { status: 404, .. })
    }

    /// Failures that say something about gateway health rather than about
    /// the request itself.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Request(_) | GatewayError::InvalidResponse(_) => true,
            GatewayError::Api { status, .. } => *status >= 500,
            GatewayError::CircuitOpen(_) | GatewayError::InvalidUrl(_) => false,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Per-call options. Never stored on the client, so an idempotency key only
/// ever applies to the request it was passed with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub idempotency_key: Option<String>,
}

impl RequestOptions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_idempotency_key(key: impl Into<String>) -> Self {
        Self {
            idempotency_key: Some(key.into()),
        }
    }
}

/// What a charge is drawn against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeTarget {
    Card(String),
    Source(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateChargeParams {
    pub amount: i64,
    pub currency: String,
    #[serde(flatten)]
    pub target: ChargeTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub metadata: ChargeMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateSourceParams {
    #[serde(rename = "type")]
    pub source_type: String,
    pub amount: i64,
    pub currency: String,
}

/// Raw card fields, only used on the server-side tokenisation path.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct CardDetails {
    pub name: String,
    pub number: String,
    pub expiration_month: u32,
    pub expiration_year: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_code: Option<String>,
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let last4 = self
            .number
            .get(self.number.len().saturating_sub(4)..)
            .unwrap_or_default();
        f.debug_struct("CardDetails")
            .field("name", &self.name)
            .field("number", &format_args!("****{}", last4))
            .field("expiration_month", &self.expiration_month)
            .field("expiration_year", &self.expiration_year)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeSource {
    pub id: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scannable_code: Option<Value>,
}

/// Charge as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub status: ChargeStatus,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub source: Option<ChargeSource>,
    #[serde(default)]
    pub failure_code: Option<String>,
    #[serde(default)]
    pub failure_message: Option<String>,
    #[serde(default)]
    pub refunded_amount: i64,
    #[serde(default)]
    pub authorize_uri: Option<String>,
    #[serde(default, deserialize_with = "metadata_or_default")]
    pub metadata: ChargeMetadata,
    /// Full response snapshot, stored for audit only.
    #[serde(skip)]
    pub raw: Value,
}

impl Charge {
    pub fn from_json(value: Value) -> GatewayResult<Self> {
        let mut charge: Charge = serde_json::from_value(value.clone())
            .map_err(|e| GatewayError::InvalidResponse(format!("charge: {}", e)))?;
        charge.raw = value;
        Ok(charge)
    }

    pub fn channel(&self) -> Channel {
        self.source
            .as_ref()
            .map(|source| Channel::from_source_type(&source.source_type))
            .unwrap_or_default()
    }

    pub fn refundable_amount(&self) -> i64 {
        (self.amount - self.refunded_amount).max(0)
    }
}

fn metadata_or_default<'de, D>(deserializer: D) -> Result<ChargeMetadata, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<ChargeMetadata>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
}

/// Gateway event; `data` is the embedded object the event is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl GatewayEvent {
    pub fn embedded_charge_id(&self) -> Option<&str> {
        if self.data.get("object").and_then(Value::as_str) != Some("charge") {
            return None;
        }
        self.data.get("id").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub charge: Option<String>,
    #[serde(default)]
    pub voided: bool,
}

/// The six gateway operations the payment engine relies on.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(
        &self,
        params: &CreateChargeParams,
        opts: &RequestOptions,
    ) -> GatewayResult<Charge>;

    async fn create_source(
        &self,
        params: &CreateSourceParams,
        opts: &RequestOptions,
    ) -> GatewayResult<Source>;

    async fn create_token(&self, card: &CardDetails, opts: &RequestOptions)
        -> GatewayResult<Token>;

    async fn retrieve_charge(&self, charge_id: &str) -> GatewayResult<Charge>;

    async fn retrieve_event(&self, event_id: &str) -> GatewayResult<GatewayEvent>;

    async fn create_refund(
        &self,
        charge_id: &str,
        amount: i64,
        opts: &RequestOptions,
    ) -> GatewayResult<Refund>;

    /// Circuit breaker state reported on the health endpoint.
    fn circuit_state(&self) -> String {
        "closed".to_string()
    }
}
