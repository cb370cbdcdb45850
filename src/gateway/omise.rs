use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::{
    CardDetails, Charge, CreateChargeParams, CreateSourceParams, GatewayError, GatewayEvent,
    GatewayResult, PaymentGateway, Refund, RequestOptions, Source, Token,
};

pub const DEFAULT_API_URL: &str = "https://api.omise.co";
pub const DEFAULT_VAULT_URL: &str = "https://vault.omise.co";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Clone)]
pub struct OmiseSettings {
    pub secret_key: String,
    pub public_key: String,
    pub api_url: String,
    pub vault_url: String,
    pub timeout: Duration,
    pub breaker_failures: u32,
    pub breaker_reset: Duration,
}

impl OmiseSettings {
    pub fn new(secret_key: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            public_key: public_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            vault_url: DEFAULT_VAULT_URL.to_string(),
            timeout: Duration::from_secs(30),
            breaker_failures: 5,
            breaker_reset: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OmiseErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the Omise REST API.
///
/// Each operation issues exactly one request. A consecutive-failures circuit
/// breaker short-circuits calls while the gateway is unhealthy.
#[derive(Clone)]
pub struct OmiseClient {
    client: Client,
    secret_key: String,
    public_key: String,
    api_url: Url,
    vault_url: Url,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl OmiseClient {
    pub fn new(settings: OmiseSettings) -> GatewayResult<Self> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        let api_url = parse_base(&settings.api_url)?;
        let vault_url = parse_base(&settings.vault_url)?;

        let backoff = backoff::equal_jittered(settings.breaker_reset, settings.breaker_reset * 2);
        let policy = failure_policy::consecutive_failures(settings.breaker_failures, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Ok(OmiseClient {
            client,
            secret_key: settings.secret_key,
            public_key: settings.public_key,
            api_url,
            vault_url,
            circuit_breaker,
        })
    }

    /// Appends `segments` to the API base. Each segment is percent-encoded on
    /// its own, so an id can never add path levels or a query string.
    fn api(&self, segments: &[&str]) -> GatewayResult<Url> {
        endpoint(&self.api_url, segments)
    }

    fn with_options(request: RequestBuilder, opts: &RequestOptions) -> RequestBuilder {
        match &opts.idempotency_key {
            Some(key) => request.header(IDEMPOTENCY_HEADER, key),
            None => request,
        }
    }

    async fn send_json(&self, operation: &'static str, request: RequestBuilder) -> GatewayResult<Value> {
        let result = self
            .circuit_breaker
            .call_with(
                |e: &GatewayError| e.is_transient(),
                async move {
                    let response = request.send().await?;
                    let status = response.status();
                    let body = response.bytes().await?;

                    if !status.is_success() {
                        let parsed = serde_json::from_slice::<OmiseErrorBody>(&body).ok();
                        return Err(GatewayError::Api {
                            status: status.as_u16(),
                            code: parsed
                                .as_ref()
                                .and_then(|b| b.code.clone())
                                .unwrap_or_else(|| "unknown".to_string()),
                            message: parsed
                                .and_then(|b| b.message)
                                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned()),
                        });
                    }

                    serde_json::from_slice::<Value>(&body)
                        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
                },
            )
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => {
                tracing::warn!(operation, "Gateway circuit breaker open, rejecting call");
                Err(GatewayError::CircuitOpen(format!(
                    "gateway unavailable during {}",
                    operation
                )))
            }
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> GatewayResult<T> {
        let value = self.send_json(operation, request).await?;
        serde_json::from_value(value)
            .map_err(|e| GatewayError::InvalidResponse(format!("{}: {}", operation, e)))
    }
}

fn parse_base(raw: &str) -> GatewayResult<Url> {
    let url = Url::parse(raw).map_err(|e| GatewayError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(GatewayError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

fn endpoint(base: &Url, segments: &[&str]) -> GatewayResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| GatewayError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl PaymentGateway for OmiseClient {
    #[tracing::instrument(skip_all, fields(amount = params.amount, currency = %params.currency))]
    async fn create_charge(
        &self,
        params: &CreateChargeParams,
        opts: &RequestOptions,
    ) -> GatewayResult<Charge> {
        let request = self
            .client
            .post(self.api(&["charges"])?)
            .basic_auth(&self.secret_key, None::<&str>)
            .json(params);
        let value = self
            .send_json("create_charge", Self::with_options(request, opts))
            .await?;
        Charge::from_json(value)
    }

    #[tracing::instrument(skip_all, fields(source_type = %params.source_type))]
    async fn create_source(
        &self,
        params: &CreateSourceParams,
        opts: &RequestOptions,
    ) -> GatewayResult<Source> {
        let request = self
            .client
            .post(self.api(&["sources"])?)
            .basic_auth(&self.secret_key, None::<&str>)
            .json(params);
        self.send("create_source", Self::with_options(request, opts))
            .await
    }

    #[tracing::instrument(skip_all)]
    async fn create_token(&self, card: &CardDetails, opts: &RequestOptions) -> GatewayResult<Token> {
        let request = self
            .client
            .post(endpoint(&self.vault_url, &["tokens"])?)
            .basic_auth(&self.public_key, None::<&str>)
            .json(&serde_json::json!({ "card": card }));
        self.send("create_token", Self::with_options(request, opts))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn retrieve_charge(&self, charge_id: &str) -> GatewayResult<Charge> {
        let request = self
            .client
            .get(self.api(&["charges", charge_id])?)
            .basic_auth(&self.secret_key, None::<&str>);
        let value = self.send_json("retrieve_charge", request).await?;
        Charge::from_json(value)
    }

    #[tracing::instrument(skip(self))]
    async fn retrieve_event(&self, event_id: &str) -> GatewayResult<GatewayEvent> {
        let request = self
            .client
            .get(self.api(&["events", event_id])?)
            .basic_auth(&self.secret_key, None::<&str>);
        self.send("retrieve_event", request).await
    }

    #[tracing::instrument(skip(self, opts))]
    async fn create_refund(
        &self,
        charge_id: &str,
        amount: i64,
        opts: &RequestOptions,
    ) -> GatewayResult<Refund> {
        let request = self
            .client
            .post(self.api(&["charges", charge_id, "refunds"])?)
            .basic_auth(&self.secret_key, None::<&str>)
            .json(&serde_json::json!({ "amount": amount }));
        self.send("create_refund", Self::with_options(request, opts))
            .await
    }

    /// Returns the current state of the circuit breaker
    fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }
}
