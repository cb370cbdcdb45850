//! In-memory gateway used by the service unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use super::*;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateCharge(CreateChargeParams, RequestOptions),
    CreateSource(CreateSourceParams, RequestOptions),
    CreateToken(RequestOptions),
    RetrieveCharge(String),
    RetrieveEvent(String),
    CreateRefund(String, i64, RequestOptions),
}

#[derive(Default)]
pub struct FakeGateway {
    counter: AtomicU32,
    calls: Mutex<Vec<Call>>,
    charges: Mutex<HashMap<String, Charge>>,
    events: Mutex<HashMap<String, GatewayEvent>>,
    failing_status: Mutex<Option<u16>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn insert_charge(&self, id: &str, status: &str, amount: i64) {
        let charge = Charge::from_json(json!({
            "object": "charge",
            "id": id,
            "status": status,
            "amount": amount,
            "currency": "thb"
        }))
        .unwrap();
        self.charges.lock().unwrap().insert(id.to_string(), charge);
    }

    pub fn insert_event(&self, id: &str, data: Value) {
        let event = GatewayEvent {
            id: id.to_string(),
            key: Some("charge.complete".to_string()),
            data,
        };
        self.events.lock().unwrap().insert(id.to_string(), event);
    }

    /// Makes every later call fail with the given HTTP status.
    pub fn fail_with(&self, status: u16) {
        *self.failing_status.lock().unwrap() = Some(status);
    }

    fn record(&self, call: Call) -> GatewayResult<()> {
        self.calls.lock().unwrap().push(call);
        match *self.failing_status.lock().unwrap() {
            Some(status) => Err(GatewayError::Api {
                status,
                code: "service_unavailable".to_string(),
                message: "injected failure".to_string(),
            }),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_test_{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn not_found(what: &str, id: &str) -> GatewayError {
        GatewayError::Api {
            status: 404,
            code: "not_found".to_string(),
            message: format!("{} {} was not found", what, id),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_charge(
        &self,
        params: &CreateChargeParams,
        opts: &RequestOptions,
    ) -> GatewayResult<Charge> {
        self.record(Call::CreateCharge(params.clone(), opts.clone()))?;
        let id = self.next_id("chrg");
        let source = match &params.target {
            ChargeTarget::Source(source_id) => json!({ "id": source_id, "type": "promptpay" }),
            ChargeTarget::Card(_) => Value::Null,
        };
        let charge = Charge::from_json(json!({
            "object": "charge",
            "id": id,
            "status": "pending",
            "amount": params.amount,
            "currency": params.currency.to_lowercase(),
            "source": source,
            "authorize_uri": params.return_uri.as_ref().map(|_| "https://pay.example/authorize"),
            "metadata": params.metadata.to_json(),
        }))?;
        self.charges.lock().unwrap().insert(id, charge.clone());
        Ok(charge)
    }

    async fn create_source(
        &self,
        params: &CreateSourceParams,
        opts: &RequestOptions,
    ) -> GatewayResult<Source> {
        self.record(Call::CreateSource(params.clone(), opts.clone()))?;
        Ok(Source {
            id: self.next_id("src"),
            source_type: params.source_type.clone(),
            amount: params.amount,
            currency: params.currency.clone(),
        })
    }

    async fn create_token(
        &self,
        _card: &CardDetails,
        opts: &RequestOptions,
    ) -> GatewayResult<Token> {
        self.record(Call::CreateToken(opts.clone()))?;
        Ok(Token {
            id: self.next_id("tokn"),
        })
    }

    async fn retrieve_charge(&self, charge_id: &str) -> GatewayResult<Charge> {
        self.record(Call::RetrieveCharge(charge_id.to_string()))?;
        self.charges
            .lock()
            .unwrap()
            .get(charge_id)
            .cloned()
            .ok_or_else(|| Self::not_found("charge", charge_id))
    }

    async fn retrieve_event(&self, event_id: &str) -> GatewayResult<GatewayEvent> {
        self.record(Call::RetrieveEvent(event_id.to_string()))?;
        self.events
            .lock()
            .unwrap()
            .get(event_id)
            .cloned()
            .ok_or_else(|| Self::not_found("event", event_id))
    }

    async fn create_refund(
        &self,
        charge_id: &str,
        amount: i64,
        opts: &RequestOptions,
    ) -> GatewayResult<Refund> {
        self.record(Call::CreateRefund(charge_id.to_string(), amount, opts.clone()))?;
        let mut charges = self.charges.lock().unwrap();
        let charge = charges
            .get_mut(charge_id)
            .ok_or_else(|| Self::not_found("charge", charge_id))?;
        charge.refunded_amount += amount;
        Ok(Refund {
            id: self.next_id("rfnd"),
            amount,
            charge: Some(charge_id.to_string()),
            voided: false,
        })
    }
}
