pub mod balance;
pub mod charge;
pub mod ledger;
pub mod refund;
pub mod transactions;
pub mod webhook;

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::config::PaymentSettings;
use crate::db::queries::TransactionFilter;
use crate::domain::Transaction;
use crate::error::AppError;
use crate::gateway::{Charge, PaymentGateway, Refund, RequestOptions};

pub use charge::{ChargeInitiator, ChargeRequest, PaymentType};
pub use ledger::{Reconciliation, TransactionLedger};
pub use refund::{RefundOrchestrator, RefundOutcome};
pub use transactions::{Pagination, TransactionPage, TransactionQueryService};
pub use webhook::{WebhookOutcome, WebhookVerifier};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChargeResponse {
    pub transaction: Transaction,
    /// Gateway view of the charge, including `authorize_uri` for redirect
    /// flows and the scannable code for QR payments.
    #[schema(value_type = Object)]
    pub charge: Charge,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefundResponse {
    #[schema(value_type = Object)]
    pub refund: Refund,
    #[schema(value_type = Option<Object>)]
    pub charge: Option<Charge>,
    pub transaction: Option<Transaction>,
    /// Set when the refund went through at the gateway but the ledger could
    /// not be brought up to date; a later webhook will catch it up.
    pub reconciliation_error: Option<String>,
}

impl From<RefundOutcome> for RefundResponse {
    fn from(outcome: RefundOutcome) -> Self {
        let (transaction, reconciliation_error) = match outcome.reconciliation {
            Ok(transaction) => (Some(transaction), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            refund: outcome.refund,
            charge: outcome.charge,
            transaction,
            reconciliation_error,
        }
    }
}

/// Entry point used by the HTTP handlers and the CLI.
#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    initiator: ChargeInitiator,
    ledger: TransactionLedger,
    webhooks: WebhookVerifier,
    refunds: RefundOrchestrator,
    queries: TransactionQueryService,
}

impl PaymentService {
    pub fn new(pool: PgPool, gateway: Arc<dyn PaymentGateway>, settings: PaymentSettings) -> Self {
        let ledger = TransactionLedger::new(pool.clone());
        Self {
            initiator: ChargeInitiator::new(gateway.clone(), settings),
            webhooks: WebhookVerifier::new(gateway.clone(), ledger.clone()),
            refunds: RefundOrchestrator::new(pool.clone(), gateway.clone(), ledger.clone()),
            queries: TransactionQueryService::new(pool),
            ledger,
            gateway,
        }
    }

    /// Creates the gateway charge and records it. If recording fails the
    /// charge still exists at the gateway; the error is retryable and the
    /// charge's webhook will reconcile it either way.
    pub async fn create_charge(
        &self,
        request: &ChargeRequest,
        opts: &RequestOptions,
    ) -> Result<ChargeResponse, AppError> {
        let charge = self.initiator.initiate(request, opts).await?;
        let reconciled = self
            .ledger
            .reconcile(&charge, request.user_id)
            .await
            .map_err(|e| {
                tracing::error!(charge_id = %charge.id, operation = "reconcile", error = %e, "New charge could not be recorded");
                AppError::reconciliation(charge.id.clone(), e)
            })?;

        Ok(ChargeResponse {
            transaction: reconciled.transaction,
            charge,
        })
    }

    pub async fn list_transactions(
        &self,
        filter: &TransactionFilter,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<TransactionPage, AppError> {
        self.queries.list(filter, limit, offset).await
    }

    pub async fn get_transaction(&self, target: &str) -> Result<Transaction, AppError> {
        self.queries.get(target).await
    }

    pub async fn refund(
        &self,
        target: &str,
        amount: Option<i64>,
        opts: &RequestOptions,
    ) -> Result<RefundResponse, AppError> {
        Ok(self.refunds.refund(target, amount, opts).await?.into())
    }

    pub async fn handle_webhook(&self, body: &[u8]) -> Result<WebhookOutcome, AppError> {
        self.webhooks.handle(body).await
    }

    pub fn gateway_state(&self) -> String {
        self.gateway.circuit_state()
    }

    /// Re-fetches a charge and folds it into the ledger, as a webhook would.
    pub async fn reconcile_charge(&self, charge_id: &str) -> Result<Reconciliation, AppError> {
        let charge = self.gateway.retrieve_charge(charge_id).await.map_err(|e| {
            if e.is_not_found() {
                AppError::NotFound(format!("Charge {} not found", charge_id))
            } else {
                AppError::Gateway(e)
            }
        })?;
        self.ledger.reconcile(&charge, None).await
    }
}
