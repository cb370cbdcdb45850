use std::sync::Arc;

use sqlx::PgPool;

use crate::db::queries;
use crate::domain::{Transaction, TransactionRef};
use crate::error::AppError;
use crate::gateway::{Charge, GatewayError, PaymentGateway, Refund, RequestOptions};
use crate::services::ledger::TransactionLedger;
use crate::validation::validate_positive_amount;

/// A refund the gateway accepted, plus how the local reconciliation went.
/// A reconciliation failure never hides the refund itself.
#[derive(Debug)]
pub struct RefundOutcome {
    pub refund: Refund,
    pub charge: Option<Charge>,
    pub reconciliation: Result<Transaction, AppError>,
}

#[derive(Clone)]
pub struct RefundOrchestrator {
    pool: PgPool,
    gateway: Arc<dyn PaymentGateway>,
    ledger: TransactionLedger,
}

impl RefundOrchestrator {
    pub fn new(pool: PgPool, gateway: Arc<dyn PaymentGateway>, ledger: TransactionLedger) -> Self {
        Self {
            pool,
            gateway,
            ledger,
        }
    }

    /// Refunds `amount` minor units, or whatever is still refundable when no
    /// amount is given. `target` is a gateway charge id or an internal id.
    pub async fn refund(
        &self,
        target: &str,
        amount: Option<i64>,
        opts: &RequestOptions,
    ) -> Result<RefundOutcome, AppError> {
        if let Some(amount) = amount {
            validate_positive_amount("amount", amount)?;
        }
        let charge_id = self.resolve_charge_id(target).await?;

        let amount = match amount {
            Some(amount) => amount,
            None => {
                let charge = self
                    .gateway
                    .retrieve_charge(&charge_id)
                    .await
                    .map_err(|e| gateway_error(&charge_id, "retrieve_charge", e))?;
                let remaining = charge.refundable_amount();
                if remaining == 0 {
                    return Err(AppError::Validation(format!(
                        "charge {} has nothing left to refund",
                        charge_id
                    )));
                }
                remaining
            }
        };

        let refund = self
            .gateway
            .create_refund(&charge_id, amount, opts)
            .await
            .map_err(|e| gateway_error(&charge_id, "create_refund", e))?;
        tracing::info!(charge_id = %charge_id, refund_id = %refund.id, amount, "Refund created");

        let charge = match self.gateway.retrieve_charge(&charge_id).await {
            Ok(charge) => charge,
            Err(e) => {
                tracing::error!(charge_id = %charge_id, operation = "retrieve_charge", error = %e, "Refunded charge could not be re-fetched");
                return Ok(RefundOutcome {
                    refund,
                    charge: None,
                    reconciliation: Err(AppError::reconciliation(charge_id, AppError::Gateway(e))),
                });
            }
        };

        let reconciliation = match self.ledger.reconcile(&charge, None).await {
            Ok(reconciled) => Ok(reconciled.transaction),
            Err(e) => {
                tracing::error!(charge_id = %charge_id, operation = "reconcile", error = %e, "Refunded charge could not be reconciled");
                Err(AppError::reconciliation(charge_id, e))
            }
        };

        Ok(RefundOutcome {
            refund,
            charge: Some(charge),
            reconciliation,
        })
    }

    async fn resolve_charge_id(&self, target: &str) -> Result<String, AppError> {
        match TransactionRef::parse(target) {
            Some(TransactionRef::Charge(charge_id)) => Ok(charge_id),
            Some(TransactionRef::Internal(id)) => queries::get_transaction(&self.pool, id)
                .await?
                .map(|tx| tx.charge_id)
                .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id))),
            None => Err(AppError::NotFound(format!("Transaction {} not found", target))),
        }
    }
}

fn gateway_error(charge_id: &str, operation: &'static str, err: GatewayError) -> AppError {
    if err.is_not_found() {
        return AppError::NotFound(format!("Charge {} not found", charge_id));
    }
    tracing::error!(charge_id, operation, error = %err, "Refund gateway call failed");
    AppError::Gateway(err)
}
