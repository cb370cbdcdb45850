use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{ChargeMetadata, ChargeStatus, Channel, Transaction};
use crate::gateway::Charge;

/// Row type for the `transactions` table. `raw_payload` is loaded but never
/// surfaced in the domain type.
#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub charge_id: String,
    pub amount: i64,
    pub currency: String,
    pub channel: String,
    pub status: String,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub user_id: Option<Uuid>,
    pub raw_payload: Value,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = sqlx::Error;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<ChargeStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let metadata = if row.metadata.is_null() {
            ChargeMetadata::default()
        } else {
            serde_json::from_value(row.metadata).map_err(|e| sqlx::Error::Decode(Box::new(e)))?
        };

        Ok(Transaction {
            id: row.id,
            charge_id: row.charge_id,
            amount: row.amount,
            currency: row.currency,
            channel: Channel::from_source_type(&row.channel),
            status,
            failure_code: row.failure_code,
            failure_message: row.failure_message,
            user_id: row.user_id,
            metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Values written by a single reconciliation of one gateway charge.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub charge_id: String,
    pub amount: i64,
    pub currency: String,
    pub channel: Channel,
    pub status: ChargeStatus,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub user_id: Option<Uuid>,
    pub raw_payload: Value,
    pub metadata: Value,
}

impl LedgerEntry {
    pub fn from_charge(charge: &Charge, user_id: Option<Uuid>) -> Self {
        // Failure details are only meaningful while the charge is failed.
        let failed = matches!(charge.status, ChargeStatus::Failed);
        Self {
            charge_id: charge.id.clone(),
            amount: charge.amount,
            currency: charge.currency.to_ascii_uppercase(),
            channel: charge.channel(),
            status: charge.status,
            failure_code: charge.failure_code.clone().filter(|_| failed),
            failure_message: charge.failure_message.clone().filter(|_| failed),
            user_id,
            raw_payload: charge.raw.clone(),
            metadata: charge.metadata.to_json(),
        }
    }
}
