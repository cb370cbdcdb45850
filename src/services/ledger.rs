use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::LedgerEntry;
use crate::db::queries;
use crate::domain::{ChargeStatus, Transaction};
use crate::error::AppError;
use crate::gateway::Charge;
use crate::services::balance::{self, BalanceChange, LedgerSide};

/// Result of folding one gateway charge snapshot into the ledger.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub transaction: Transaction,
    pub previous_status: Option<ChargeStatus>,
    pub balance_changes: Vec<BalanceChange>,
}

/// Keeps exactly one row per gateway charge and the owners' balances in
/// line with it.
#[derive(Clone)]
pub struct TransactionLedger {
    pool: PgPool,
}

impl TransactionLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts the row for `charge` and applies the balance transition, all
    /// in one database transaction. Safe to call any number of times with the
    /// same snapshot: only a change across `successful` moves money.
    #[tracing::instrument(
        name = "ledger.reconcile",
        skip(self, charge, explicit_user),
        fields(charge_id = %charge.id, status = %charge.status)
    )]
    pub async fn reconcile(
        &self,
        charge: &Charge,
        explicit_user: Option<Uuid>,
    ) -> Result<Reconciliation, AppError> {
        let mut db_tx = self.pool.begin().await?;

        let mut previous = queries::lock_transaction_by_charge_id(&mut db_tx, &charge.id).await?;
        let mut created = None;

        if previous.is_none() {
            let owner =
                resolve_owner(&mut db_tx, &charge.id, explicit_user, charge.metadata.user_id, None)
                    .await?;
            let entry = LedgerEntry::from_charge(charge, owner);
            match queries::insert_transaction_if_absent(&mut db_tx, &entry).await? {
                Some(row) => created = Some(row),
                None => {
                    // Another reconciliation inserted first; its row is now
                    // committed, so lock it and continue as an update.
                    tracing::debug!("Lost insert race, re-locking existing row");
                    previous =
                        queries::lock_transaction_by_charge_id(&mut db_tx, &charge.id).await?;
                    if previous.is_none() {
                        return Err(AppError::Internal(format!(
                            "row for {} vanished during reconciliation",
                            charge.id
                        )));
                    }
                }
            }
        }

        let stored = match created {
            Some(row) => row,
            None => {
                let stored_owner = previous.as_ref().and_then(|row| row.user_id);
                let owner = resolve_owner(
                    &mut db_tx,
                    &charge.id,
                    explicit_user,
                    charge.metadata.user_id,
                    stored_owner,
                )
                .await?;
                let entry = LedgerEntry::from_charge(charge, owner);
                queries::upsert_transaction(&mut db_tx, &entry).await?
            }
        };

        let before = previous.as_ref().map(|row| LedgerSide {
            owner: row.user_id,
            successful: row.status.is_successful(),
            amount: row.amount,
        });
        let after = LedgerSide {
            owner: stored.user_id,
            successful: stored.status.is_successful(),
            amount: stored.amount,
        };
        let balance_changes = balance::plan(before, after);
        for change in &balance_changes {
            balance::apply(&mut db_tx, change).await?;
        }

        if stored.user_id.is_none() && stored.status.is_successful() {
            tracing::warn!("Successful charge has no owning user; no balance was credited");
        }

        db_tx.commit().await?;

        let previous_status = previous.map(|row| row.status);
        tracing::info!(
            transaction_id = %stored.id,
            previous_status = ?previous_status,
            changes = balance_changes.len(),
            "Charge reconciled"
        );

        Ok(Reconciliation {
            transaction: stored,
            previous_status,
            balance_changes,
        })
    }
}

/// Picks the owning user: the explicit id, then the metadata hint, then
/// whatever the row already had. Hints naming a user that does not exist are
/// skipped.
async fn resolve_owner(
    db_tx: &mut SqlxTransaction<'_, Postgres>,
    charge_id: &str,
    explicit: Option<Uuid>,
    metadata_hint: Option<Uuid>,
    stored: Option<Uuid>,
) -> Result<Option<Uuid>, AppError> {
    for (source, candidate) in [("explicit", explicit), ("metadata", metadata_hint)] {
        let Some(user_id) = candidate else {
            continue;
        };
        if queries::user_exists(db_tx, user_id).await? {
            return Ok(Some(user_id));
        }
        tracing::warn!(%user_id, charge_id, source, "Ignoring owner hint for unknown user");
    }
    Ok(stored)
}
