//! Balance adjustments driven by status transitions of a ledger row.
//!
//! Balances are only touched when a charge enters or leaves `successful`,
//! always with an in-database increment expression on the caller's
//! transaction.

use bigdecimal::BigDecimal;
use sqlx::{Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceTransition {
    Credit,
    Debit,
    Unchanged,
}

impl BalanceTransition {
    pub fn between(prev_was_successful: bool, now_successful: bool) -> Self {
        match (prev_was_successful, now_successful) {
            (false, true) => BalanceTransition::Credit,
            (true, false) => BalanceTransition::Debit,
            _ => BalanceTransition::Unchanged,
        }
    }
}

/// Owner, success flag and amount of a ledger row at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSide {
    pub owner: Option<Uuid>,
    pub successful: bool,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceChange {
    Credit { user_id: Uuid, amount_minor: i64 },
    Debit { user_id: Uuid, amount_minor: i64 },
}

/// Works out which balance changes a reconciliation implies.
///
/// With an unchanged owner this is exactly the transition rule. When the
/// owner changes, the previous owner gives back what they were credited and
/// the new owner receives the current amount if the charge is successful.
pub fn plan(previous: Option<LedgerSide>, current: LedgerSide) -> Vec<BalanceChange> {
    let previous = previous.unwrap_or(LedgerSide {
        owner: current.owner,
        successful: false,
        amount: 0,
    });

    if previous.owner == current.owner {
        let Some(user_id) = current.owner else {
            return Vec::new();
        };
        return match BalanceTransition::between(previous.successful, current.successful) {
            BalanceTransition::Credit => vec![BalanceChange::Credit {
                user_id,
                amount_minor: current.amount,
            }],
            // give back what was credited, not what the gateway reports now
            BalanceTransition::Debit => vec![BalanceChange::Debit {
                user_id,
                amount_minor: previous.amount,
            }],
            BalanceTransition::Unchanged => Vec::new(),
        };
    }

    let mut changes = Vec::new();
    if let (Some(user_id), true) = (previous.owner, previous.successful) {
        changes.push(BalanceChange::Debit {
            user_id,
            amount_minor: previous.amount,
        });
    }
    if let (Some(user_id), true) = (current.owner, current.successful) {
        changes.push(BalanceChange::Credit {
            user_id,
            amount_minor: current.amount,
        });
    }
    changes
}

/// Minor currency units to the major-unit balance column.
pub fn minor_to_major(amount_minor: i64) -> BigDecimal {
    (BigDecimal::from(amount_minor) / BigDecimal::from(100)).with_scale(2)
}

pub async fn apply(
    executor: &mut SqlxTransaction<'_, Postgres>,
    change: &BalanceChange,
) -> Result<(), AppError> {
    let (sql, user_id, amount_minor) = match change {
        BalanceChange::Credit {
            user_id,
            amount_minor,
        } => (
            "UPDATE users SET balance = balance + $1, updated_at = NOW() WHERE id = $2",
            *user_id,
            *amount_minor,
        ),
        BalanceChange::Debit {
            user_id,
            amount_minor,
        } => (
            "UPDATE users SET balance = balance - $1, updated_at = NOW() WHERE id = $2",
            *user_id,
            *amount_minor,
        ),
    };

    let result = sqlx::query(sql)
        .bind(minor_to_major(amount_minor))
        .bind(user_id)
        .execute(&mut **executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Internal(format!(
            "user {} disappeared while adjusting balance",
            user_id
        )));
    }

    tracing::info!(%user_id, ?change, "Balance adjusted");
    Ok(())
}
