use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::db::queries::{self, TransactionFilter};
use crate::domain::{Transaction, TransactionRef};
use crate::error::AppError;

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub pagination: Pagination,
}

/// Clamps caller-supplied paging to `1..=MAX_PAGE_LIMIT` and a non-negative
/// offset.
pub fn clamp_page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// Read-only access to the ledger.
#[derive(Clone)]
pub struct TransactionQueryService {
    pool: PgPool,
}

impl TransactionQueryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        filter: &TransactionFilter,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<TransactionPage, AppError> {
        let (limit, offset) = clamp_page(limit, offset);
        let transactions = queries::list_transactions(&self.pool, filter, limit, offset).await?;
        let total = queries::count_transactions(&self.pool, filter).await?;

        Ok(TransactionPage {
            transactions,
            pagination: Pagination {
                total,
                limit,
                offset,
            },
        })
    }

    /// Looks a transaction up by internal id or by gateway charge id.
    pub async fn get(&self, target: &str) -> Result<Transaction, AppError> {
        let found = match TransactionRef::parse(target) {
            Some(TransactionRef::Internal(id)) => queries::get_transaction(&self.pool, id).await?,
            Some(TransactionRef::Charge(charge_id)) => {
                queries::get_transaction_by_charge_id(&self.pool, &charge_id).await?
            }
            None => None,
        };
        found.ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", target)))
    }
}
