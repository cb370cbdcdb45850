use sqlx::{PgPool, Postgres, QueryBuilder, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::{LedgerEntry, TransactionRow};
use crate::domain::{ChargeStatus, Channel, Transaction};

/// Optional filters shared by the listing and its total count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<ChargeStatus>,
    pub channel: Option<Channel>,
}

fn into_domain(rows: Vec<TransactionRow>) -> Result<Vec<Transaction>> {
    rows.into_iter().map(Transaction::try_from).collect()
}

// --- Ledger writes (always inside a caller-owned transaction) ---

pub async fn lock_transaction_by_charge_id(
    executor: &mut SqlxTransaction<'_, Postgres>,
    charge_id: &str,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, TransactionRow>(
        "SELECT * FROM transactions WHERE charge_id = $1 FOR UPDATE",
    )
    .bind(charge_id)
    .fetch_optional(&mut **executor)
    .await?
    .map(Transaction::try_from)
    .transpose()
}

/// Inserts the entry unless a row for the charge already exists. Returns
/// `None` when another reconciliation created the row first.
pub async fn insert_transaction_if_absent(
    executor: &mut SqlxTransaction<'_, Postgres>,
    entry: &LedgerEntry,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO transactions (
            id, charge_id, amount, currency, channel, status,
            failure_code, failure_message, user_id, raw_payload, metadata,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
        ON CONFLICT (charge_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&entry.charge_id)
    .bind(entry.amount)
    .bind(&entry.currency)
    .bind(entry.channel.source_type())
    .bind(entry.status.as_str())
    .bind(&entry.failure_code)
    .bind(&entry.failure_message)
    .bind(entry.user_id)
    .bind(&entry.raw_payload)
    .bind(&entry.metadata)
    .fetch_optional(&mut **executor)
    .await?
    .map(Transaction::try_from)
    .transpose()
}

/// Upsert keyed on `charge_id`. The surrogate id and `created_at` of an
/// existing row are never touched.
pub async fn upsert_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    entry: &LedgerEntry,
) -> Result<Transaction> {
    let row = sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO transactions (
            id, charge_id, amount, currency, channel, status,
            failure_code, failure_message, user_id, raw_payload, metadata,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
        ON CONFLICT (charge_id) DO UPDATE SET
            amount = EXCLUDED.amount,
            currency = EXCLUDED.currency,
            channel = EXCLUDED.channel,
            status = EXCLUDED.status,
            failure_code = EXCLUDED.failure_code,
            failure_message = EXCLUDED.failure_message,
            user_id = EXCLUDED.user_id,
            raw_payload = EXCLUDED.raw_payload,
            metadata = EXCLUDED.metadata,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&entry.charge_id)
    .bind(entry.amount)
    .bind(&entry.currency)
    .bind(entry.channel.source_type())
    .bind(entry.status.as_str())
    .bind(&entry.failure_code)
    .bind(&entry.failure_message)
    .bind(entry.user_id)
    .bind(&entry.raw_payload)
    .bind(&entry.metadata)
    .fetch_one(&mut **executor)
    .await?;

    Transaction::try_from(row)
}

pub async fn user_exists(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<bool> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(&mut **executor)
        .await
}

// --- Reads ---

pub async fn get_transaction(pool: &PgPool, id: Uuid) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, TransactionRow>(
        "SELECT * FROM transactions WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(Transaction::try_from)
    .transpose()
}

pub async fn get_transaction_by_charge_id(
    pool: &PgPool,
    charge_id: &str,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, TransactionRow>(
        "SELECT * FROM transactions WHERE charge_id = $1 AND deleted_at IS NULL",
    )
    .bind(charge_id)
    .fetch_optional(pool)
    .await?
    .map(Transaction::try_from)
    .transpose()
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TransactionFilter) {
    builder.push(" WHERE deleted_at IS NULL");
    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(channel) = &filter.channel {
        builder.push(" AND channel = ").push_bind(channel.source_type());
    }
}

pub async fn list_transactions(
    pool: &PgPool,
    filter: &TransactionFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM transactions");
    push_filters(&mut builder, filter);
    // id breaks ties between rows created in the same instant so pages never overlap
    builder
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = builder
        .build_query_as::<TransactionRow>()
        .fetch_all(pool)
        .await?;
    into_domain(rows)
}

pub async fn count_transactions(pool: &PgPool, filter: &TransactionFilter) -> Result<i64> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM transactions");
    push_filters(&mut builder, filter);

    let (total,) = builder
        .build_query_as::<(i64,)>()
        .fetch_one(pool)
        .await?;
    Ok(total)
}
