use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::db::queries::TransactionFilter;
use crate::domain::{ChargeStatus, Channel, Transaction};
use crate::error::AppError;
use crate::gateway::RequestOptions;
use crate::services::{ChargeRequest, ChargeResponse, RefundResponse, TransactionPage};
use crate::validation::{sanitize_string, validate_max_len, IDEMPOTENCY_KEY_MAX_LEN};
use crate::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListTransactionsParams {
    pub user_id: Option<Uuid>,
    /// pending, successful, failed, expired or reversed
    pub status: Option<String>,
    /// Source type, e.g. card, promptpay, internet_banking_scb
    pub channel: Option<String>,
    /// Page size, 1 to 100 (default 20)
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListTransactionsParams {
    fn filter(&self) -> Result<TransactionFilter, AppError> {
        let status = match self.status.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                raw.to_ascii_lowercase()
                    .parse::<ChargeStatus>()
                    .map_err(|e| AppError::BadRequest(e.to_string()))?,
            ),
            _ => None,
        };
        let channel = self
            .channel
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| Channel::from_source_type(&raw.to_ascii_lowercase()));

        Ok(TransactionFilter {
            user_id: self.user_id,
            status,
            channel,
        })
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// Minor units to refund; omit to refund everything still refundable.
    pub amount: Option<i64>,
}

/// Reads the optional `Idempotency-Key` header. It is scoped to the one
/// gateway call that creates money movement.
fn request_options(headers: &HeaderMap) -> Result<RequestOptions, AppError> {
    let Some(raw) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(RequestOptions::none());
    };
    let key = raw
        .to_str()
        .map(sanitize_string)
        .map_err(|_| AppError::BadRequest("Idempotency-Key must be visible ASCII".to_string()))?;
    if key.is_empty() {
        return Ok(RequestOptions::none());
    }
    validate_max_len("Idempotency-Key", &key, IDEMPOTENCY_KEY_MAX_LEN)?;
    Ok(RequestOptions::with_idempotency_key(key))
}

#[utoipa::path(
    post,
    path = "/payments/charge",
    request_body = ChargeRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Forwarded to the gateway on charge creation")
    ),
    responses(
        (status = 200, description = "Charge created and recorded", body = ChargeResponse),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Gateway or ledger failure; safe to retry with the same Idempotency-Key")
    ),
    tag = "Payments"
)]
pub async fn create_charge(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChargeRequest>, JsonRejection>,
) -> Result<Json<ChargeResponse>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let opts = request_options(&headers)?;

    let response = state.payments.create_charge(&request, &opts).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/payments/transactions",
    params(ListTransactionsParams),
    responses(
        (status = 200, description = "Newest transactions first", body = TransactionPage),
        (status = 400, description = "Invalid filter")
    ),
    tag = "Payments"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    params: Result<Query<ListTransactionsParams>, QueryRejection>,
) -> Result<Json<TransactionPage>, AppError> {
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let filter = params.filter()?;

    let page = state
        .payments
        .list_transactions(&filter, params.limit, params.offset)
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/payments/transactions/{id}",
    params(
        ("id" = String, Path, description = "Internal transaction id or gateway charge id (chrg_...)")
    ),
    responses(
        (status = 200, description = "Transaction found", body = Transaction),
        (status = 404, description = "Transaction not found")
    ),
    tag = "Payments"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, AppError> {
    Ok(Json(state.payments.get_transaction(&id).await?))
}

#[utoipa::path(
    post,
    path = "/payments/transactions/{id}/refund",
    request_body(content = RefundRequest, description = "Empty body refunds the remaining amount"),
    params(
        ("id" = String, Path, description = "Internal transaction id or gateway charge id (chrg_...)"),
        ("Idempotency-Key" = Option<String>, Header, description = "Forwarded to the gateway on refund creation")
    ),
    responses(
        (status = 200, description = "Refund created; reconciliation_error is set if the ledger lags", body = RefundResponse),
        (status = 400, description = "Invalid amount"),
        (status = 404, description = "Transaction or charge not found")
    ),
    tag = "Payments"
)]
pub async fn refund_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RefundResponse>, AppError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RefundRequest::default()
    } else {
        serde_json::from_slice::<RefundRequest>(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid refund body: {}", e)))?
    };
    let opts = request_options(&headers)?;

    let response = state.payments.refund(&id, request.amount, &opts).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_or_blank_idempotency_key_is_none() {
        assert_eq!(request_options(&HeaderMap::new()).unwrap(), RequestOptions::none());

        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("   "));
        assert_eq!(request_options(&headers).unwrap(), RequestOptions::none());
    }

    #[test]
    fn idempotency_key_is_trimmed_and_bounded() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static(" order-42 "));
        assert_eq!(
            request_options(&headers).unwrap(),
            RequestOptions::with_idempotency_key("order-42")
        );

        let long = "k".repeat(IDEMPOTENCY_KEY_MAX_LEN + 1);
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_str(&long).unwrap());
        assert!(matches!(request_options(&headers), Err(AppError::Validation(_))));
    }

    #[test]
    fn list_filter_parses_status_and_channel() {
        let params = ListTransactionsParams {
            status: Some("Successful".to_string()),
            channel: Some("internet_banking_scb".to_string()),
            ..Default::default()
        };
        let filter = params.filter().unwrap();
        assert_eq!(filter.status, Some(ChargeStatus::Successful));
        assert_eq!(filter.channel.map(|c| c.to_string()).as_deref(), Some("internet_banking_scb"));
    }

    #[test]
    fn unknown_status_filter_is_bad_request() {
        let params = ListTransactionsParams {
            status: Some("settled".to_string()),
            ..Default::default()
        };
        assert!(matches!(params.filter(), Err(AppError::BadRequest(_))));
    }
}
