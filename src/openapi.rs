use axum::Json;
use utoipa::OpenApi;

use crate::domain::{ChargeStatus, Transaction};
use crate::handlers::{self, payments, webhook};
use crate::services::{ChargeRequest, ChargeResponse, Pagination, PaymentType, RefundResponse, TransactionPage};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        payments::create_charge,
        payments::list_transactions,
        payments::get_transaction,
        payments::refund_transaction,
        webhook::omise_webhook,
    ),
    components(schemas(
        handlers::HealthStatus,
        handlers::DbPoolStats,
        ChargeRequest,
        PaymentType,
        ChargeResponse,
        ChargeStatus,
        Transaction,
        TransactionPage,
        Pagination,
        payments::RefundRequest,
        RefundResponse,
        webhook::WebhookAck,
    )),
    tags(
        (name = "Payments", description = "Charge creation, ledger queries and refunds"),
        (name = "Webhooks", description = "Gateway notifications"),
        (name = "Health", description = "Liveness and dependency status")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
