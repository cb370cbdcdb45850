pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod services;
pub mod utils;
pub mod validation;

use std::time::Duration;

use axum::{
    http::{header, HeaderName, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

use crate::services::PaymentService;

/// Upper bound for one HTTP request, including gateway round-trips.
const REQUEST_TIMEOUT_SECS: u64 = 90;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub payments: PaymentService,
}

impl AppState {
    pub fn gateway_state(&self) -> String {
        self.payments.gateway_state()
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(handlers::payments::IDEMPOTENCY_KEY_HEADER),
        ])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .route("/payments/charge", post(handlers::payments::create_charge))
        .route(
            "/payments/transactions",
            get(handlers::payments::list_transactions),
        )
        .route(
            "/payments/transactions/:id",
            get(handlers::payments::get_transaction),
        )
        .route(
            "/payments/transactions/:id/refund",
            post(handlers::payments::refund_transaction),
        )
        .route("/webhooks/omise", post(handlers::webhook::omise_webhook))
        .with_state(state)
        .layer(cors)
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(axum::middleware::from_fn(
            middleware::request_logger::request_logger_middleware,
        ))
}
