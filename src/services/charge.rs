use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::PaymentSettings;
use crate::domain::{BankCode, ChargeMetadata, Channel};
use crate::error::AppError;
use crate::gateway::{
    CardDetails, Charge, ChargeTarget, CreateChargeParams, CreateSourceParams, PaymentGateway,
    RequestOptions,
};
use crate::validation::{
    parse_expiration_month, parse_expiration_year, sanitize_string, validate_currency,
    validate_max_len, validate_positive_amount, validate_redirect_uri, validate_required,
    NumberOrString, ValidationError, DESCRIPTION_MAX_LEN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Card,
    Promptpay,
    InternetBanking,
}

/// Body of `POST /payments/charge`. Which of the optional fields are
/// required depends on `payment_type`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChargeRequest {
    /// Amount in minor currency units (satang for THB).
    #[schema(example = 10000)]
    pub amount: i64,
    pub payment_type: PaymentType,
    #[schema(example = "THB")]
    pub currency: Option<String>,
    pub user_id: Option<Uuid>,
    pub description: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Card token created client-side; takes precedence over raw card fields.
    pub token: Option<String>,
    pub name: Option<String>,
    pub number: Option<String>,
    #[schema(value_type = Option<u32>)]
    pub expiration_month: Option<NumberOrString>,
    #[schema(value_type = Option<u32>)]
    pub expiration_year: Option<NumberOrString>,
    pub security_code: Option<String>,

    /// Bank code for `internet_banking`: bay, bbl, ktb or scb.
    pub bank: Option<String>,
    pub return_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Funding {
    Token(String),
    Tokenize(CardDetails),
    Source(Channel),
}

/// A fully validated charge, ready to be sent to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChargePlan {
    pub amount: i64,
    pub currency: String,
    pub funding: Funding,
    pub return_uri: Option<String>,
    pub description: Option<String>,
    pub metadata: ChargeMetadata,
}

/// Validates charge requests and turns them into gateway charges.
#[derive(Clone)]
pub struct ChargeInitiator {
    gateway: Arc<dyn PaymentGateway>,
    settings: PaymentSettings,
}

impl ChargeInitiator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, settings: PaymentSettings) -> Self {
        Self { gateway, settings }
    }

    pub(crate) fn plan(&self, request: &ChargeRequest) -> Result<ChargePlan, ValidationError> {
        validate_positive_amount("amount", request.amount)?;
        let currency =
            validate_currency(request.currency.as_deref(), &self.settings.default_currency)?;

        let description = match request.description.as_deref().map(sanitize_string) {
            Some(text) if !text.is_empty() => {
                validate_max_len("description", &text, DESCRIPTION_MAX_LEN)?;
                Some(text)
            }
            _ => None,
        };

        // Blank counts as absent so the configured default still applies.
        let requested_return_uri = request
            .return_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty());

        let (funding, return_uri) = match request.payment_type {
            PaymentType::Card => {
                let return_uri = match requested_return_uri {
                    Some(uri) => {
                        validate_redirect_uri("return_uri", uri)?;
                        Some(uri.to_string())
                    }
                    None => None,
                };
                (card_funding(request)?, return_uri)
            }
            PaymentType::Promptpay => (Funding::Source(Channel::PromptPay), None),
            PaymentType::InternetBanking => {
                let bank = request
                    .bank
                    .as_deref()
                    .map(str::trim)
                    .filter(|bank| !bank.is_empty())
                    .ok_or_else(|| {
                        ValidationError::new("bank", "is required for internet banking")
                    })?
                    .parse::<BankCode>()
                    .map_err(|_| ValidationError::new("bank", "must be one of bay, bbl, ktb, scb"))?;
                let return_uri = requested_return_uri
                    .map(str::to_string)
                    .or_else(|| self.settings.default_return_uri.clone())
                    .ok_or_else(|| {
                        ValidationError::new("return_uri", "is required for internet banking")
                    })?;
                validate_redirect_uri("return_uri", &return_uri)?;
                (
                    Funding::Source(Channel::InternetBanking(bank)),
                    Some(return_uri.trim().to_string()),
                )
            }
        };

        Ok(ChargePlan {
            amount: request.amount,
            currency,
            funding,
            return_uri,
            description,
            metadata: ChargeMetadata::for_user(request.user_id)
                .with_extra(request.metadata.clone()),
        })
    }

    /// Creates the gateway charge. Nothing is sent unless the whole request
    /// validates. The idempotency key only guards the final charge creation;
    /// tokens and sources are cheap, unbilled objects.
    pub async fn initiate(
        &self,
        request: &ChargeRequest,
        opts: &RequestOptions,
    ) -> Result<Charge, AppError> {
        let plan = self.plan(request)?;

        let target = match &plan.funding {
            Funding::Token(token) => ChargeTarget::Card(token.clone()),
            Funding::Tokenize(card) => {
                let token = self
                    .gateway
                    .create_token(card, &RequestOptions::none())
                    .await
                    .map_err(|e| {
                        tracing::error!(operation = "create_token", error = %e, "Card tokenisation failed");
                        AppError::Gateway(e)
                    })?;
                ChargeTarget::Card(token.id)
            }
            Funding::Source(channel) => {
                let params = CreateSourceParams {
                    source_type: channel.source_type(),
                    amount: plan.amount,
                    currency: plan.currency.clone(),
                };
                let source = self
                    .gateway
                    .create_source(&params, &RequestOptions::none())
                    .await
                    .map_err(|e| {
                        tracing::error!(operation = "create_source", %channel, error = %e, "Source creation failed");
                        AppError::Gateway(e)
                    })?;
                ChargeTarget::Source(source.id)
            }
        };

        let params = CreateChargeParams {
            amount: plan.amount,
            currency: plan.currency,
            target,
            return_uri: plan.return_uri,
            description: plan.description,
            metadata: plan.metadata,
        };
        let charge = self.gateway.create_charge(&params, opts).await.map_err(|e| {
            tracing::error!(operation = "create_charge", error = %e, "Charge creation failed");
            AppError::Gateway(e)
        })?;

        tracing::info!(
            charge_id = %charge.id,
            status = %charge.status,
            amount = charge.amount,
            channel = %charge.channel(),
            "Charge created"
        );
        Ok(charge)
    }
}

fn card_funding(request: &ChargeRequest) -> Result<Funding, ValidationError> {
    if let Some(token) = request.token.as_deref().map(str::trim) {
        if !token.is_empty() {
            return Ok(Funding::Token(token.to_string()));
        }
    }

    let name = sanitize_string(request.name.as_deref().unwrap_or_default());
    validate_required("name", &name)?;

    let number: String = request
        .number
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '-'))
        .collect();
    validate_required("number", &number)?;
    if !(12..=19).contains(&number.len()) || !number.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new("number", "must be 12 to 19 digits"));
    }

    let expiration_month = request
        .expiration_month
        .as_ref()
        .ok_or_else(|| ValidationError::new("expiration_month", "is required"))
        .and_then(parse_expiration_month)?;
    let expiration_year = request
        .expiration_year
        .as_ref()
        .ok_or_else(|| ValidationError::new("expiration_year", "is required"))
        .and_then(parse_expiration_year)?;

    let security_code = request
        .security_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string);

    Ok(Funding::Tokenize(CardDetails {
        name,
        number,
        expiration_month,
        expiration_year,
        security_code,
    }))
}
