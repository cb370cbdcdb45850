//! Transaction domain entity.
//! Framework-agnostic representation of a ledger row mirroring one gateway charge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Prefix the gateway uses for charge identifiers.
pub const CHARGE_ID_PREFIX: &str = "chrg_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Charge lifecycle as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Pending,
    Successful,
    Failed,
    Expired,
    Reversed,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Pending => "pending",
            ChargeStatus::Successful => "successful",
            ChargeStatus::Failed => "failed",
            ChargeStatus::Expired => "expired",
            ChargeStatus::Reversed => "reversed",
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, ChargeStatus::Successful)
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChargeStatus::Pending),
            "successful" => Ok(ChargeStatus::Successful),
            "failed" => Ok(ChargeStatus::Failed),
            "expired" => Ok(ChargeStatus::Expired),
            "reversed" => Ok(ChargeStatus::Reversed),
            other => Err(ParseEnumError {
                kind: "charge status",
                value: other.to_string(),
            }),
        }
    }
}

/// Banks supported for the internet-banking redirect flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BankCode {
    Bay,
    Bbl,
    Ktb,
    Scb,
}

impl BankCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BankCode::Bay => "bay",
            BankCode::Bbl => "bbl",
            BankCode::Ktb => "ktb",
            BankCode::Scb => "scb",
        }
    }
}

impl FromStr for BankCode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bay" => Ok(BankCode::Bay),
            "bbl" => Ok(BankCode::Bbl),
            "ktb" => Ok(BankCode::Ktb),
            "scb" => Ok(BankCode::Scb),
            _ => Err(ParseEnumError {
                kind: "bank code",
                value: s.to_string(),
            }),
        }
    }
}

/// Payment channel derived from the gateway's reported source type.
///
/// `Other` keeps source types this service never initiates itself (wallets,
/// mobile banking) so that reconciliation of such charges still succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Channel {
    Card,
    PromptPay,
    InternetBanking(BankCode),
    Other(String),
}

impl Channel {
    pub fn from_source_type(source_type: &str) -> Self {
        match source_type {
            "" | "card" => Channel::Card,
            "promptpay" => Channel::PromptPay,
            other => match other
                .strip_prefix("internet_banking_")
                .and_then(|bank| bank.parse::<BankCode>().ok())
            {
                Some(bank) => Channel::InternetBanking(bank),
                None => Channel::Other(other.to_string()),
            },
        }
    }

    /// Source type string used both in the ledger and in gateway requests.
    pub fn source_type(&self) -> String {
        match self {
            Channel::Card => "card".to_string(),
            Channel::PromptPay => "promptpay".to_string(),
            Channel::InternetBanking(bank) => format!("internet_banking_{}", bank.as_str()),
            Channel::Other(raw) => raw.clone(),
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel::Card
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source_type())
    }
}

impl From<String> for Channel {
    fn from(value: String) -> Self {
        Channel::from_source_type(&value)
    }
}

impl From<Channel> for String {
    fn from(value: Channel) -> Self {
        value.source_type()
    }
}

/// Metadata attached to charges and sources.
///
/// `user_id` is the only key the ledger reads; everything else is passed
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargeMetadata {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_user_id"
    )]
    pub user_id: Option<Uuid>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChargeMetadata {
    pub fn for_user(user_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_extra(mut self, extra: serde_json::Map<String, serde_json::Value>) -> Self {
        for (key, value) in extra {
            if key != "user_id" {
                self.extra.insert(key, value);
            }
        }
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
    }
}

// A malformed hint is treated as absent rather than failing the whole charge.
fn lenient_user_id<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s.trim()).ok()))
}

/// Reference to a transaction as accepted on the HTTP surface: either the
/// internal surrogate id or the external charge id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionRef {
    Internal(Uuid),
    Charge(String),
}

impl TransactionRef {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.starts_with(CHARGE_ID_PREFIX) {
            return is_gateway_id(raw).then(|| TransactionRef::Charge(raw.to_string()));
        }
        Uuid::parse_str(raw).ok().map(TransactionRef::Internal)
    }
}

/// Whether `raw` has the shape of a gateway object id (`chrg_test_5xyz`,
/// `evnt_...`): a lowercase prefix, an underscore, then ASCII letters, digits
/// and underscores. Ids end up as URL path segments on authenticated calls.
pub fn is_gateway_id(raw: &str) -> bool {
    let Some((prefix, rest)) = raw.split_once('_') else {
        return false;
    };
    !prefix.is_empty()
        && prefix.bytes().all(|b| b.is_ascii_lowercase())
        && !rest.is_empty()
        && rest.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Domain entity representing one reconciled charge.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Transaction {
    pub id: Uuid,
    pub charge_id: String,
    pub amount: i64,
    pub currency: String,
    #[schema(value_type = String, example = "promptpay")]
    pub channel: Channel,
    pub status: ChargeStatus,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub user_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub metadata: ChargeMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}
