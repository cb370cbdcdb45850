use anyhow::Context;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::gateway::omise::{OmiseSettings, DEFAULT_API_URL, DEFAULT_VAULT_URL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Settings the charge initiator validates requests against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSettings {
    pub default_currency: String,
    pub default_return_uri: Option<String>,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            default_currency: "THB".to_string(),
            default_return_uri: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub omise_secret_key: String,
    pub omise_public_key: String,
    pub omise_api_url: String,
    pub omise_vault_url: String,
    pub omise_timeout_secs: u64,
    pub omise_breaker_failures: u32,
    pub omise_breaker_reset_secs: u64,
    pub payments: PaymentSettings,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "pretty".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        };

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("SERVER_PORT must be a port number")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a number")?,
            omise_secret_key: env::var("OMISE_SECRET_KEY").context("OMISE_SECRET_KEY is required")?,
            omise_public_key: env::var("OMISE_PUBLIC_KEY").context("OMISE_PUBLIC_KEY is required")?,
            omise_api_url: env::var("OMISE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            omise_vault_url: env::var("OMISE_VAULT_URL")
                .unwrap_or_else(|_| DEFAULT_VAULT_URL.to_string()),
            omise_timeout_secs: env::var("OMISE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("OMISE_TIMEOUT_SECS must be a number")?,
            omise_breaker_failures: env::var("OMISE_BREAKER_FAILURES")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("OMISE_BREAKER_FAILURES must be a number")?,
            omise_breaker_reset_secs: env::var("OMISE_BREAKER_RESET_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("OMISE_BREAKER_RESET_SECS must be a number")?,
            payments: PaymentSettings {
                default_currency: env::var("PAYMENT_DEFAULT_CURRENCY")
                    .unwrap_or_else(|_| "THB".to_string())
                    .to_ascii_uppercase(),
                default_return_uri: env::var("PAYMENT_DEFAULT_RETURN_URI")
                    .ok()
                    .filter(|uri| !uri.trim().is_empty()),
            },
            log_format,
        })
    }

    pub fn omise_settings(&self) -> OmiseSettings {
        OmiseSettings {
            secret_key: self.omise_secret_key.clone(),
            public_key: self.omise_public_key.clone(),
            api_url: self.omise_api_url.clone(),
            vault_url: self.omise_vault_url.clone(),
            timeout: Duration::from_secs(self.omise_timeout_secs),
            breaker_failures: self.omise_breaker_failures,
            breaker_reset: Duration::from_secs(self.omise_breaker_reset_secs),
        }
    }

    /// Checks values that parse fine but cannot work at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.server_port == 0 {
            anyhow::bail!("SERVER_PORT must be greater than 0");
        }
        if self.omise_timeout_secs == 0 {
            anyhow::bail!("OMISE_TIMEOUT_SECS must be greater than 0");
        }
        if self.payments.default_currency.len() != 3 {
            anyhow::bail!("PAYMENT_DEFAULT_CURRENCY must be a 3-letter code");
        }
        url::Url::parse(&self.omise_api_url).context("OMISE_API_URL is not a valid URL")?;
        url::Url::parse(&self.omise_vault_url).context("OMISE_VAULT_URL is not a valid URL")?;
        if let Some(uri) = &self.payments.default_return_uri {
            url::Url::parse(uri).context("PAYMENT_DEFAULT_RETURN_URI is not a valid URL")?;
        }
        Ok(())
    }
}
