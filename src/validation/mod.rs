use serde::Deserialize;
use std::fmt;

pub const CURRENCY_CODE_LEN: usize = 3;
pub const DESCRIPTION_MAX_LEN: usize = 255;
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

/// Collapses whitespace runs (tabs and newlines included) to single spaces
/// and drops the remaining control characters.
pub fn sanitize_string(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| word.chars().filter(|ch| !ch.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(field: &'static str, amount: i64) -> ValidationResult {
    if amount <= 0 {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }

    Ok(())
}

/// Resolves the request currency against the configured one. A missing
/// currency falls back to the configured default.
pub fn validate_currency(requested: Option<&str>, expected: &str) -> Result<String, ValidationError> {
    let expected = expected.trim().to_ascii_uppercase();
    let currency = match requested {
        Some(raw) => sanitize_string(raw).to_ascii_uppercase(),
        None => return Ok(expected),
    };

    if currency.len() != CURRENCY_CODE_LEN || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            format!("must be a {}-letter currency code", CURRENCY_CODE_LEN),
        ));
    }

    if currency != expected {
        return Err(ValidationError::new(
            "currency",
            format!("must be {}", expected),
        ));
    }

    Ok(currency)
}

pub fn validate_redirect_uri(field: &'static str, value: &str) -> ValidationResult {
    validate_required(field, value)?;
    match url::Url::parse(value.trim()) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ValidationError::new(field, "must be an absolute http(s) URL")),
    }
}

/// Card expiry fields arrive either as JSON numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(u64),
    Text(String),
}

impl NumberOrString {
    pub fn to_u32(&self, field: &'static str) -> Result<u32, ValidationError> {
        let parsed = match self {
            NumberOrString::Number(n) => u32::try_from(*n).ok(),
            NumberOrString::Text(s) => s.trim().parse::<u32>().ok(),
        };
        parsed.ok_or_else(|| ValidationError::new(field, "must be a positive number"))
    }
}

pub fn parse_expiration_month(value: &NumberOrString) -> Result<u32, ValidationError> {
    let month = value.to_u32("expiration_month")?;
    if !(1..=12).contains(&month) {
        return Err(ValidationError::new("expiration_month", "must be between 1 and 12"));
    }
    Ok(month)
}

pub fn parse_expiration_year(value: &NumberOrString) -> Result<u32, ValidationError> {
    let year = value.to_u32("expiration_year")?;
    if year == 0 {
        return Err(ValidationError::new("expiration_year", "must be a positive number"));
    }
    Ok(year)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("th\u{0000}b"), "thb");
        assert_eq!(sanitize_string("John\tDoe"), "John Doe");
        assert_eq!(sanitize_string("a \u{0007} b"), "a b");
    }

    #[test]
    fn validates_positive_amount() {
        assert!(validate_positive_amount("amount", 1).is_ok());
        assert!(validate_positive_amount("amount", 0).is_err());
        assert!(validate_positive_amount("amount", -100).is_err());
    }

    #[test]
    fn currency_defaults_and_must_match() {
        assert_eq!(validate_currency(None, "thb").unwrap(), "THB");
        assert_eq!(validate_currency(Some(" thb "), "THB").unwrap(), "THB");
        assert!(validate_currency(Some("USD"), "THB").is_err());
        assert!(validate_currency(Some("TH"), "THB").is_err());
        assert!(validate_currency(Some("T1B"), "THB").is_err());
    }

    #[test]
    fn validates_redirect_uri() {
        assert!(validate_redirect_uri("return_uri", "https://tutor.example/payments/done").is_ok());
        assert!(validate_redirect_uri("return_uri", "").is_err());
        assert!(validate_redirect_uri("return_uri", "/relative/path").is_err());
        assert!(validate_redirect_uri("return_uri", "ftp://example.com").is_err());
    }

    #[test]
    fn expiry_accepts_numbers_and_strings() {
        let month: NumberOrString = serde_json::from_str("7").unwrap();
        let year: NumberOrString = serde_json::from_str(r#""2031""#).unwrap();

        assert_eq!(parse_expiration_month(&month).unwrap(), 7);
        assert_eq!(parse_expiration_year(&year).unwrap(), 2031);
    }

    #[test]
    fn expiry_rejects_out_of_range_or_garbage() {
        assert!(parse_expiration_month(&NumberOrString::Number(13)).is_err());
        assert!(parse_expiration_month(&NumberOrString::Text("0".into())).is_err());
        assert!(parse_expiration_month(&NumberOrString::Text("july".into())).is_err());
        assert!(parse_expiration_year(&NumberOrString::Number(0)).is_err());
        assert!(parse_expiration_year(&NumberOrString::Number(u64::MAX)).is_err());
    }
}
