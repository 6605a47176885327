//! Currency conversion against a fixed USD rate table.
//!
//! Rates are static reference values, not market data; the tool exists to
//! give the reasoning loop a deterministic, retryable finance capability.

use async_trait::async_trait;
use ponder_core::error::ToolError;
use ponder_core::tool::{ParamSpec, ParamType, Tool, ToolContext, ToolDescriptor};
use serde_json::{Value, json};

/// Units of each currency per 1 USD.
const USD_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 0.92),
    ("GBP", 0.79),
    ("JPY", 149.5),
    ("CHF", 0.88),
    ("CAD", 1.36),
    ("AUD", 1.52),
    ("CNY", 7.24),
    ("INR", 83.1),
    ("MXN", 17.1),
];

fn usd_rate(code: &str) -> Option<f64> {
    USD_RATES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, rate)| *rate)
}

fn currency_code(v: &Value) -> Result<(), String> {
    match v.as_str() {
        Some(s) if s.len() == 3 && s.chars().all(|c| c.is_ascii_alphabetic()) => Ok(()),
        _ => Err("must be a 3-letter currency code".into()),
    }
}

pub struct CurrencyConverterTool {
    descriptor: ToolDescriptor,
}

impl CurrencyConverterTool {
    pub fn new() -> Self {
        let descriptor = ToolDescriptor::new(
            "convertCurrency",
            "Convert an amount of money from one currency to another, e.g. \
             {\"amount\": 10, \"from\": \"USD\", \"to\": \"EUR\"}.",
        )
        .category("finance")
        .timeout_ms(5_000)
        .retry(2)
        .param(
            ParamSpec::required("amount", ParamType::Number, "Amount to convert").with_validator(
                |v| match v.as_f64() {
                    Some(n) if n >= 0.0 => Ok(()),
                    _ => Err("must be non-negative".into()),
                },
            ),
        )
        .param(
            ParamSpec::required("from", ParamType::String, "Source currency code, e.g. USD")
                .with_validator(currency_code),
        )
        .param(
            ParamSpec::required("to", ParamType::String, "Target currency code, e.g. EUR")
                .with_validator(currency_code),
        );
        Self { descriptor }
    }

    /// Convert `amount` between two currency codes (case-insensitive).
    pub fn convert(amount: f64, from: &str, to: &str) -> Result<(f64, f64), String> {
        let from = from.to_ascii_uppercase();
        let to = to.to_ascii_uppercase();
        let from_rate = usd_rate(&from).ok_or_else(|| format!("unsupported currency '{from}'"))?;
        let to_rate = usd_rate(&to).ok_or_else(|| format!("unsupported currency '{to}'"))?;
        let rate = to_rate / from_rate;
        let converted = (amount * rate * 100.0).round() / 100.0;
        Ok((converted, rate))
    }
}

impl Default for CurrencyConverterTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CurrencyConverterTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let amount = params["amount"].as_f64().unwrap_or_default();
        let from = params["from"].as_str().unwrap_or_default();
        let to = params["to"].as_str().unwrap_or_default();

        let (converted, rate) = Self::convert(amount, from, to)
            .map_err(|e| ToolError::execution(&self.descriptor.name, e))?;

        Ok(json!({
            "amount": amount,
            "from": from.to_ascii_uppercase(),
            "to": to.to_ascii_uppercase(),
            "rate": rate,
            "converted": converted,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_to_eur() {
        let (converted, rate) = CurrencyConverterTool::convert(10.0, "USD", "EUR").unwrap();
        assert_eq!(converted, 9.2);
        assert!((rate - 0.92).abs() < 1e-12);
    }

    #[test]
    fn cross_rate_goes_through_usd() {
        let (converted, _) = CurrencyConverterTool::convert(92.0, "eur", "usd").unwrap();
        assert_eq!(converted, 100.0);
    }

    #[test]
    fn unsupported_code_is_reported() {
        let err = CurrencyConverterTool::convert(1.0, "USD", "XYZ").unwrap_err();
        assert!(err.contains("XYZ"));
    }

    #[test]
    fn invalid_arguments_collect_every_violation() {
        let tool = CurrencyConverterTool::new();
        let violations = tool
            .descriptor()
            .validate(&json!({"amount": -5, "from": "US", "to": 3}))
            .unwrap_err();
        assert_eq!(
            violations,
            vec![
                "parameter 'amount': must be non-negative",
                "parameter 'from': must be a 3-letter currency code",
                "parameter 'to' expected string, got integer",
            ]
        );
    }

    #[test]
    fn descriptor_is_retryable_finance() {
        let tool = CurrencyConverterTool::new();
        let d = tool.descriptor();
        assert_eq!(d.category, "finance");
        assert!(d.retryable);
        assert_eq!(d.max_retries, 2);
    }

    #[tokio::test]
    async fn execute_returns_structured_result() {
        let tool = CurrencyConverterTool::new();
        let result = tool
            .execute(
                json!({"amount": 10, "from": "USD", "to": "EUR"}),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(result["converted"], 9.2);
        assert_eq!(result["to"], "EUR");
    }
}
