//! Decimal money helpers.
//!
//! Every balance, fee and output amount in the wallet is a [`Decimal`]. Amounts
//! coming from the daemon are parsed from their JSON text so no binary floating
//! point ever touches a monetary value.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::errors::{WalletError, WalletResult};

/// Minor units per coin.
pub const SATOSHI_PER_COIN: i64 = 100_000_000;

/// Largest satoshi value the legacy daemon encoding carries without loss (2^53 - 1).
pub const MAX_SAFE_SATOSHI: i64 = 9_007_199_254_740_991;

/// Number of decimal places a coin amount may carry.
pub const COIN_DECIMALS: u32 = 8;

fn satoshi_scale() -> Decimal {
    Decimal::from(SATOSHI_PER_COIN)
}

/// Convert a coin amount to minor units, dropping anything below one satoshi.
pub fn to_satoshi(amount: Decimal) -> WalletResult<Decimal> {
    amount
        .checked_mul(satoshi_scale())
        .map(|scaled| scaled.trunc())
        .ok_or_else(|| WalletError::InvalidAmount(format!("{} overflows satoshi range", amount)))
}

/// Convert minor units back to a coin amount.
pub fn from_satoshi(satoshi: Decimal) -> Decimal {
    (satoshi / satoshi_scale()).normalize()
}

/// Integer minor-unit string used by the precision-safe raw transaction call.
pub fn satoshi_string(amount: Decimal) -> WalletResult<String> {
    Ok(to_satoshi(amount)?.normalize().to_string())
}

/// True when the amount cannot be sent as a native JSON number without the
/// daemon losing precision.
pub fn is_unsafe_amount(amount: Decimal) -> bool {
    match amount.checked_mul(satoshi_scale()) {
        Some(scaled) => scaled > Decimal::from(MAX_SAFE_SATOSHI),
        None => true,
    }
}

/// Parse a decimal from its textual form, accepting scientific notation.
pub fn parse_decimal(text: &str) -> WalletResult<Decimal> {
    let trimmed = text.trim();
    let parsed = if trimmed.contains(|c: char| c == 'e' || c == 'E') {
        Decimal::from_scientific(trimmed)
    } else {
        Decimal::from_str(trimmed)
    };
    parsed.map_err(|e| WalletError::InvalidAmount(format!("'{}': {}", text, e)))
}

/// Parse an amount from a JSON string or number.
pub fn parse_amount(value: &Value) -> WalletResult<Decimal> {
    match value {
        Value::String(text) => parse_decimal(text),
        Value::Number(number) => parse_decimal(&number.to_string()),
        other => Err(WalletError::InvalidAmount(format!(
            "expected a numeric amount, got {}",
            other
        ))),
    }
}

/// Native JSON number for an amount, as the legacy raw transaction call expects.
pub fn amount_to_json_number(amount: Decimal) -> WalletResult<Value> {
    let text = amount.normalize().to_string();
    let value: Value = serde_json::from_str(&text)?;
    if value.is_number() {
        Ok(value)
    } else {
        Err(WalletError::InvalidAmount(format!(
            "{} has no numeric JSON form",
            text
        )))
    }
}

/// Pick the satoshi-exact `rawamount` when present, otherwise the coin `amount`.
pub fn preferred_amount(rawamount: Option<&Value>, amount: Option<&Value>) -> WalletResult<Decimal> {
    if let Some(raw) = rawamount.filter(|v| !v.is_null()) {
        if let Ok(satoshi) = parse_amount(raw) {
            return Ok(from_satoshi(satoshi));
        }
    }
    match amount {
        Some(value) => parse_amount(value),
        None => Ok(Decimal::ZERO),
    }
}

/// Serde adapter for daemon amount fields.
pub fn deserialize_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(Decimal::ZERO);
    }
    parse_amount(&value).map_err(serde::de::Error::custom)
}

/// Serde adapter for optional daemon amount fields.
pub fn deserialize_optional_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_amount(&v).map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(text: &str) -> Decimal {
        Decimal::from_str_exact(text).unwrap()
    }

    #[test]
    fn satoshi_conversions_are_exact() {
        assert_eq!(to_satoshi(dec("0.1")).unwrap(), dec("10000000"));
        assert_eq!(from_satoshi(dec("10000000")), dec("0.1"));
        assert_eq!(satoshi_string(dec("1.5")).unwrap(), "150000000");
        assert_eq!(satoshi_string(dec("0.00000001")).unwrap(), "1");
    }

    #[test]
    fn unsafe_boundary_is_two_pow_53() {
        assert!(!is_unsafe_amount(dec("90071992.54740991")));
        assert!(is_unsafe_amount(dec("90071992.54740992")));
        assert!(is_unsafe_amount(Decimal::MAX));
    }

    #[test]
    fn parses_strings_numbers_and_scientific() {
        assert_eq!(parse_amount(&json!("2.5")).unwrap(), dec("2.5"));
        assert_eq!(parse_amount(&json!(0.1)).unwrap(), dec("0.1"));
        assert_eq!(parse_amount(&json!(3)).unwrap(), dec("3"));
        assert_eq!(parse_amount(&json!("1e-8")).unwrap(), dec("0.00000001"));
        assert!(parse_amount(&json!(true)).is_err());
    }

    #[test]
    fn rawamount_wins_over_amount() {
        let raw = json!("250000000");
        let amount = json!(2.49);
        assert_eq!(
            preferred_amount(Some(&raw), Some(&amount)).unwrap(),
            dec("2.5")
        );
        assert_eq!(
            preferred_amount(None, Some(&amount)).unwrap(),
            dec("2.49")
        );
    }

    #[test]
    fn json_number_form_keeps_digits() {
        let value = amount_to_json_number(dec("1.25000000")).unwrap();
        assert_eq!(value.to_string(), "1.25");
    }
}
