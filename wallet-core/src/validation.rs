use crate::amount::COIN_DECIMALS;
use crate::errors::{WalletError, WalletResult};
use regex::Regex;
use rust_decimal::Decimal;

/// Boundary checks for requests coming from the presentation layer.
pub struct InputValidator {
    // Compiled once per validator
    address_pattern: Regex,
    txid_pattern: Regex,

    // Labels end up rendered by the UI
    malicious_patterns: Vec<Regex>,
}

fn compile(pattern: &str) -> WalletResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| WalletError::ValidationError(format!("Invalid regex {}: {}", pattern, e)))
}

impl InputValidator {
    pub fn new() -> WalletResult<Self> {
        // Base58 alphabet, P2PKH/P2SH length range
        let address_pattern = compile(r"^[1-9A-HJ-NP-Za-km-z]{26,35}$")?;
        let txid_pattern = compile(r"^[a-fA-F0-9]{64}$")?;

        let malicious_patterns = [
            r"<script",
            r"javascript:",
            r"data:text/html",
            r"vbscript:",
            r"onload=",
            r"onerror=",
        ]
        .iter()
        .map(|p| compile(p))
        .collect::<WalletResult<Vec<_>>>()?;

        Ok(InputValidator {
            address_pattern,
            txid_pattern,
            malicious_patterns,
        })
    }

    /// Validate a wallet address
    pub fn validate_address(&self, address: &str) -> WalletResult<()> {
        if address.is_empty() {
            return Err(WalletError::ValidationError(
                "Address cannot be empty".to_string(),
            ));
        }

        if !self.address_pattern.is_match(address) {
            return Err(WalletError::InvalidAddress(format!(
                "Address format is invalid: {}",
                address
            )));
        }

        Ok(())
    }

    /// Validate a transaction id
    pub fn validate_txid(&self, txid: &str) -> WalletResult<()> {
        if !self.txid_pattern.is_match(txid) {
            return Err(WalletError::ValidationError(format!(
                "Transaction id must be 64 hex characters: {}",
                txid
            )));
        }
        Ok(())
    }

    /// Validate an output amount: positive, at most eight decimals.
    pub fn validate_amount(&self, amount: Decimal) -> WalletResult<()> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }
        Self::check_precision(amount)
    }

    /// Validate a fee: zero is allowed, negative is not.
    pub fn validate_fee(&self, fee: Decimal) -> WalletResult<()> {
        if fee.is_sign_negative() && !fee.is_zero() {
            return Err(WalletError::InvalidAmount(
                "Fee cannot be negative".to_string(),
            ));
        }
        Self::check_precision(fee)
    }

    /// Validate an address label
    pub fn validate_label(&self, label: &str) -> WalletResult<()> {
        self.check_basic_security(label)?;

        if label.chars().count() > 100 {
            return Err(WalletError::ValidationError("Label too long".to_string()));
        }

        if label.chars().any(char::is_control) {
            return Err(WalletError::ValidationError(
                "Label contains control characters".to_string(),
            ));
        }

        Ok(())
    }

    fn check_precision(amount: Decimal) -> WalletResult<()> {
        if amount.normalize().scale() > COIN_DECIMALS {
            return Err(WalletError::InvalidAmount(format!(
                "{} has more than {} decimal places",
                amount, COIN_DECIMALS
            )));
        }
        Ok(())
    }

    /// Check for basic security issues in free-form input
    fn check_basic_security(&self, input: &str) -> WalletResult<()> {
        if input.len() > 1000 {
            return Err(WalletError::ValidationError("Input too long".to_string()));
        }

        let lowered = input.to_lowercase();
        if self.malicious_patterns.iter().any(|p| p.is_match(&lowered)) {
            return Err(WalletError::ValidationError(
                "Input contains potentially malicious content".to_string(),
            ));
        }

        Ok(())
    }
}
