//! Funds-transfer construction.
//!
//! Validates the requested inputs against live unspent outputs, balances them
//! against outputs plus fee in decimal arithmetic, routes change, picks the
//! raw-transaction call the daemon can encode without overflow, checks the fee
//! against the raw size and finally signs and broadcasts.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::accounts::{self, CHANGE_LABEL};
use crate::amount;
use crate::correlator::DaemonRpc;
use crate::encryption::EncryptionGuard;
use crate::errors::{WalletError, WalletResult};
use crate::validation::InputValidator;
use crate::version::VersionGate;

/// Fee charged per started kilobyte of raw transaction hex.
pub fn default_fee_per_kb() -> Decimal {
    Decimal::new(1, 4)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: String,
    pub vout: u32,
}

#[derive(Debug)]
pub struct TransactionRequest {
    pub inputs: Vec<OutPoint>,
    pub outputs: BTreeMap<String, Decimal>,
    pub fee: Decimal,
    pub passphrase: Option<SecretString>,
    pub change_address: Option<String>,
}

impl TransactionRequest {
    /// Parse positional `[inputs, outputs, fee, passphrase?, changeAddress?]`.
    pub fn from_params(params: &[Value]) -> WalletResult<Self> {
        let inputs = match params.first() {
            Some(value) => serde_json::from_value::<Vec<OutPoint>>(value.clone())
                .map_err(|e| WalletError::ValidationError(format!("Invalid inputs: {}", e)))?,
            None => Vec::new(),
        };

        let mut outputs = BTreeMap::new();
        match params.get(1) {
            Some(Value::Object(map)) => {
                for (address, value) in map {
                    outputs.insert(address.clone(), amount::parse_amount(value)?);
                }
            }
            Some(Value::Null) | None => {}
            Some(other) => {
                return Err(WalletError::ValidationError(format!(
                    "Outputs must be an object, got {}",
                    other
                )))
            }
        }

        let fee = match params.get(2) {
            Some(value) if !value.is_null() => amount::parse_amount(value)?,
            _ => Decimal::ZERO,
        };

        let non_empty = |index: usize| {
            params
                .get(index)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            inputs,
            outputs,
            fee,
            passphrase: non_empty(3).map(SecretString::from),
            change_address: non_empty(4),
        })
    }

    /// Reject malformed requests before any daemon call is made.
    pub fn validate(&self, validator: &InputValidator) -> WalletResult<()> {
        if self.inputs.is_empty() {
            return Err(WalletError::ValidationError(
                "Transaction needs at least one input".to_string(),
            ));
        }
        if self.outputs.is_empty() {
            return Err(WalletError::ValidationError(
                "Transaction needs at least one output".to_string(),
            ));
        }
        for input in &self.inputs {
            validator.validate_txid(&input.txid)?;
        }
        for (address, amount) in &self.outputs {
            validator.validate_address(address)?;
            validator.validate_amount(*amount)?;
        }
        validator.validate_fee(self.fee)?;
        if let Some(change) = &self.change_address {
            validator.validate_address(change)?;
        }
        Ok(())
    }
}

/// Expected reasons a transaction is refused. Values are the UI's i18n keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionFailure {
    MinimumConfirmations,
    Mismatch,
    OutputTooLarge,
    ChangeTooLarge,
}

impl TransactionFailure {
    pub fn key(&self) -> &'static str {
        match self {
            TransactionFailure::MinimumConfirmations => "NOTIFICATIONS.MINIMUMCONFIRMATIONS",
            TransactionFailure::Mismatch => "NOTIFICATIONS.TRANSACTIONMISMATCH",
            TransactionFailure::OutputTooLarge => "NOTIFICATIONS.TRANSACTIONOUTPUTTOOLARGE",
            TransactionFailure::ChangeTooLarge => "NOTIFICATIONS.TRANSACTIONCHANGETOOLARGE",
        }
    }
}

impl fmt::Display for TransactionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    Sent,
    Rejected(TransactionFailure),
    /// The supplied fee does not cover the raw size; retry with `new_fee`.
    FeeTooLow { new_fee: Decimal },
}

impl TransactionOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, TransactionOutcome::Sent)
    }
}

#[derive(Serialize)]
struct OutcomeWire {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    #[serde(rename = "newFee", skip_serializing_if = "Option::is_none")]
    new_fee: Option<Value>,
}

impl Serialize for TransactionOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            TransactionOutcome::Sent => OutcomeWire {
                success: true,
                error: None,
                new_fee: None,
            },
            TransactionOutcome::Rejected(reason) => OutcomeWire {
                success: false,
                error: Some(reason.key()),
                new_fee: None,
            },
            TransactionOutcome::FeeTooLow { new_fee } => OutcomeWire {
                success: false,
                error: None,
                new_fee: Some(
                    amount::amount_to_json_number(*new_fee)
                        .map_err(<S::Error as serde::ser::Error>::custom)?,
                ),
            },
        };
        wire.serialize(serializer)
    }
}

/// Result of the guarded part of the flow.
enum Prepared {
    Signed(String),
    Stop(TransactionOutcome),
}

pub struct TransactionBuilder {
    rpc: Arc<dyn DaemonRpc>,
    guard: EncryptionGuard,
    validator: InputValidator,
    fee_per_kb: Decimal,
}

impl TransactionBuilder {
    pub fn new(
        rpc: Arc<dyn DaemonRpc>,
        guard: EncryptionGuard,
        fee_per_kb: Decimal,
    ) -> WalletResult<Self> {
        Ok(Self {
            rpc,
            guard,
            validator: InputValidator::new()?,
            fee_per_kb,
        })
    }

    pub fn fee_per_kb(&self) -> Decimal {
        self.fee_per_kb
    }

    /// Fee for a raw transaction of `raw_hex_len` characters.
    pub fn estimate_fee(&self, raw_hex_len: usize) -> Decimal {
        let started_kb = raw_hex_len.div_ceil(1000);
        Decimal::from(started_kb as u64).saturating_mul(self.fee_per_kb)
    }

    pub async fn create_transaction(
        &self,
        request: TransactionRequest,
        gate: VersionGate,
    ) -> WalletResult<TransactionOutcome> {
        request.validate(&self.validator)?;

        let unspents = accounts::list_unspent(self.rpc.as_ref(), &gate).await?;

        let mut sending_balance = Decimal::ZERO;
        for input in &request.inputs {
            let Some(unspent) = unspents
                .iter()
                .find(|u| u.txid == input.txid && u.vout == input.vout)
            else {
                log::info!("Input {}:{} is not a live unspent output", input.txid, input.vout);
                return Ok(TransactionOutcome::Rejected(TransactionFailure::Mismatch));
            };
            if unspent.confirmations < 1 {
                return Ok(TransactionOutcome::Rejected(
                    TransactionFailure::MinimumConfirmations,
                ));
            }
            let Some(total) = sending_balance.checked_add(unspent.amount) else {
                return Ok(TransactionOutcome::Rejected(TransactionFailure::Mismatch));
            };
            sending_balance = total;
        }

        let mut receiving_balance = request.fee;
        let mut unsafe_outputs = false;
        for amount in request.outputs.values() {
            // Beyond Decimal range no encoding can carry it, whatever the daemon.
            let Some(total) = receiving_balance.checked_add(*amount) else {
                return Ok(TransactionOutcome::Rejected(
                    TransactionFailure::OutputTooLarge,
                ));
            };
            receiving_balance = total;
            unsafe_outputs |= amount::is_unsafe_amount(*amount);
        }

        if unsafe_outputs && !gate.supports_precise_raw_transaction() {
            return Ok(TransactionOutcome::Rejected(
                TransactionFailure::OutputTooLarge,
            ));
        }

        if sending_balance < receiving_balance {
            return Ok(TransactionOutcome::Rejected(TransactionFailure::Mismatch));
        }

        let change = sending_balance - receiving_balance;

        let prepared = self
            .guard
            .with_unlocked(
                request.passphrase.as_ref(),
                self.guard.session_secs(),
                || self.prepare_signed(&request, change, unsafe_outputs, gate),
            )
            .await?;

        match prepared {
            Prepared::Stop(outcome) => Ok(outcome),
            Prepared::Signed(hex) => {
                let txid = self.rpc.call("sendrawtransaction", json!([hex])).await?;
                log::info!("Broadcast transaction {}", txid);
                Ok(TransactionOutcome::Sent)
            }
        }
    }

    /// Change routing, raw assembly, fee check and signing. Runs unlocked.
    async fn prepare_signed(
        &self,
        request: &TransactionRequest,
        change: Decimal,
        mut unsafe_outputs: bool,
        gate: VersionGate,
    ) -> WalletResult<Prepared> {
        let mut outputs = request.outputs.clone();

        if change > Decimal::ZERO {
            let change_address = match &request.change_address {
                Some(address) => address.clone(),
                None => self.new_change_address().await?,
            };
            let routed = outputs.entry(change_address).or_insert(Decimal::ZERO);
            *routed = match routed.checked_add(change) {
                Some(total) => total,
                None => {
                    return Ok(Prepared::Stop(TransactionOutcome::Rejected(
                        TransactionFailure::ChangeTooLarge,
                    )))
                }
            };

            if amount::is_unsafe_amount(*routed) {
                unsafe_outputs = true;
                if !gate.supports_precise_raw_transaction() {
                    return Ok(Prepared::Stop(TransactionOutcome::Rejected(
                        TransactionFailure::ChangeTooLarge,
                    )));
                }
            }
        }

        let inputs = serde_json::to_value(&request.inputs)?;
        let raw = if unsafe_outputs {
            let mut encoded = Map::new();
            for (address, amount) in &outputs {
                encoded.insert(address.clone(), Value::String(amount::satoshi_string(*amount)?));
            }
            self.rpc
                .call("createpreciserawtransaction", json!([inputs, encoded]))
                .await?
        } else {
            let mut encoded = Map::new();
            for (address, amount) in &outputs {
                encoded.insert(address.clone(), amount::amount_to_json_number(*amount)?);
            }
            self.rpc
                .call("createrawtransaction", json!([inputs, encoded]))
                .await?
        };
        let raw = raw.as_str().ok_or_else(|| {
            WalletError::InvalidResponse("raw transaction is not a hex string".to_string())
        })?;

        let estimated = self.estimate_fee(raw.len());
        if estimated > request.fee {
            log::info!(
                "Fee {} too low for {} byte raw transaction, need {}",
                request.fee,
                raw.len() / 2,
                estimated
            );
            return Ok(Prepared::Stop(TransactionOutcome::FeeTooLow {
                new_fee: estimated,
            }));
        }

        let signed = self
            .rpc
            .call("signrawtransaction", json!([raw]))
            .await?;
        let hex = signed
            .get("hex")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                WalletError::InvalidResponse("signrawtransaction returned no hex".to_string())
            })?;
        if signed.get("complete").and_then(Value::as_bool) == Some(false) {
            log::warn!("signrawtransaction reported an incomplete signature set");
        }
        Ok(Prepared::Signed(hex.to_string()))
    }

    async fn new_change_address(&self) -> WalletResult<String> {
        let address = self.rpc.call("getnewaddress", json!([CHANGE_LABEL])).await?;
        address
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WalletError::InvalidResponse("getnewaddress returned no address".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::EncryptionStatus;
    use crate::test_support::{rpc_error, ScriptedDaemon};
    use crate::version::DaemonVersion;

    const DEST: &str = "LPmZkaWkvGpKCWzZXDLmLqDGWtmqmkJDTk";
    const CHANGE: &str = "LYx3hCwpWc1X8LSmTZ5sWXaCchYNtVMhzp";

    fn dec(text: &str) -> Decimal {
        Decimal::from_str_exact(text).unwrap()
    }

    fn txid(n: u8) -> String {
        format!("{:02x}", n).repeat(32)
    }

    fn new_gate() -> VersionGate {
        VersionGate::new(Some(DaemonVersion::new(3, 4, 0, 0)))
    }

    fn old_gate() -> VersionGate {
        VersionGate::new(Some(DaemonVersion::new(3, 3, 0, 0)))
    }

    fn unspent(n: u8, value: &str, confirmations: i64) -> Value {
        json!({
            "txid": txid(n),
            "vout": 0,
            "address": DEST,
            "amount": value.parse::<f64>().unwrap(),
            "rawamount": amount::satoshi_string(dec(value)).unwrap(),
            "confirmations": confirmations,
            "scriptPubKey": "76a914"
        })
    }

    fn daemon(unspents: Value, raw_hex_len: usize) -> ScriptedDaemon {
        ScriptedDaemon::new()
            .returning("listunspent", unspents)
            .returning("getnewaddress", json!(CHANGE))
            .returning("createrawtransaction", json!("0".repeat(raw_hex_len)))
            .returning("createpreciserawtransaction", json!("0".repeat(raw_hex_len)))
            .returning("signrawtransaction", json!({ "hex": "signedhex", "complete": true }))
            .returning("sendrawtransaction", json!(txid(9)))
            .returning("walletpassphrase", Value::Null)
            .returning("walletlock", Value::Null)
    }

    fn builder(daemon: ScriptedDaemon) -> (TransactionBuilder, EncryptionGuard, Arc<ScriptedDaemon>) {
        let daemon = Arc::new(daemon);
        let guard = EncryptionGuard::new(daemon.clone(), 31_000_000);
        let builder = TransactionBuilder::new(daemon.clone(), guard.clone(), default_fee_per_kb())
            .unwrap();
        (builder, guard, daemon)
    }

    fn request(inputs: &[u8], outputs: &[(&str, &str)], fee: &str) -> TransactionRequest {
        TransactionRequest {
            inputs: inputs
                .iter()
                .map(|n| OutPoint { txid: txid(*n), vout: 0 })
                .collect(),
            outputs: outputs
                .iter()
                .map(|(a, v)| (a.to_string(), dec(v)))
                .collect(),
            fee: dec(fee),
            passphrase: None,
            change_address: None,
        }
    }

    #[tokio::test]
    async fn change_goes_to_fresh_change_address() {
        let (builder, _, daemon) = builder(daemon(json!([unspent(1, "10", 6)]), 600));
        let outcome = builder
            .create_transaction(request(&[1], &[(DEST, "6.9999")], "0.0001"), new_gate())
            .await
            .unwrap();

        assert_eq!(outcome, TransactionOutcome::Sent);
        assert_eq!(daemon.calls_to("getnewaddress"), vec![json!(["(change)"])]);
        let raw = daemon.calls_to("createrawtransaction");
        assert_eq!(raw[0][1][CHANGE], json!(3));
        assert_eq!(raw[0][1][DEST], json!(6.9999));
        assert_eq!(raw[0][0], json!([{ "txid": txid(1), "vout": 0 }]));
        assert_eq!(daemon.calls_to("sendrawtransaction"), vec![json!(["signedhex"])]);
    }

    #[tokio::test]
    async fn change_merges_into_existing_output() {
        let (builder, _, daemon) = builder(daemon(json!([unspent(1, "10", 6)]), 600));
        let mut req = request(&[1], &[(DEST, "4"), (CHANGE, "1")], "0.0001");
        req.change_address = Some(CHANGE.to_string());

        let outcome = builder.create_transaction(req, new_gate()).await.unwrap();
        assert!(outcome.is_sent());
        assert!(daemon.calls_to("getnewaddress").is_empty());
        let raw = daemon.calls_to("createrawtransaction");
        assert_eq!(raw[0][1][CHANGE], json!(5.9999));
    }

    #[tokio::test]
    async fn unknown_input_is_a_mismatch() {
        let (builder, _, daemon) = builder(daemon(json!([unspent(1, "10", 6)]), 600));
        let outcome = builder
            .create_transaction(request(&[2], &[(DEST, "1")], "0.0001"), new_gate())
            .await
            .unwrap();
        assert_eq!(outcome, TransactionOutcome::Rejected(TransactionFailure::Mismatch));
        assert_eq!(daemon.methods(), vec!["listunspent"]);
    }

    #[tokio::test]
    async fn unconfirmed_input_needs_confirmations() {
        let (builder, _, _) = builder(daemon(json!([unspent(1, "10", 0)]), 600));
        let outcome = builder
            .create_transaction(request(&[1], &[(DEST, "1")], "0.0001"), new_gate())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransactionOutcome::Rejected(TransactionFailure::MinimumConfirmations)
        );
    }

    #[tokio::test]
    async fn insufficient_inputs_are_a_mismatch() {
        let (builder, _, daemon) =
            builder(daemon(json!([unspent(1, "1", 6), unspent(2, "2", 6)]), 600));
        let outcome = builder
            .create_transaction(request(&[1, 2], &[(DEST, "3")], "0.0001"), new_gate())
            .await
            .unwrap();
        assert_eq!(outcome, TransactionOutcome::Rejected(TransactionFailure::Mismatch));
        assert!(daemon.calls_to("createrawtransaction").is_empty());
    }

    #[tokio::test]
    async fn oversized_output_on_old_daemon_is_refused() {
        let (builder, _, daemon) = builder(daemon(json!([unspent(1, "100000000", 6)]), 600));
        let outcome = builder
            .create_transaction(request(&[1], &[(DEST, "90071993")], "0.0001"), old_gate())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransactionOutcome::Rejected(TransactionFailure::OutputTooLarge)
        );
        assert!(daemon.calls_to("createrawtransaction").is_empty());
        assert!(daemon.calls_to("createpreciserawtransaction").is_empty());
    }

    #[tokio::test]
    async fn oversized_output_uses_precise_call_on_new_daemon() {
        let (builder, _, daemon) = builder(daemon(json!([unspent(1, "100000000", 6)]), 600));
        let outcome = builder
            .create_transaction(request(&[1], &[(DEST, "90071993")], "0.0001"), new_gate())
            .await
            .unwrap();
        assert!(outcome.is_sent());
        assert!(daemon.calls_to("createrawtransaction").is_empty());
        let precise = daemon.calls_to("createpreciserawtransaction");
        assert_eq!(precise[0][1][DEST], json!("9007199300000000"));
        assert_eq!(precise[0][1][CHANGE], json!("992800699990000"));
    }

    #[tokio::test]
    async fn oversized_change_on_old_daemon_is_refused_and_restored() {
        let (builder, guard, daemon) = builder(daemon(json!([unspent(1, "100000000", 6)]), 600));
        guard.observe_status(EncryptionStatus::Locked);
        let mut req = request(&[1], &[(DEST, "1")], "0.0001");
        req.passphrase = Some(SecretString::from("pw".to_string()));

        let outcome = builder.create_transaction(req, old_gate()).await.unwrap();
        assert_eq!(
            outcome,
            TransactionOutcome::Rejected(TransactionFailure::ChangeTooLarge)
        );
        assert_eq!(
            daemon.methods(),
            vec!["listunspent", "walletpassphrase", "getnewaddress", "walletlock"]
        );
        assert!(!guard.state().transiently_unlocked);
    }

    #[tokio::test]
    async fn low_fee_returns_estimate_without_signing() {
        let (builder, _, daemon) = builder(daemon(json!([unspent(1, "10", 6)]), 2500));
        let outcome = builder
            .create_transaction(request(&[1], &[(DEST, "5")], "0.0001"), new_gate())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransactionOutcome::FeeTooLow {
                new_fee: dec("0.0003")
            }
        );
        assert!(daemon.calls_to("signrawtransaction").is_empty());
        assert!(daemon.calls_to("sendrawtransaction").is_empty());
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({ "success": false, "newFee": 0.0003 })
        );
    }

    #[tokio::test]
    async fn low_fee_with_passphrase_relocks_before_returning() {
        let (builder, guard, daemon) = builder(daemon(json!([unspent(1, "10", 6)]), 2500));
        guard.observe_status(EncryptionStatus::Locked);
        let mut req = request(&[1], &[(DEST, "5")], "0.0001");
        req.passphrase = Some(SecretString::from("pw".to_string()));

        let outcome = builder.create_transaction(req, new_gate()).await.unwrap();
        assert_eq!(
            outcome,
            TransactionOutcome::FeeTooLow {
                new_fee: dec("0.0003")
            }
        );
        assert_eq!(
            daemon.methods(),
            vec![
                "listunspent",
                "walletpassphrase",
                "getnewaddress",
                "createrawtransaction",
                "walletlock"
            ]
        );
        assert!(!guard.state().transiently_unlocked);
    }

    #[tokio::test]
    async fn outputs_beyond_decimal_range_are_refused() {
        let (builder, _, daemon) = builder(daemon(json!([unspent(1, "10", 6)]), 600));
        let huge = "50000000000000000000000000000";
        let outcome = builder
            .create_transaction(
                request(&[1], &[(DEST, huge), (CHANGE, huge)], "0.0001"),
                new_gate(),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransactionOutcome::Rejected(TransactionFailure::OutputTooLarge)
        );
        assert_eq!(daemon.methods(), vec!["listunspent"]);
    }

    #[test]
    fn fee_estimate_saturates() {
        let daemon = Arc::new(ScriptedDaemon::new());
        let guard = EncryptionGuard::new(daemon.clone(), 31_000_000);
        let builder = TransactionBuilder::new(daemon, guard, Decimal::MAX).unwrap();
        assert_eq!(builder.estimate_fee(5000), Decimal::MAX);
    }

    #[tokio::test]
    async fn signing_happens_unlocked_and_broadcast_after_restore() {
        let (builder, guard, daemon) = builder(daemon(json!([unspent(1, "10", 6)]), 600));
        guard.observe_status(EncryptionStatus::Locked);
        let mut req = request(&[1], &[(DEST, "9.9999")], "0.0001");
        req.passphrase = Some(SecretString::from("pw".to_string()));

        let outcome = builder.create_transaction(req, new_gate()).await.unwrap();
        assert!(outcome.is_sent());
        assert_eq!(
            daemon.methods(),
            vec![
                "listunspent",
                "walletpassphrase",
                "createrawtransaction",
                "signrawtransaction",
                "walletlock",
                "sendrawtransaction"
            ]
        );
        assert_eq!(
            daemon.calls_to("walletpassphrase"),
            vec![json!(["pw", 31_000_000, false])]
        );
    }

    #[tokio::test]
    async fn daemon_error_restores_before_propagating() {
        let daemon = daemon(json!([unspent(1, "10", 6)]), 600)
            .on("signrawtransaction", |_| Err(rpc_error(-13, "Please enter the wallet passphrase")));
        let (builder, guard, daemon) = builder(daemon);
        guard.observe_status(EncryptionStatus::Locked);
        let mut req = request(&[1], &[(DEST, "5")], "0.0001");
        req.passphrase = Some(SecretString::from("pw".to_string()));

        let err = builder.create_transaction(req, new_gate()).await.unwrap_err();
        assert_eq!(err.rpc_code(), Some(-13));
        assert_eq!(daemon.methods().last().map(String::as_str), Some("walletlock"));
        assert!(daemon.calls_to("sendrawtransaction").is_empty());
    }

    #[tokio::test]
    async fn malformed_request_makes_no_daemon_calls() {
        let (builder, _, daemon) = builder(daemon(json!([]), 600));
        let mut req = request(&[1], &[(DEST, "1")], "0.0001");
        req.inputs[0].txid = "not-a-txid".to_string();
        let err = builder.create_transaction(req, new_gate()).await.unwrap_err();
        assert!(matches!(err, WalletError::ValidationError(_)));
        assert!(daemon.calls().is_empty());
    }

    #[test]
    fn fee_estimate_rounds_up_to_started_kilobytes() {
        let (builder, _, _) = builder(ScriptedDaemon::new());
        assert_eq!(builder.estimate_fee(0), Decimal::ZERO);
        assert_eq!(builder.estimate_fee(1), dec("0.0001"));
        assert_eq!(builder.estimate_fee(1000), dec("0.0001"));
        assert_eq!(builder.estimate_fee(1001), dec("0.0002"));
    }

    #[test]
    fn request_from_positional_params() {
        let req = TransactionRequest::from_params(&[
            json!([{ "txid": txid(1), "vout": 2, "amount": 5 }]),
            json!({ DEST: "1.5", CHANGE: 0.25 }),
            json!(0.0001),
            json!(""),
            json!(CHANGE),
        ])
        .unwrap();
        assert_eq!(req.inputs, vec![OutPoint { txid: txid(1), vout: 2 }]);
        assert_eq!(req.outputs[DEST], dec("1.5"));
        assert_eq!(req.outputs[CHANGE], dec("0.25"));
        assert_eq!(req.fee, dec("0.0001"));
        assert!(req.passphrase.is_none());
        assert_eq!(req.change_address.as_deref(), Some(CHANGE));
    }

    #[test]
    fn outcome_wire_format() {
        assert_eq!(
            serde_json::to_value(TransactionOutcome::Sent).unwrap(),
            json!({ "success": true })
        );
        assert_eq!(
            serde_json::to_value(TransactionOutcome::Rejected(TransactionFailure::Mismatch))
                .unwrap(),
            json!({ "success": false, "error": "NOTIFICATIONS.TRANSACTIONMISMATCH" })
        );
    }
}
