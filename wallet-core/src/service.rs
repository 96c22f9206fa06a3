//! Request surface for the presentation layer.
//!
//! [`RpcService`] wires the correlator, lifecycle tracker, encryption guard and
//! transaction builder together. The UI calls [`RpcService::request_data`] with
//! a method tag and positional params; [`RpcService::run`] drains the host's
//! event stream.

use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::accounts;
use crate::config_store::{SessionConfig, WalletConfig};
use crate::correlator::{CallCorrelator, DaemonRpc};
use crate::encryption::{EncryptionGuard, EncryptionStatus};
use crate::errors::{WalletError, WalletResult};
use crate::history;
use crate::lifecycle::{HostProcess, LifecycleOutcome, LifecycleTracker, Prompter};
use crate::transaction::{TransactionBuilder, TransactionRequest};
use crate::transport::{Transport, TransportEvent};
use crate::validation::InputValidator;
use crate::version::{DaemonVersion, VersionGate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RpcMethod {
    Encrypt,
    ChangePassphrase,
    GetWallet,
    GetAccounts,
    GetTransactions,
    GetStaking,
    UpdateLabel,
    NewAddress,
    Unlock,
    Lock,
    LockUnspent,
    CreateTransaction,
    BackupWallet,
    GetLatestBlock,
    MasternodeStart,
    MasternodeStartAlias,
    MasternodeStartMany,
    MasternodeStatus,
    MasternodeStatusAll,
    MasternodeListConf,
    SignMessage,
    VerifyMessage,
    Peers,
    AddressBookList,
    AddressBookAdd,
    AddressBookRemove,
    GetBlock,
    GetBlockByNumber,
    GetTransaction,
}

impl FromStr for RpcMethod {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_uppercase();
        serde_json::from_value(Value::String(tag))
            .map_err(|_| WalletError::ValidationError(format!("Unknown request method '{}'", s)))
    }
}

fn string_param(params: &[Value], index: usize) -> Option<&str> {
    params.get(index).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub struct RpcService {
    correlator: Arc<CallCorrelator>,
    lifecycle: LifecycleTracker,
    guard: EncryptionGuard,
    builder: TransactionBuilder,
    validator: InputValidator,
    gate: RwLock<VersionGate>,
    session: SessionConfig,
}

impl RpcService {
    pub fn new(
        transport: Arc<dyn Transport>,
        prompter: Arc<dyn Prompter>,
        host: Arc<dyn HostProcess>,
        config: &WalletConfig,
    ) -> WalletResult<Self> {
        let correlator = Arc::new(CallCorrelator::new(transport.clone()));
        Self::with_correlator(correlator, transport, prompter, host, config)
    }

    pub fn with_correlator(
        correlator: Arc<CallCorrelator>,
        transport: Arc<dyn Transport>,
        prompter: Arc<dyn Prompter>,
        host: Arc<dyn HostProcess>,
        config: &WalletConfig,
    ) -> WalletResult<Self> {
        let rpc: Arc<dyn DaemonRpc> = correlator.clone();
        let guard = EncryptionGuard::new(rpc.clone(), config.session.unlock_timeout_secs);
        let builder =
            TransactionBuilder::new(rpc, guard.clone(), config.transactions.fee_per_kb)?;
        let lifecycle = LifecycleTracker::new(
            correlator.clone(),
            transport,
            prompter,
            host,
            config.daemon.restart_args.clone(),
        );

        Ok(Self {
            correlator,
            lifecycle,
            guard,
            builder,
            validator: InputValidator::new()?,
            gate: RwLock::new(VersionGate::default()),
            session: config.session.clone(),
        })
    }

    pub fn lifecycle(&self) -> &LifecycleTracker {
        &self.lifecycle
    }

    pub fn encryption(&self) -> &EncryptionGuard {
        &self.guard
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.is_ready()
    }

    pub fn version_gate(&self) -> VersionGate {
        *self.gate.read()
    }

    pub fn set_daemon_version(&self, version: Option<DaemonVersion>) {
        log::info!(
            "Daemon version {}",
            version.map(|v| v.to_string()).unwrap_or_else(|| "unknown".into())
        );
        *self.gate.write() = VersionGate::new(version);
    }

    pub fn stop_client(&self) {
        self.lifecycle.stop_client();
    }

    pub fn restart_client(&self, args: &[String]) -> WalletResult<()> {
        self.lifecycle.restart_client(args)
    }

    /// Consume host events until the stream closes or the user exits.
    pub async fn run(&self, mut events: UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::RpcResponse(response) => {
                    self.correlator.resolve(response);
                }
                TransportEvent::RpcReady { ready, message } => {
                    self.lifecycle.on_rpc_ready(ready, message);
                }
                TransportEvent::ClientVersion { version } => match version.parse() {
                    Ok(parsed) => self.set_daemon_version(Some(parsed)),
                    Err(e) => {
                        log::warn!("Unparseable daemon version '{}': {}", version, e);
                        self.set_daemon_version(None);
                    }
                },
                TransportEvent::ClientStatus { status } => {
                    if self.lifecycle.on_client_status(status).await == LifecycleOutcome::Exited {
                        break;
                    }
                }
            }
        }
        log::info!("Host event stream finished");
        self.correlator.set_accepting(false);
        self.correlator.cancel_all();
    }

    /// Dispatch one UI request. Returns the daemon `result`, or `{}` when absent.
    pub async fn request_data(&self, method: RpcMethod, params: Vec<Value>) -> WalletResult<Value> {
        let data = match method {
            RpcMethod::Encrypt => self.pass("encryptwallet", params).await?,
            RpcMethod::ChangePassphrase => self.pass("walletpassphrasechange", params).await?,
            RpcMethod::GetWallet => self.get_wallet_info().await?,
            RpcMethod::GetAccounts => {
                let gate = self.version_gate();
                let snapshot = accounts::get_accounts(self.correlator.as_ref(), &gate).await?;
                serde_json::to_value(snapshot.accounts)?
            }
            RpcMethod::GetTransactions => {
                let page = history::get_transactions(self.correlator.as_ref(), &params).await?;
                serde_json::to_value(page)?
            }
            RpcMethod::GetStaking => self.pass("getstakinginfo", vec![]).await?,
            RpcMethod::UpdateLabel => {
                if let Some(label) = params.get(1).and_then(Value::as_str) {
                    self.validator.validate_label(label)?;
                }
                self.pass("setaccount", params).await?
            }
            RpcMethod::NewAddress => self.pass("getaccountaddress", params).await?,
            RpcMethod::Unlock => self.unlock(&params).await?,
            RpcMethod::Lock => {
                self.guard.lock_wallet().await?;
                json!({ "success": true })
            }
            RpcMethod::LockUnspent => self.pass("lockunspent", params).await?,
            RpcMethod::CreateTransaction => {
                let request = TransactionRequest::from_params(&params)?;
                let outcome = self
                    .builder
                    .create_transaction(request, self.version_gate())
                    .await?;
                serde_json::to_value(outcome)?
            }
            RpcMethod::BackupWallet => self.pass("backupwallet", params).await?,
            RpcMethod::GetLatestBlock => self.get_latest_block().await?,
            RpcMethod::MasternodeStart => self.masternode("start", params).await?,
            RpcMethod::MasternodeStartAlias => self.masternode("start-alias", params).await?,
            RpcMethod::MasternodeStartMany => self.masternode("start-many", params).await?,
            RpcMethod::MasternodeStatus => {
                let init = self.pass("masternode", vec![json!("isInit")]).await?;
                let initialised = init.as_bool().unwrap_or(!init.is_null());
                json!({ "initRequired": !initialised })
            }
            RpcMethod::MasternodeStatusAll => self.masternode("status-all", vec![]).await?,
            RpcMethod::MasternodeListConf => self.masternode("list-conf", vec![]).await?,
            RpcMethod::SignMessage => self.sign_message(&params).await?,
            RpcMethod::VerifyMessage => self.pass("verifymessage", params).await?,
            RpcMethod::Peers => self.pass("getpeerinfo", vec![]).await?,
            RpcMethod::AddressBookList => self.pass("listaddressbook", vec![]).await?,
            RpcMethod::AddressBookAdd => {
                if let Some(label) = params.get(1).and_then(Value::as_str) {
                    self.validator.validate_label(label)?;
                }
                self.pass("addressbookadd", params).await?
            }
            RpcMethod::AddressBookRemove => self.pass("addressbookremove", params).await?,
            RpcMethod::GetBlock => self.pass("getblock", params).await?,
            RpcMethod::GetBlockByNumber => self.pass("getblockbynumber", params).await?,
            RpcMethod::GetTransaction => self.pass("gettransaction", params).await?,
        };

        Ok(if data.is_null() { json!({}) } else { data })
    }

    async fn pass(&self, method: &str, params: Vec<Value>) -> WalletResult<Value> {
        self.correlator.call(method, Value::Array(params)).await
    }

    async fn masternode(&self, command: &str, params: Vec<Value>) -> WalletResult<Value> {
        let mut full = Vec::with_capacity(params.len() + 1);
        full.push(json!(command));
        full.extend(params);
        self.pass("masternode", full).await
    }

    async fn get_wallet_info(&self) -> WalletResult<Value> {
        let info = self.pass("getinfo", vec![]).await?;
        if let Some(status) = info.get("encryption_status").and_then(Value::as_str) {
            match status.parse::<EncryptionStatus>() {
                Ok(status) => self.guard.observe_status(status),
                Err(e) => log::warn!("{}", e),
            }
        }
        Ok(info)
    }

    async fn get_latest_block(&self) -> WalletResult<Value> {
        let hash = self.pass("getbestblockhash", vec![]).await?;
        let block = self.pass("getblock", vec![hash]).await?;
        Ok(json!({
            "height": block.get("height").cloned().unwrap_or(json!(0)),
            "time": block.get("time").cloned().unwrap_or(json!(0)),
        }))
    }

    async fn unlock(&self, params: &[Value]) -> WalletResult<Value> {
        let passphrase = string_param(params, 0).ok_or_else(|| {
            WalletError::ValidationError("Unlock requires a passphrase".to_string())
        })?;
        let staking_only = params.get(1).and_then(Value::as_bool).unwrap_or(false);
        self.guard
            .unlock_wallet(
                &SecretString::from(passphrase.to_string()),
                self.session.unlock_timeout_secs,
                staking_only,
            )
            .await
    }

    async fn sign_message(&self, params: &[Value]) -> WalletResult<Value> {
        let address = string_param(params, 0).ok_or_else(|| {
            WalletError::ValidationError("Missing address to sign with".to_string())
        })?;
        self.validator.validate_address(address)?;
        let message = params.get(1).cloned().unwrap_or_else(|| json!(""));
        let passphrase = string_param(params, 2).map(|p| SecretString::from(p.to_string()));

        self.guard
            .with_unlocked(passphrase.as_ref(), self.session.message_unlock_secs, || {
                self.correlator.call("signmessage", json!([address, message]))
            })
            .await
    }
}
