//! Account aggregation.
//!
//! Reconciles `listreceivedbyaddress`, `listaddressgroupings` and
//! `listunspent` into accounts of address buckets, each holding the unspent
//! outputs paid to it. The three lists are fetched independently, so a wallet
//! change between the calls can show up as a transient mismatch.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::amount::{self, deserialize_amount};
use crate::correlator::DaemonRpc;
use crate::errors::{WalletError, WalletResult};
use crate::version::VersionGate;

/// Label the daemon gives to generated change addresses.
pub const CHANGE_LABEL: &str = "(change)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentOutput {
    pub address: String,
    pub txid: String,
    pub vout: u32,
    pub amount: Decimal,
    pub confirmations: i64,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: String,
    pub locked: bool,
    pub block_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawUnspent {
    txid: String,
    vout: u32,
    #[serde(default)]
    address: String,
    #[serde(default)]
    amount: Option<Value>,
    #[serde(default)]
    rawamount: Option<Value>,
    #[serde(default)]
    confirmations: i64,
    #[serde(default, rename = "scriptPubKey")]
    script_pub_key: String,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    time: Option<i64>,
}

impl TryFrom<RawUnspent> for UnspentOutput {
    type Error = WalletError;

    fn try_from(raw: RawUnspent) -> Result<Self, Self::Error> {
        let amount = amount::preferred_amount(raw.rawamount.as_ref(), raw.amount.as_ref())?;
        Ok(UnspentOutput {
            address: raw.address,
            txid: raw.txid,
            vout: raw.vout,
            amount,
            confirmations: raw.confirmations,
            script_pub_key: raw.script_pub_key,
            locked: raw.locked,
            block_time: raw.time,
        })
    }
}

/// Parse a `listunspent` result.
pub fn parse_unspents(value: Value) -> WalletResult<Vec<UnspentOutput>> {
    let raw: Vec<RawUnspent> = serde_json::from_value(value)
        .map_err(|e| WalletError::InvalidResponse(format!("listunspent: {}", e)))?;
    raw.into_iter().map(UnspentOutput::try_from).collect()
}

/// Fetch live unspent outputs using the call signature the daemon supports.
pub async fn list_unspent(
    rpc: &dyn DaemonRpc,
    gate: &VersionGate,
) -> WalletResult<Vec<UnspentOutput>> {
    let result = rpc.call("listunspent", gate.list_unspent_params()).await?;
    parse_unspents(result)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReceivedByAddress {
    pub address: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub amount: Decimal,
}

/// One `[address, amount, label?]` entry of an address grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedAddress {
    pub address: String,
    pub amount: Decimal,
    pub account: Option<String>,
}

fn parse_groupings(value: Value) -> WalletResult<Vec<Vec<GroupedAddress>>> {
    let groups: Vec<Vec<Vec<Value>>> = serde_json::from_value(value)
        .map_err(|e| WalletError::InvalidResponse(format!("listaddressgroupings: {}", e)))?;
    groups
        .into_iter()
        .map(|group| {
            group
                .into_iter()
                .map(|entry| {
                    let address = entry
                        .first()
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            WalletError::InvalidResponse(
                                "address grouping entry without address".to_string(),
                            )
                        })?
                        .to_string();
                    let amount = match entry.get(1) {
                        Some(value) => amount::parse_amount(value)?,
                        None => Decimal::ZERO,
                    };
                    let account = entry.get(2).and_then(Value::as_str).map(str::to_string);
                    Ok(GroupedAddress {
                        address,
                        amount,
                        account,
                    })
                })
                .collect()
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressEntry {
    pub address: String,
    pub account: Option<String>,
    pub amount: Decimal,
    pub unspents: Vec<UnspentOutput>,
}

impl AddressEntry {
    fn new(address: String, account: Option<String>, amount: Decimal) -> Self {
        Self {
            address,
            account,
            amount,
            unspents: Vec::new(),
        }
    }

    fn is_change(&self) -> bool {
        self.account.as_deref() == Some(CHANGE_LABEL)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Account {
    pub addresses: Vec<AddressEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountSnapshot {
    pub accounts: Vec<Account>,
    /// Unspent outputs whose address matched no account.
    pub orphaned: Vec<UnspentOutput>,
}

/// Build accounts from the three daemon lists.
pub fn assemble_accounts(
    mut received: Vec<ReceivedByAddress>,
    groupings: Vec<Vec<GroupedAddress>>,
    unspents: Vec<UnspentOutput>,
) -> AccountSnapshot {
    let mut accounts: Vec<Account> = Vec::new();

    for group in groupings {
        let mut grouped = Account::default();
        for entry in group {
            let labelled = entry.account.as_deref().is_some_and(|l| !l.is_empty());
            let bucket = AddressEntry::new(entry.address, entry.account, entry.amount);
            // A labelled address past the first is a separate account sharing the group.
            if labelled && !grouped.addresses.is_empty() {
                accounts.push(Account {
                    addresses: vec![bucket.clone()],
                });
            } else {
                grouped.addresses.push(bucket.clone());
            }
            if let Some(index) = received.iter().position(|r| r.address == bucket.address) {
                received.remove(index);
            }
        }
        accounts.push(grouped);
    }

    for leftover in received {
        let empty_change =
            leftover.account.as_deref() == Some(CHANGE_LABEL) && leftover.amount.is_zero();
        if empty_change {
            continue;
        }
        accounts.push(Account {
            addresses: vec![AddressEntry::new(
                leftover.address,
                leftover.account,
                leftover.amount,
            )],
        });
    }

    let mut orphaned = Vec::new();
    'outputs: for unspent in unspents {
        for account in accounts.iter_mut() {
            if let Some(bucket) = account
                .addresses
                .iter_mut()
                .find(|bucket| bucket.address == unspent.address)
            {
                bucket.unspents.push(unspent);
                continue 'outputs;
            }
        }
        log::warn!(
            "Unspent output {}:{} for unknown address {} dropped from accounts",
            unspent.txid,
            unspent.vout,
            unspent.address
        );
        orphaned.push(unspent);
    }

    for account in accounts.iter_mut() {
        account
            .addresses
            .retain(|bucket| !(bucket.is_change() && bucket.unspents.is_empty()));
    }
    accounts.retain(|account| !account.addresses.is_empty());

    AccountSnapshot { accounts, orphaned }
}

/// Fetch and assemble the wallet's accounts.
pub async fn get_accounts(rpc: &dyn DaemonRpc, gate: &VersionGate) -> WalletResult<AccountSnapshot> {
    let received = rpc.call("listreceivedbyaddress", json!([0, true])).await?;
    let received: Vec<ReceivedByAddress> = serde_json::from_value(received)
        .map_err(|e| WalletError::InvalidResponse(format!("listreceivedbyaddress: {}", e)))?;
    let groupings = parse_groupings(rpc.call("listaddressgroupings", json!([])).await?)?;
    let unspents = list_unspent(rpc, gate).await?;
    Ok(assemble_accounts(received, groupings, unspents))
}
