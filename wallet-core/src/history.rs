//! Wallet transaction history.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::amount;
use crate::correlator::DaemonRpc;
use crate::errors::{WalletError, WalletResult};

pub const SELF_PAYMENT_CATEGORY: &str = "Payment To Self";

const DEFAULT_PAGE_SIZE: u64 = 10;

/// One ledger entry as presented to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub tx_id: String,
    pub address: Option<String>,
    pub account: Option<String>,
    pub category: String,
    pub amount: Decimal,
    pub fee: Option<Decimal>,
    pub confirmations: i64,
    pub vout: Option<u32>,
    pub time: Option<i64>,
    pub blockhash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LedgerEntry {
    txid: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    amount: Option<Value>,
    #[serde(default)]
    rawamount: Option<Value>,
    #[serde(default, deserialize_with = "amount::deserialize_optional_amount")]
    fee: Option<Decimal>,
    #[serde(default)]
    confirmations: i64,
    #[serde(default)]
    vout: Option<u32>,
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    blockhash: Option<String>,
}

impl TryFrom<LedgerEntry> for Transaction {
    type Error = WalletError;

    fn try_from(entry: LedgerEntry) -> Result<Self, Self::Error> {
        Ok(Transaction {
            amount: amount::preferred_amount(entry.rawamount.as_ref(), entry.amount.as_ref())?,
            tx_id: entry.txid,
            address: entry.address,
            account: entry.account,
            category: entry.category,
            fee: entry.fee,
            confirmations: entry.confirmations,
            vout: entry.vout,
            time: entry.time,
            blockhash: entry.blockhash,
        })
    }
}

fn is_self_payment(a: &Transaction, b: &Transaction) -> bool {
    a.tx_id == b.tx_id && a.address == b.address && a.amount.abs() == b.amount.abs()
}

/// Collapse send/receive pairs of one payment to an own address.
///
/// Each entry absorbs at most the first later entry it pairs with.
pub fn merge_self_payments(entries: Vec<Transaction>) -> Vec<Transaction> {
    let mut merged: Vec<Transaction> = Vec::with_capacity(entries.len());
    let mut pending: Vec<Option<Transaction>> = entries.into_iter().map(Some).collect();

    for index in 0..pending.len() {
        let Some(mut entry) = pending[index].take() else {
            continue;
        };
        let partner = pending[index + 1..]
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|other| is_self_payment(&entry, other)));
        if let Some(slot) = partner {
            if let Some(other) = slot.take() {
                entry.amount = entry.amount.abs();
                entry.category = SELF_PAYMENT_CATEGORY.to_string();
                entry.fee = entry.fee.or(other.fee);
            }
        }
        merged.push(entry);
    }
    merged
}

/// Fetch a page of history: `params` is `[count?, from?]`.
pub async fn get_transactions(rpc: &dyn DaemonRpc, params: &[Value]) -> WalletResult<Vec<Transaction>> {
    let count = params
        .first()
        .and_then(Value::as_u64)
        .filter(|c| *c > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let from = params.get(1).and_then(Value::as_u64).unwrap_or(0);

    let result = rpc.call("listtransactions", json!(["*", count, from])).await?;
    let entries: Vec<LedgerEntry> = serde_json::from_value(result)
        .map_err(|e| WalletError::InvalidResponse(format!("listtransactions: {}", e)))?;
    let transactions = entries
        .into_iter()
        .map(Transaction::try_from)
        .collect::<WalletResult<Vec<_>>>()?;
    Ok(merge_self_payments(transactions))
}
