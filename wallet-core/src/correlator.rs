//! Call correlation over the shared host channel.
//!
//! Every outbound daemon call gets a fresh UUID and a pending record holding a
//! oneshot completion. The matching `rpcResponse` event resolves the record;
//! a lifecycle cancellation rejects all of them at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::errors::{WalletError, WalletResult};
use crate::transport::{OutboundCall, RpcResponse, Transport, TransportCommand};

/// Request/response access to the daemon.
///
/// Implementations return the `result` member of the daemon's JSON-RPC reply
/// (`Value::Null` when absent) and surface daemon error bodies as
/// [`WalletError::Rpc`].
#[async_trait]
pub trait DaemonRpc: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> WalletResult<Value>;
}

#[derive(Debug)]
struct PendingCall {
    method: String,
    issued_at: Instant,
    completion: oneshot::Sender<WalletResult<Value>>,
}

pub struct CallCorrelator {
    transport: Arc<dyn Transport>,
    pending: Mutex<HashMap<Uuid, PendingCall>>,
    accepting: AtomicBool,
    veto_when_not_ready: bool,
}

impl CallCorrelator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            pending: Mutex::new(HashMap::new()),
            accepting: AtomicBool::new(false),
            veto_when_not_ready: true,
        }
    }

    /// Allow or refuse calls issued before the daemon reported readiness.
    pub fn with_readiness_veto(mut self, enabled: bool) -> Self {
        self.veto_when_not_ready = enabled;
        self
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Issue a call and wait for the raw response body.
    pub async fn request(&self, method: &str, params: Value) -> WalletResult<Value> {
        if self.veto_when_not_ready && !self.is_accepting() {
            return Err(WalletError::NotReady);
        }

        let (completion, receiver) = oneshot::channel();
        let call_id = {
            let mut pending = self.pending.lock();
            let mut call_id = Uuid::new_v4();
            while pending.contains_key(&call_id) {
                call_id = Uuid::new_v4();
            }
            pending.insert(
                call_id,
                PendingCall {
                    method: method.to_string(),
                    issued_at: Instant::now(),
                    completion,
                },
            );
            call_id
        };

        let command = TransportCommand::Call(OutboundCall {
            call_id,
            method: method.to_string(),
            params,
        });
        if let Err(e) = self.transport.send(command) {
            self.pending.lock().remove(&call_id);
            return Err(e);
        }

        receiver.await.map_err(|_| WalletError::Cancelled)?
    }

    /// Complete the pending call matching `response`.
    ///
    /// Returns false when no call with that id is pending.
    pub fn resolve(&self, response: RpcResponse) -> bool {
        let Some(call) = self.pending.lock().remove(&response.call_id) else {
            log::debug!(
                "Ignoring response for unknown call {} ({})",
                response.call_id,
                response.method
            );
            return false;
        };

        log::debug!(
            "CallServer response {} in {}ms",
            call.method,
            call.issued_at.elapsed().as_millis()
        );

        let outcome = if response.result.success {
            Ok(response.result.body.unwrap_or(Value::Null))
        } else {
            let payload = serde_json::to_value(&response.result).unwrap_or(Value::Null);
            Err(WalletError::from_rpc_payload(payload))
        };
        // The caller may have stopped waiting; that is not an error here.
        let _ = call.completion.send(outcome);
        true
    }

    /// Reject every pending call with [`WalletError::Cancelled`].
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PendingCall> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, call)| call).collect()
        };
        if !drained.is_empty() {
            log::warn!("Cancelling {} pending RPC calls", drained.len());
        }
        let count = drained.len();
        for call in drained {
            let _ = call.completion.send(Err(WalletError::Cancelled));
        }
        count
    }
}

#[async_trait]
impl DaemonRpc for CallCorrelator {
    async fn call(&self, method: &str, params: Value) -> WalletResult<Value> {
        let body = self.request(method, params).await?;
        match body.get("error") {
            Some(error) if !error.is_null() => Err(WalletError::from_rpc_payload(json!({
                "success": false,
                "body": body,
            }))),
            _ => Ok(body.get("result").cloned().unwrap_or(Value::Null)),
        }
    }
}
