//! Scripted daemon used by unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::correlator::DaemonRpc;
use crate::errors::{WalletError, WalletResult};

type Handler = Box<dyn Fn(&Value) -> WalletResult<Value> + Send + Sync>;

/// Answers calls from per-method handlers and records every call made.
#[derive(Default)]
pub struct ScriptedDaemon {
    handlers: HashMap<String, Handler>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> WalletResult<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(method.to_string(), Box::new(handler));
        self
    }

    pub fn returning(self, method: &str, result: Value) -> Self {
        self.on(method, move |_| Ok(result.clone()))
    }

    pub fn failing(self, method: &str, code: i64, message: &str) -> Self {
        let message = message.to_string();
        self.on(method, move |_| Err(rpc_error(code, &message)))
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

pub fn rpc_error(code: i64, message: &str) -> WalletError {
    WalletError::from_rpc_payload(json!({
        "success": false,
        "body": { "result": null, "error": { "code": code, "message": message } }
    }))
}

#[async_trait]
impl DaemonRpc for ScriptedDaemon {
    async fn call(&self, method: &str, params: Value) -> WalletResult<Value> {
        self.calls.lock().push((method.to_string(), params.clone()));
        match self.handlers.get(method) {
            Some(handler) => handler(&params),
            None => Err(rpc_error(-32601, &format!("Method not found: {}", method))),
        }
    }
}
