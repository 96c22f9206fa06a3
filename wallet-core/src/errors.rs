use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Daemon error code for "wallet is already unlocked".
pub const RPC_WALLET_ALREADY_UNLOCKED: i64 = -17;
/// Daemon error code for "wallet is not encrypted".
pub const RPC_WALLET_WRONG_ENC_STATE: i64 = -15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalletError {
    // Daemon errors
    Rpc {
        code: Option<i64>,
        message: String,
        payload: Value,
    },
    Cancelled,
    NotReady,

    // Transport errors
    TransportError(String),
    InvalidResponse(String),

    // Storage errors
    StorageError(String),
    FileNotFound(String),
    PermissionDenied(String),

    // Validation errors
    ValidationError(String),
    InvalidAddress(String),
    InvalidAmount(String),

    // Application errors
    NotInitialized,
    NotFound(String),

    // Generic errors
    Unknown(String),
}

impl WalletError {
    /// Build an RPC error from the failed `result` payload of a response event.
    ///
    /// The payload is kept verbatim; the code and message are lifted from
    /// `body.error` when the daemon supplied one.
    pub fn from_rpc_payload(payload: Value) -> Self {
        let error = payload.pointer("/body/error").or_else(|| payload.get("error"));
        let code = error.and_then(|e| e.get("code")).and_then(Value::as_i64);
        let message = error
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("daemon call failed")
            .to_string();
        WalletError::Rpc {
            code,
            message,
            payload,
        }
    }

    /// The daemon error code, if this is an RPC error that carried one.
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            WalletError::Rpc { code, .. } => *code,
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WalletError::Cancelled)
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WalletError::Rpc {
                code: Some(code),
                message,
                ..
            } => write!(f, "RPC error {}: {}", code, message),
            WalletError::Rpc { message, .. } => write!(f, "RPC error: {}", message),
            WalletError::Cancelled => write!(f, "RPC call cancelled"),
            WalletError::NotReady => write!(f, "Daemon is not ready"),

            WalletError::TransportError(msg) => write!(f, "Transport error: {}", msg),
            WalletError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),

            WalletError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            WalletError::FileNotFound(msg) => write!(f, "File not found: {}", msg),
            WalletError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),

            WalletError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            WalletError::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
            WalletError::InvalidAmount(msg) => write!(f, "Invalid amount: {}", msg),

            WalletError::NotInitialized => write!(f, "Wallet not initialized"),
            WalletError::NotFound(msg) => write!(f, "Not found: {}", msg),

            WalletError::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}

pub type WalletResult<T> = Result<T, WalletError>;

// Conversion helpers
impl From<std::io::Error> for WalletError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => WalletError::FileNotFound(error.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                WalletError::PermissionDenied(error.to_string())
            }
            _ => WalletError::StorageError(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(error: serde_json::Error) -> Self {
        WalletError::ValidationError(format!("JSON error: {}", error))
    }
}
