// lib.rs - Core library structure for the wallet client

pub mod accounts;
pub mod amount;
pub mod app_state;
pub mod config_store;
pub mod correlator;
pub mod encryption;
pub mod errors;
pub mod history;
pub mod lifecycle;
pub mod service;
pub mod transaction;
pub mod transport;
pub mod validation;
pub mod version;

#[cfg(test)]
mod test_support;

// Re-export common types
pub use accounts::{Account, AccountSnapshot, AddressEntry, UnspentOutput};
pub use app_state::WalletContext;
pub use config_store::{
    ConfigStore, DaemonConfig, SessionConfig, TransactionConfig, WalletConfig,
};
pub use correlator::{CallCorrelator, DaemonRpc};
pub use encryption::{EncryptionGuard, EncryptionState, EncryptionStatus};
pub use errors::{WalletError, WalletResult};
pub use history::Transaction;
pub use lifecycle::{
    Alert, ClientStatus, HostProcess, LifecycleOutcome, LifecycleTracker, PromptChoice, Prompter,
};
pub use service::{RpcMethod, RpcService};
pub use transaction::{
    OutPoint, TransactionBuilder, TransactionFailure, TransactionOutcome, TransactionRequest,
};
pub use transport::{
    ChannelTransport, OutboundCall, ProcessTransport, RpcResponse, RpcResult, Transport,
    TransportCommand, TransportEvent,
};
pub use validation::InputValidator;
pub use version::{DaemonVersion, VersionGate};
