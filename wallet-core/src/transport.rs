//! Message channel to the daemon-hosting process.
//!
//! The core never owns a socket to the daemon. It writes [`TransportCommand`]s
//! through a [`Transport`] and consumes a single stream of [`TransportEvent`]s.
//! Both are tagged JSON so the channel can cross a process boundary.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::{WalletError, WalletResult};
use crate::lifecycle::ClientStatus;

/// Outcome of a daemon call as reported by the host process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl RpcResult {
    pub fn ok(body: Value) -> Self {
        Self {
            success: true,
            body: Some(body),
            error: None,
        }
    }

    pub fn failed(body: Value) -> Self {
        Self {
            success: false,
            body: Some(body),
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    pub call_id: Uuid,
    pub method: String,
    pub result: RpcResult,
}

/// Inbound events from the host process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportEvent {
    ClientStatus {
        status: ClientStatus,
    },
    RpcReady {
        ready: bool,
        #[serde(default)]
        message: String,
    },
    RpcResponse(RpcResponse),
    ClientVersion {
        version: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCall {
    pub call_id: Uuid,
    pub method: String,
    pub params: Value,
}

/// Outbound commands to the host process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportCommand {
    Call(OutboundCall),
    Restart { args: Vec<String> },
}

/// Write side of the channel.
pub trait Transport: Send + Sync {
    fn send(&self, command: TransportCommand) -> WalletResult<()>;
}

/// In-process transport backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    commands: mpsc::UnboundedSender<TransportCommand>,
}

impl ChannelTransport {
    /// Create a transport and the receiver the host side reads commands from.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<TransportCommand>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        (Self { commands }, receiver)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, command: TransportCommand) -> WalletResult<()> {
        self.commands
            .send(command)
            .map_err(|_| WalletError::TransportError("Host channel closed".to_string()))
    }
}

/// Transport speaking newline-delimited JSON with a spawned host process.
///
/// Commands go to the child's stdin, events are read from its stdout.
pub struct ProcessTransport {
    commands: ChannelTransport,
    child: Child,
}

impl ProcessTransport {
    /// Spawn the host. Must be called from within a tokio runtime.
    pub fn spawn(
        program: &str,
        args: &[String],
    ) -> WalletResult<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                WalletError::TransportError(format!("Failed to spawn host '{}': {}", program, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| WalletError::TransportError("Host stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WalletError::TransportError("Host stdout unavailable".to_string()))?;

        let (commands, mut command_rx) = ChannelTransport::pair();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let mut line = match serde_json::to_string(&command) {
                    Ok(line) => line,
                    Err(e) => {
                        log::error!("Failed to encode host command: {}", e);
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    log::error!("Host write error: {}", e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    log::error!("Host flush error: {}", e);
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<TransportEvent>(&line) {
                            Ok(event) => {
                                if event_tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => log::warn!("Skipping malformed host event: {}", e),
                        }
                    }
                    Ok(None) => {
                        log::info!("Host closed its event stream");
                        break;
                    }
                    Err(e) => {
                        log::error!("Host read error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok((Self { commands, child }, event_rx))
    }

    pub async fn shutdown(mut self) -> WalletResult<()> {
        self.child.kill().await?;
        Ok(())
    }
}

impl Transport for ProcessTransport {
    fn send(&self, command: TransportCommand) -> WalletResult<()> {
        self.commands.send(command)
    }
}
