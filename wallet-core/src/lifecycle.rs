use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::correlator::CallCorrelator;
use crate::errors::WalletResult;
use crate::transport::{Transport, TransportCommand};

/// Daemon process status as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClientStatus {
    Stopped,
    Starting,
    Ready,
    ClosedUnexpected,
    #[serde(alias = "INVALIDMASTERNODECONFIG")]
    InvalidConfig,
    ShuttingDown,
    #[serde(other)]
    Unknown,
}

/// A blocking restart-or-exit question for the user. Fields are i18n keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title_key: &'static str,
    pub body_key: &'static str,
    pub primary_key: &'static str,
    pub secondary_key: &'static str,
}

impl Alert {
    pub const CLIENT_STOPPED: Alert = Alert {
        title_key: "COMPONENTS.PROMPT.CLIENTSTOPPEDTITLE",
        body_key: "COMPONENTS.PROMPT.CLIENTSTOPPEDINFO",
        primary_key: "COMPONENTS.PROMPT.CLIENTSTOPPEDBUTTONSTART",
        secondary_key: "COMPONENTS.PROMPT.CLIENTSTOPPEDBUTTONEXIT",
    };

    pub const CLIENT_CLOSED_UNEXPECTED: Alert = Alert {
        title_key: "COMPONENTS.PROMPT.CLIENTCLOSEDUNEXPECTEDTITLE",
        body_key: "COMPONENTS.PROMPT.CLIENTCLOSEDUNEXPECTEDINFO",
        primary_key: "COMPONENTS.PROMPT.CLIENTCLOSEDUNEXPECTEDBUTTONSTART",
        secondary_key: "COMPONENTS.PROMPT.CLIENTSTOPPEDBUTTONEXIT",
    };

    pub const CLIENT_INVALID_CONFIG: Alert = Alert {
        title_key: "COMPONENTS.PROMPT.CLIENTINVALIDCONFIGTITLE",
        body_key: "COMPONENTS.PROMPT.CLIENTINVALIDCONFIGINFO",
        primary_key: "COMPONENTS.PROMPT.CLIENTSTOPPEDBUTTONSTART",
        secondary_key: "COMPONENTS.PROMPT.CLIENTSTOPPEDBUTTONEXIT",
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    /// Restart the daemon.
    Primary,
    /// Exit the application.
    Secondary,
}

/// Modal collaborator owned by the presentation layer.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn alert(&self, alert: &Alert) -> PromptChoice;
}

/// Control over the hosting application process.
pub trait HostProcess: Send + Sync {
    fn quit(&self);
}

/// What the tracker did in response to a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    Ignored,
    Cancelled,
    Restarted,
    Exited,
}

/// Interprets daemon status transitions and drives recovery.
pub struct LifecycleTracker {
    correlator: Arc<CallCorrelator>,
    transport: Arc<dyn Transport>,
    prompter: Arc<dyn Prompter>,
    host: Arc<dyn HostProcess>,
    restart_args: Vec<String>,
    status: RwLock<Option<ClientStatus>>,
    warmup_message: RwLock<String>,
}

impl LifecycleTracker {
    pub fn new(
        correlator: Arc<CallCorrelator>,
        transport: Arc<dyn Transport>,
        prompter: Arc<dyn Prompter>,
        host: Arc<dyn HostProcess>,
        restart_args: Vec<String>,
    ) -> Self {
        Self {
            correlator,
            transport,
            prompter,
            host,
            restart_args,
            status: RwLock::new(None),
            warmup_message: RwLock::new(String::new()),
        }
    }

    pub fn status(&self) -> Option<ClientStatus> {
        *self.status.read()
    }

    pub fn is_ready(&self) -> bool {
        self.correlator.is_accepting()
    }

    pub fn warmup_message(&self) -> String {
        self.warmup_message.read().clone()
    }

    /// Apply a readiness event. Pending calls are left alone.
    pub fn on_rpc_ready(&self, ready: bool, message: String) {
        log::info!("Daemon RPC ready={} ({})", ready, message);
        self.correlator.set_accepting(ready);
        *self.warmup_message.write() = message;
    }

    /// Apply a status event, prompting the user when the daemon went away.
    pub async fn on_client_status(&self, status: ClientStatus) -> LifecycleOutcome {
        let was_ready = self.correlator.is_accepting();
        *self.status.write() = Some(status);
        log::info!("Daemon status changed to {:?}", status);

        let alert = match status {
            ClientStatus::ClosedUnexpected => Alert::CLIENT_CLOSED_UNEXPECTED,
            ClientStatus::Stopped if was_ready => Alert::CLIENT_STOPPED,
            ClientStatus::InvalidConfig => Alert::CLIENT_INVALID_CONFIG,
            ClientStatus::ShuttingDown => {
                self.stop_client();
                return LifecycleOutcome::Cancelled;
            }
            _ => return LifecycleOutcome::Ignored,
        };

        self.stop_client();
        match self.prompter.alert(&alert).await {
            PromptChoice::Primary => match self.restart_client(&self.restart_args) {
                Ok(()) => LifecycleOutcome::Restarted,
                Err(e) => {
                    log::error!("Failed to restart daemon: {}", e);
                    self.host.quit();
                    LifecycleOutcome::Exited
                }
            },
            PromptChoice::Secondary => {
                log::info!("User chose to exit after {:?}", status);
                self.host.quit();
                LifecycleOutcome::Exited
            }
        }
    }

    /// Stop accepting calls and cancel everything in flight.
    pub fn stop_client(&self) {
        self.correlator.set_accepting(false);
        self.correlator.cancel_all();
    }

    /// Ask the host to restart the daemon with the given command line.
    pub fn restart_client(&self, args: &[String]) -> WalletResult<()> {
        self.stop_client();
        log::info!("Restarting daemon with {:?}", args);
        self.transport.send(TransportCommand::Restart {
            args: args.to_vec(),
        })
    }
}
