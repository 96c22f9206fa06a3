//! Temporary wallet unlocking around privileged daemon calls.
//!
//! The wallet's last-known encryption status is refreshed from `getinfo`.
//! A privileged operation unlocks with the caller's passphrase, runs, and then
//! puts the wallet back the way it was: re-unlocked (fully or for staking) or
//! locked again. Restoration errors are logged and never replace the
//! operation's own result.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::correlator::DaemonRpc;
use crate::errors::{
    WalletError, WalletResult, RPC_WALLET_ALREADY_UNLOCKED, RPC_WALLET_WRONG_ENC_STATE,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionStatus {
    #[default]
    Unencrypted,
    Locked,
    Unlocked,
    LockedForStaking,
}

impl FromStr for EncryptionStatus {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unencrypted" => Ok(EncryptionStatus::Unencrypted),
            "Locked" => Ok(EncryptionStatus::Locked),
            "Unlocked" => Ok(EncryptionStatus::Unlocked),
            "LockedForStaking" => Ok(EncryptionStatus::LockedForStaking),
            other => Err(WalletError::InvalidResponse(format!(
                "Unknown encryption status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncryptionState {
    pub status: EncryptionStatus,
    pub transiently_unlocked: bool,
}

struct GuardInner {
    rpc: Arc<dyn DaemonRpc>,
    state: RwLock<EncryptionState>,
    privileged: Mutex<()>,
    session_secs: u64,
}

impl GuardInner {
    async fn unlock(
        &self,
        passphrase: &SecretString,
        timeout_secs: u64,
        staking_only: bool,
    ) -> WalletResult<Value> {
        let params = json!([passphrase.expose_secret(), timeout_secs, staking_only]);
        match self.rpc.call("walletpassphrase", params).await {
            Ok(result) => Ok(result),
            Err(err)
                if matches!(
                    err.rpc_code(),
                    Some(RPC_WALLET_ALREADY_UNLOCKED) | Some(RPC_WALLET_WRONG_ENC_STATE)
                ) =>
            {
                log::debug!("Unlock not needed: {}", err);
                Ok(json!({}))
            }
            Err(err) => Err(err),
        }
    }

    async fn restore(&self, passphrase: Option<&SecretString>) {
        let status = {
            let mut state = self.state.write();
            state.transiently_unlocked = false;
            state.status
        };
        let Some(passphrase) = passphrase else {
            return;
        };

        let outcome = match status {
            EncryptionStatus::LockedForStaking => self
                .unlock(passphrase, self.session_secs, true)
                .await
                .map(|_| ()),
            EncryptionStatus::Unlocked => self
                .unlock(passphrase, self.session_secs, false)
                .await
                .map(|_| ()),
            EncryptionStatus::Locked => self.rpc.call("walletlock", json!([])).await.map(|_| ()),
            EncryptionStatus::Unencrypted => Ok(()),
        };
        if let Err(e) = outcome {
            log::warn!("Failed to restore wallet encryption state {:?}: {}", status, e);
        }
    }
}

/// Restores encryption state if the privileged future is dropped mid-flight.
struct PendingRestore {
    inner: Arc<GuardInner>,
    passphrase: Option<SecretString>,
    armed: bool,
}

impl PendingRestore {
    /// The unlock was refused, so there is nothing to put back.
    fn disarm(mut self) {
        self.armed = false;
        self.inner.state.write().transiently_unlocked = false;
    }

    async fn run(mut self) {
        self.armed = false;
        let passphrase = self.passphrase.take();
        self.inner.restore(passphrase.as_ref()).await;
    }
}

impl Drop for PendingRestore {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let inner = self.inner.clone();
        let passphrase = self.passphrase.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _serial = inner.privileged.lock().await;
                    inner.restore(passphrase.as_ref()).await;
                });
            }
            Err(_) => log::warn!("Privileged call dropped outside a runtime; state not restored"),
        }
    }
}

/// Serialises "unlock → operate → restore" for one wallet.
#[derive(Clone)]
pub struct EncryptionGuard {
    inner: Arc<GuardInner>,
}

impl EncryptionGuard {
    /// `session_secs` is the long unlock window used for privileged calls and
    /// for restoring an unlocked wallet.
    pub fn new(rpc: Arc<dyn DaemonRpc>, session_secs: u64) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                rpc,
                state: RwLock::new(EncryptionState::default()),
                privileged: Mutex::new(()),
                session_secs,
            }),
        }
    }

    pub fn state(&self) -> EncryptionState {
        *self.inner.state.read()
    }

    pub fn session_secs(&self) -> u64 {
        self.inner.session_secs
    }

    /// Record the status the daemon reports. Ignored during a transient unlock,
    /// since the daemon would report the temporary state.
    pub fn observe_status(&self, status: EncryptionStatus) {
        let mut state = self.inner.state.write();
        if !state.transiently_unlocked {
            state.status = status;
        }
    }

    /// Unlock the wallet, treating "already unlocked" and "unencrypted" as success.
    pub async fn unlock_wallet(
        &self,
        passphrase: &SecretString,
        timeout_secs: u64,
        staking_only: bool,
    ) -> WalletResult<Value> {
        let _serial = self.inner.privileged.lock().await;
        self.inner.unlock(passphrase, timeout_secs, staking_only).await
    }

    pub async fn lock_wallet(&self) -> WalletResult<()> {
        let _serial = self.inner.privileged.lock().await;
        self.inner.rpc.call("walletlock", json!([])).await?;
        Ok(())
    }

    /// Run `operation` with the wallet unlocked for `unlock_secs` when a
    /// passphrase is given, restoring the previous state afterwards on every
    /// path.
    pub async fn with_unlocked<F, Fut, T>(
        &self,
        passphrase: Option<&SecretString>,
        unlock_secs: u64,
        operation: F,
    ) -> WalletResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = WalletResult<T>>,
    {
        let _serial = self.inner.privileged.lock().await;

        // Armed before the unlock so a drop mid-unlock still restores.
        let restore = PendingRestore {
            inner: self.inner.clone(),
            passphrase: passphrase.map(|p| SecretString::from(p.expose_secret().to_string())),
            armed: true,
        };

        if let Some(passphrase) = passphrase {
            self.inner.state.write().transiently_unlocked = true;
            if let Err(e) = self.inner.unlock(passphrase, unlock_secs, false).await {
                restore.disarm();
                return Err(e);
            }
        }

        let result = operation().await;
        restore.run().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedDaemon;

    const WINDOW: u64 = 31_000_000;

    fn guard(daemon: ScriptedDaemon) -> (EncryptionGuard, Arc<ScriptedDaemon>) {
        let daemon = Arc::new(daemon);
        (EncryptionGuard::new(daemon.clone(), WINDOW), daemon)
    }

    fn secret() -> SecretString {
        SecretString::from("correct horse".to_string())
    }

    fn unlocking_daemon() -> ScriptedDaemon {
        ScriptedDaemon::new()
            .returning("walletpassphrase", Value::Null)
            .returning("walletlock", Value::Null)
            .returning("signmessage", json!("H+sig"))
    }

    #[tokio::test]
    async fn already_unlocked_codes_are_success() {
        for code in [RPC_WALLET_ALREADY_UNLOCKED, RPC_WALLET_WRONG_ENC_STATE] {
            let (guard, _) = guard(ScriptedDaemon::new().failing("walletpassphrase", code, "x"));
            let result = guard.unlock_wallet(&secret(), 5, false).await.unwrap();
            assert_eq!(result, json!({}));
        }
    }

    #[tokio::test]
    async fn other_unlock_errors_propagate() {
        let (guard, _) = guard(ScriptedDaemon::new().failing(
            "walletpassphrase",
            -14,
            "The wallet passphrase entered was incorrect.",
        ));
        let err = guard.unlock_wallet(&secret(), 5, false).await.unwrap_err();
        assert_eq!(err.rpc_code(), Some(-14));
    }

    #[tokio::test]
    async fn staking_wallet_is_reunlocked_for_staking() {
        let (guard, daemon) = guard(unlocking_daemon());
        guard.observe_status(EncryptionStatus::LockedForStaking);
        let pass = secret();

        let signature = guard
            .with_unlocked(Some(&pass), 5, || async {
                daemon_sign(&guard).await
            })
            .await
            .unwrap();
        assert_eq!(signature, json!("H+sig"));

        let unlocks = daemon.calls_to("walletpassphrase");
        assert_eq!(unlocks.len(), 2);
        assert_eq!(unlocks[0], json!(["correct horse", 5, false]));
        assert_eq!(unlocks[1], json!(["correct horse", WINDOW, true]));
        assert!(!guard.state().transiently_unlocked);
    }

    async fn daemon_sign(guard: &EncryptionGuard) -> WalletResult<Value> {
        assert!(guard.state().transiently_unlocked);
        guard
            .inner
            .rpc
            .call("signmessage", json!(["LaddR", "hello"]))
            .await
    }

    #[tokio::test]
    async fn unlocked_wallet_is_reunlocked_fully_after_failure() {
        let (guard, daemon) = guard(unlocking_daemon());
        guard.observe_status(EncryptionStatus::Unlocked);
        let pass = secret();

        let err = guard
            .with_unlocked(Some(&pass), WINDOW, || async {
                Err::<(), _>(WalletError::InvalidResponse("boom".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidResponse(_)));
        let unlocks = daemon.calls_to("walletpassphrase");
        assert_eq!(unlocks.last().unwrap(), &json!(["correct horse", WINDOW, false]));
    }

    #[tokio::test]
    async fn locked_wallet_is_locked_again() {
        let (guard, daemon) = guard(unlocking_daemon());
        guard.observe_status(EncryptionStatus::Locked);
        let pass = secret();
        guard
            .with_unlocked(Some(&pass), WINDOW, || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(daemon.methods(), vec!["walletpassphrase", "walletlock"]);
    }

    #[tokio::test]
    async fn restore_failure_is_swallowed() {
        let daemon = ScriptedDaemon::new()
            .returning("walletpassphrase", Value::Null)
            .failing("walletlock", -1, "lock failed");
        let (guard, _) = guard(daemon);
        guard.observe_status(EncryptionStatus::Locked);
        let pass = secret();
        let value = guard
            .with_unlocked(Some(&pass), WINDOW, || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn no_passphrase_means_no_unlock_calls() {
        let (guard, daemon) = guard(unlocking_daemon());
        guard.observe_status(EncryptionStatus::Unlocked);
        guard
            .with_unlocked(None, WINDOW, || async { Ok(()) })
            .await
            .unwrap();
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn status_updates_ignored_while_transient() {
        let (guard, _) = guard(unlocking_daemon());
        guard.observe_status(EncryptionStatus::Locked);
        let pass = secret();
        guard
            .with_unlocked(Some(&pass), WINDOW, || async {
                guard.observe_status(EncryptionStatus::Unlocked);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(guard.state().status, EncryptionStatus::Locked);
    }

    #[tokio::test]
    async fn dropped_operation_still_restores() {
        let (guard, daemon) = guard(unlocking_daemon());
        guard.observe_status(EncryptionStatus::Locked);
        let pass = secret();
        {
            let pending = guard.with_unlocked(Some(&pass), WINDOW, || {
                std::future::pending::<WalletResult<()>>()
            });
            let _ = tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;
        }
        // The restore runs on a spawned task.
        for _ in 0..100 {
            if daemon.methods().contains(&"walletlock".to_string()) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(daemon.methods().contains(&"walletlock".to_string()));
        assert!(!guard.state().transiently_unlocked);
    }

    /// Records calls; `walletpassphrase` never answers.
    #[derive(Default)]
    struct StalledUnlock {
        calls: parking_lot::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl DaemonRpc for StalledUnlock {
        async fn call(&self, method: &str, _params: Value) -> WalletResult<Value> {
            self.calls.lock().push(method.to_string());
            if method == "walletpassphrase" {
                std::future::pending::<()>().await;
            }
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn dropped_during_unlock_still_relocks() {
        let daemon = Arc::new(StalledUnlock::default());
        let guard = EncryptionGuard::new(daemon.clone(), WINDOW);
        guard.observe_status(EncryptionStatus::Locked);
        let pass = secret();
        {
            let pending = guard.with_unlocked(Some(&pass), WINDOW, || async { Ok(()) });
            let _ = tokio::time::timeout(std::time::Duration::from_millis(20), pending).await;
        }
        for _ in 0..100 {
            if daemon.calls.lock().iter().any(|m| m == "walletlock") {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(*daemon.calls.lock(), vec!["walletpassphrase", "walletlock"]);
        assert!(!guard.state().transiently_unlocked);
        assert_eq!(guard.state().status, EncryptionStatus::Locked);
    }

    #[tokio::test]
    async fn refused_unlock_skips_restore() {
        let daemon = ScriptedDaemon::new()
            .failing("walletpassphrase", -14, "The wallet passphrase entered was incorrect.")
            .returning("walletlock", Value::Null);
        let (guard, daemon) = guard(daemon);
        guard.observe_status(EncryptionStatus::Locked);
        let pass = secret();
        let err = guard
            .with_unlocked(Some(&pass), WINDOW, || async { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(err.rpc_code(), Some(-14));
        tokio::task::yield_now().await;
        assert_eq!(daemon.methods(), vec!["walletpassphrase"]);
        assert!(!guard.state().transiently_unlocked);
    }

}
