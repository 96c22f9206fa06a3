//! Daemon version gate.
//!
//! Daemon releases are versioned with dotted numeric components ("3.4.0.0").
//! Features the transaction engine branches on are keyed to fixed releases.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::errors::WalletError;

/// First release accepting satoshi strings in `createpreciserawtransaction`.
pub const PRECISE_RAW_TRANSACTION: DaemonVersion = DaemonVersion::const_new([3, 3, 1, 0]);

/// First release whose `listunspent` takes the watch-only config argument.
pub const WATCH_ONLY_UNSPENT: DaemonVersion = DaemonVersion::const_new([3, 4, 0, 0]);

const MAX_COMPONENTS: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DaemonVersion {
    components: [u32; MAX_COMPONENTS],
}

impl DaemonVersion {
    const fn const_new(components: [u32; MAX_COMPONENTS]) -> Self {
        Self { components }
    }

    pub fn new(major: u32, minor: u32, patch: u32, build: u32) -> Self {
        Self::const_new([major, minor, patch, build])
    }

    pub fn components(&self) -> [u32; MAX_COMPONENTS] {
        self.components
    }

    pub fn at_least(&self, threshold: &DaemonVersion) -> bool {
        self >= threshold
    }
}

impl FromStr for DaemonVersion {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches(|c: char| c == 'v' || c == 'V');
        // Pre-release and build suffixes ("3.4.0.0-rc1") are not significant here.
        let numeric = trimmed
            .split(|c: char| c == '-' || c == '+')
            .next()
            .unwrap_or_default();
        if numeric.is_empty() {
            return Err(WalletError::ValidationError(format!(
                "Empty daemon version '{}'",
                s
            )));
        }

        let mut components = [0u32; MAX_COMPONENTS];
        for (index, part) in numeric.split('.').enumerate() {
            if index >= MAX_COMPONENTS {
                return Err(WalletError::ValidationError(format!(
                    "Daemon version '{}' has too many components",
                    s
                )));
            }
            components[index] = part.parse().map_err(|_| {
                WalletError::ValidationError(format!("Invalid daemon version '{}'", s))
            })?;
        }
        Ok(Self { components })
    }
}

impl fmt::Display for DaemonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, patch, build] = self.components;
        write!(f, "{}.{}.{}.{}", major, minor, patch, build)
    }
}

/// Feature gate over the connected daemon's version.
///
/// An unknown version is treated as older than every threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionGate {
    version: Option<DaemonVersion>,
}

impl VersionGate {
    pub fn new(version: Option<DaemonVersion>) -> Self {
        Self { version }
    }

    pub fn version(&self) -> Option<DaemonVersion> {
        self.version
    }

    fn reaches(&self, threshold: &DaemonVersion) -> bool {
        self.version
            .map(|version| version.at_least(threshold))
            .unwrap_or(false)
    }

    pub fn supports_precise_raw_transaction(&self) -> bool {
        self.reaches(&PRECISE_RAW_TRANSACTION)
    }

    pub fn supports_watch_only_unspent(&self) -> bool {
        self.reaches(&WATCH_ONLY_UNSPENT)
    }

    /// Parameters for `listunspent` matching the daemon's signature.
    pub fn list_unspent_params(&self) -> Value {
        if self.supports_watch_only_unspent() {
            json!([1, 9999999, [], 1, true])
        } else {
            json!([1, 9999999, [], true])
        }
    }
}
