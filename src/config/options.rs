//! Operator options shared by every manager operation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ConfigError;

const DEFAULT_SSH_TIMEOUT_SECS: u64 = 5;
const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CONCURRENCY: usize = 5;

/// Options passed through to the cluster operators.
///
/// Empty `roles` and `nodes` mean "every role" and "every node".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorOptions {
    /// Only operate on instances of these roles.
    pub roles: Vec<String>,
    /// Only operate on these node ids.
    pub nodes: Vec<String>,
    /// Proceed even when some hosts are unreachable.
    pub force: bool,
    /// Timeout for establishing SSH sessions.
    pub ssh_timeout_secs: u64,
    /// Timeout for one operator call to settle.
    pub operation_timeout_secs: u64,
    /// Maximum hosts acted on at once by the operators.
    pub concurrency: usize,
}

impl Default for OperatorOptions {
    fn default() -> Self {
        Self {
            roles: Vec::new(),
            nodes: Vec::new(),
            force: false,
            ssh_timeout_secs: DEFAULT_SSH_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl OperatorOptions {
    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Whether an instance with `role` on `node` is selected by the filters.
    pub fn selects(&self, role: &str, node: &str) -> bool {
        (self.roles.is_empty() || self.roles.iter().any(|r| r == role))
            && (self.nodes.is_empty() || self.nodes.iter().any(|n| n == node))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConfig(
                "concurrency cannot be zero".into(),
            ));
        }
        if self.ssh_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "ssh_timeout_secs cannot be zero".into(),
            ));
        }
        if self.operation_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "operation_timeout_secs cannot be zero".into(),
            ));
        }
        Ok(())
    }
}
