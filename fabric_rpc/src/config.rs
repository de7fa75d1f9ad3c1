//! Client/server configuration surface, translated from
//! `original_source/lib/rpcx/config.go`.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Configures an [`crate::client::RpcClient`]. Either `server` (a single
/// fixed address) or `registry_prefix` (watch-and-balance over a live
/// registry) must be set; `server` takes precedence when both are.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub registry_prefix: Option<String>,
    #[serde(default)]
    pub block_dial: bool,
    /// Per-call deadline in milliseconds; `0` means
    /// [`fabric_core::DEFAULT_RPC_DEADLINE`].
    #[serde(default)]
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: None,
            registry_prefix: None,
            block_dial: false,
            timeout_ms: 0,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> std::time::Duration {
        if self.timeout_ms == 0 {
            fabric_core::DEFAULT_RPC_DEADLINE
        } else {
            std::time::Duration::from_millis(self.timeout_ms)
        }
    }
}

/// Configures an [`crate::server::RpcServer`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_on: String,
    #[serde(default)]
    pub registry_key: Option<String>,
    #[serde(default = "default_true")]
    pub strict_control: bool,
    #[serde(default)]
    pub timeout_ms: u64,
}

impl ServerConfig {
    pub fn has_registry(&self) -> bool {
        self.registry_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    pub fn timeout(&self) -> std::time::Duration {
        if self.timeout_ms == 0 {
            fabric_core::DEFAULT_RPC_DEADLINE
        } else {
            std::time::Duration::from_millis(self.timeout_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_falls_back_to_default_deadline() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout(), fabric_core::DEFAULT_RPC_DEADLINE);
    }

    #[test]
    fn server_config_reports_whether_registry_is_configured() {
        let mut config = ServerConfig {
            listen_on: "127.0.0.1:8080".into(),
            registry_key: None,
            strict_control: true,
            timeout_ms: 0,
        };
        assert!(!config.has_registry());

        config.registry_key = Some("svc.user".into());
        assert!(config.has_registry());
    }
}
