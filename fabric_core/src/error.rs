//! Configuration-surface errors (spec.md §7 "Configuration" kind):
//! surfaced at setup and treated as fatal by callers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required registry key")]
    MissingRegistryKey,

    #[error("empty hosts list")]
    EmptyHosts,

    #[error("empty user name")]
    EmptyUserName,

    #[error("empty password")]
    EmptyPassword,

    #[error("{field} must be non-empty")]
    MissingField { field: &'static str },
}

/// Registry/RPC hosts configuration, validated the way
/// `original_source/lib/etcd/config.go`'s `EtcdConf.Validate` does.
#[derive(Debug, Clone, Default)]
pub struct KvHostsConfig {
    pub hosts: Vec<String>,
    pub key: String,
    pub user_name: String,
    pub password: String,
}

impl KvHostsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::EmptyHosts);
        }
        if self.key.is_empty() {
            return Err(ConfigError::MissingRegistryKey);
        }
        if self.user_name.is_empty() {
            return Err(ConfigError::EmptyUserName);
        }
        if self.password.is_empty() {
            return Err(ConfigError::EmptyPassword);
        }
        Ok(())
    }
}
