//! Declarative breaker setup, translated from
//! `original_source/lib/breaker/config.go`.

use std::time::Duration;

use thiserror::Error;

use crate::breaker::Settings;
use crate::registry::{no_break_for, set_breaker};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no name specified in breaker setting")]
    MissingName,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub name: String,
    pub enable: bool,
    pub max_requests: u32,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            enable: true,
            max_requests: 3,
            interval_secs: 5,
            timeout_secs: 10,
        }
    }
}

/// Installs every config entry into the global registry: disabled entries
/// get a passthrough breaker, enabled entries get a real one.
pub fn setup(configs: &[BreakerConfig]) -> Result<(), ConfigError> {
    for config in configs {
        if config.name.is_empty() {
            return Err(ConfigError::MissingName);
        }

        if !config.enable {
            no_break_for(config.name.clone());
            continue;
        }

        set_breaker(Settings {
            name: config.name.clone(),
            max_requests: config.max_requests,
            interval: Duration::from_secs(config.interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            ..Settings::default()
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BreakerError;
    use crate::registry::do_call;

    #[test]
    fn rejects_a_nameless_entry() {
        let configs = vec![BreakerConfig::default()];
        assert!(matches!(setup(&configs), Err(ConfigError::MissingName)));
    }

    #[test]
    fn disabled_entry_installs_a_passthrough() {
        let configs = vec![BreakerConfig {
            name: "config-disabled-1".into(),
            enable: false,
            ..Default::default()
        }];
        setup(&configs).unwrap();

        for _ in 0..10 {
            let _: Result<(), BreakerError<&str>> = do_call("config-disabled-1", || Err("boom"));
        }
        let result: Result<(), BreakerError<&str>> = do_call("config-disabled-1", || Err("boom"));
        assert!(matches!(result, Err(BreakerError::Inner("boom"))));
    }
}
