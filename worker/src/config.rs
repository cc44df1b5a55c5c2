//! Configuration for the sync worker.

use std::env;
use std::time::Duration;

/// Worker configuration.
///
/// Defaults match what the server-side rate limits expect; `from_env` lets
/// an embedding application override them without recompiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// How many merge groups of the operation log view are considered at once
    pub log_view_limit: usize,
    /// Pause between convergence and deleting the log entry
    pub delete_delay: Duration,
    /// Pause before re-running an attempt that asked for a restart
    pub restart_delay: Duration,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self {
            log_view_limit: 10,
            delete_delay: Duration::from_secs(2),
            restart_delay: Duration::from_secs(1),
        }
    }

    /// Load overrides from environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load overrides through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(value) = lookup("PACKSYNC_LOG_VIEW_LIMIT") {
            config.log_view_limit = value
                .parse::<usize>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or(ConfigError::InvalidLogViewLimit(value))?;
        }

        if let Some(value) = lookup("PACKSYNC_DELETE_DELAY_MS") {
            config.delete_delay = parse_millis("PACKSYNC_DELETE_DELAY_MS", value)?;
        }

        if let Some(value) = lookup("PACKSYNC_RESTART_DELAY_MS") {
            config.restart_delay = parse_millis("PACKSYNC_RESTART_DELAY_MS", value)?;
        }

        Ok(config)
    }

    pub fn with_log_view_limit(mut self, limit: usize) -> Self {
        self.log_view_limit = limit;
        self
    }

    pub fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = delay;
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_millis(key: &'static str, value: String) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidDuration { key, value })
}

/// Configuration errors.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PACKSYNC_LOG_VIEW_LIMIT value: {0}")]
    InvalidLogViewLimit(String),

    #[error("Invalid {key} value: {value}")]
    InvalidDuration { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.log_view_limit, 10);
        assert_eq!(config.delete_delay, Duration::from_secs(2));
        assert_eq!(config.restart_delay, Duration::from_secs(1));
        assert_eq!(SyncConfig::from_lookup(lookup(&[])).unwrap(), config);
    }

    #[test]
    fn overrides_from_lookup() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("PACKSYNC_LOG_VIEW_LIMIT", "25"),
            ("PACKSYNC_DELETE_DELAY_MS", "0"),
            ("PACKSYNC_RESTART_DELAY_MS", "150"),
        ]))
        .unwrap();

        assert_eq!(config.log_view_limit, 25);
        assert_eq!(config.delete_delay, Duration::ZERO);
        assert_eq!(config.restart_delay, Duration::from_millis(150));
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(
            SyncConfig::from_lookup(lookup(&[("PACKSYNC_LOG_VIEW_LIMIT", "0")])),
            Err(ConfigError::InvalidLogViewLimit("0".into()))
        );
        assert_eq!(
            SyncConfig::from_lookup(lookup(&[("PACKSYNC_DELETE_DELAY_MS", "soon")])),
            Err(ConfigError::InvalidDuration {
                key: "PACKSYNC_DELETE_DELAY_MS",
                value: "soon".into()
            })
        );
    }

    #[test]
    fn builder() {
        let config = SyncConfig::new()
            .with_log_view_limit(3)
            .with_delete_delay(Duration::from_millis(10))
            .with_restart_delay(Duration::from_millis(20));
        assert_eq!(config.log_view_limit, 3);
        assert_eq!(config.delete_delay, Duration::from_millis(10));
        assert_eq!(config.restart_delay, Duration::from_millis(20));
    }
}
