//! Gate configuration.
//!
//! Polling cadence and side-effect toggles shared by every gate built from
//! the same [`crate::GateContext`].

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const ENV_POLL_INTERVAL_MS: &str = "CAPGATE_POLL_INTERVAL_MS";
const ENV_RESTORE_FOCUS: &str = "CAPGATE_RESTORE_FOCUS";

/// Configuration for gate polling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Interval between probe ticks while a flow is waiting (milliseconds).
    ///
    /// The first tick fires one full interval after the flow starts.
    pub poll_interval_ms: u64,

    /// Whether to bring the process back to the foreground once a waited-for
    /// capability is granted.
    pub restore_focus: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000, // 1 second
            restore_focus: true,
        }
    }
}

impl GateConfig {
    /// Parse a configuration from YAML text. Missing keys take defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()
    }

    /// Load a configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Build a configuration from `CAPGATE_*` environment variables over the
    /// defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    fn overlay_env(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            let parsed = value.trim().parse::<u64>();
            self.poll_interval_ms = parsed.map_err(|_| ConfigError::InvalidEnv {
                var: ENV_POLL_INTERVAL_MS,
                value,
            })?;
        }
        if let Some(value) = lookup(ENV_RESTORE_FOCUS) {
            self.restore_focus = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: ENV_RESTORE_FOCUS,
                        value,
                    })
                }
            };
        }
        self.validate()
    }

    /// Reject configurations the poll loop cannot run with.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(self)
    }

    /// Set the poll interval.
    pub fn poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    /// Enable or disable focus restoration.
    pub fn restore_focus(mut self, restore: bool) -> Self {
        self.restore_focus = restore;
        self
    }

    /// Get poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = GateConfig::default();
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.restore_focus);
    }

    #[test]
    fn test_builder_pattern() {
        let config = GateConfig::default()
            .poll_interval_ms(250)
            .restore_focus(false);

        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert!(!config.restore_focus);
    }

    #[test]
    fn test_yaml_partial_keys_take_defaults() {
        let config = GateConfig::from_yaml_str("poll_interval_ms: 500\n").unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert!(config.restore_focus);
    }

    #[test]
    fn test_yaml_zero_interval_rejected() {
        let err = GateConfig::from_yaml_str("poll_interval_ms: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInterval));
    }

    #[test]
    fn test_yaml_malformed() {
        let err = GateConfig::from_yaml_str("poll_interval_ms: [1, 2]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gates.yaml");
        std::fs::write(&path, "restore_focus: false\n").unwrap();

        let config = GateConfig::from_file(&path).unwrap();
        assert!(!config.restore_focus);
        assert_eq!(config.poll_interval_ms, 1000);

        let missing = GateConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }

    #[test]
    fn test_env_overlay() {
        let config = GateConfig::default()
            .overlay_env(env(&[
                (ENV_POLL_INTERVAL_MS, " 200 "),
                (ENV_RESTORE_FOCUS, "off"),
            ]))
            .unwrap();
        assert_eq!(config.poll_interval_ms, 200);
        assert!(!config.restore_focus);

        let untouched = GateConfig::default().overlay_env(env(&[])).unwrap();
        assert_eq!(untouched, GateConfig::default());
    }

    #[test]
    fn test_env_invalid_values() {
        let err = GateConfig::default()
            .overlay_env(env(&[(ENV_POLL_INTERVAL_MS, "fast")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { var: ENV_POLL_INTERVAL_MS, .. }
        ));

        let err = GateConfig::default()
            .overlay_env(env(&[(ENV_RESTORE_FOCUS, "maybe")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv { var: ENV_RESTORE_FOCUS, .. }
        ));
    }
}
