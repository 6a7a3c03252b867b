//! Error types for the capability gate crate.
//!
//! The gate state machine itself has no failure modes: probes and requests
//! are trusted callbacks and a capability that is never granted is a steady
//! state, not an error. What can fail is loading configuration.

use thiserror::Error;

/// Errors raised while loading or validating [`crate::GateConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value '{value}' for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Poll interval must be greater than zero")]
    ZeroInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConfigError::InvalidEnv {
            var: "CAPGATE_POLL_INTERVAL_MS",
            value: "soon".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value 'soon' for CAPGATE_POLL_INTERVAL_MS"
        );
        assert_eq!(
            ConfigError::ZeroInterval.to_string(),
            "Poll interval must be greater than zero"
        );
    }
}
