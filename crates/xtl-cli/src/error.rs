//! CLI-specific error types and exit codes.

use thiserror::Error;

use xtl_core::ConfigError;
use xtl_core::services::{GlossaryError, RuleLoadError};
use xtl_proxy::SupervisorError;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Argument or input rejected.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Relay server error.
    #[error("Relay error: {0}")]
    Relay(String),
}

impl CliError {
    /// Map error to a sysexits-style exit code.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Arguments(_) => 2,
            Self::Io(_) => 74,
            Self::Config(_) => 78,
            Self::Relay(_) => 1,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<GlossaryError> for CliError {
    fn from(err: GlossaryError) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<RuleLoadError> for CliError {
    fn from(err: RuleLoadError) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<SupervisorError> for CliError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::InvalidConfig(e) => Self::Config(e.to_string()),
            other => Self::Relay(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
