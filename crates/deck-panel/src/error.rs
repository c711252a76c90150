use std::path::PathBuf;

use thiserror::Error;

/// Failures of the gateway process lifecycle.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Gateway is already running")]
    AlreadyRunning,

    #[error("Failed to launch {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Gateway exited with code {}", display_code(.code))]
    Exited { code: Option<i32> },

    #[error("Gateway failed to start: {0}")]
    NotReady(String),

    #[error("Gateway was stopped before it became ready")]
    Cancelled,

    #[error("Lost track of the gateway process")]
    Lost,
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "unknown (terminated by signal)".to_string())
}

/// Failures reading, validating or persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot determine the home directory")]
    NoHome,

    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file {} is not valid: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid config JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Config content is empty")]
    Empty,

    #[error("Failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Invalid provider id {0:?}: only letters, digits and hyphens are allowed")]
    InvalidProviderId(String),

    #[error("Provider {0} already exists")]
    DuplicateProvider(String),

    #[error("Provider {0} not found")]
    UnknownProvider(String),

    #[error("Provider {0} declares no models; a model id is required")]
    ModelRequired(String),

    #[error("Provider {provider} has no model named {model}")]
    UnknownModel { provider: String, model: String },

    #[error("{0} is already configured; remove it first")]
    ChannelExists(&'static str),

    #[error("{0}")]
    Invalid(String),
}

/// Anything a panel operation can fail with.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

pub type Result<T, E = PanelError> = std::result::Result<T, E>;
