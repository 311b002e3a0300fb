//! Error taxonomy for goldload.
//!
//! Policy failures are not errors: a non-zero agent exit is recorded on the
//! [`PolicyRecord`](crate::policy::PolicyRecord) and surfaced in the run
//! summary. The variants here are the conditions that stop a run.

use std::path::PathBuf;

/// goldload errors.
#[derive(Debug, thiserror::Error)]
pub enum GoldloadError {
    #[error("invalid policy id: {0:?}")]
    InvalidPolicyId(String),

    #[error("duplicate policy id in run: {0}")]
    DuplicatePolicyId(String),

    #[error("failed to open {what} at {}: {source}", path.display())]
    Open {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {what}: {source}")]
    Write {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch management agent {}: {source}", binary.display())]
    AgentSpawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("management agent timed out after {timeout_secs}s")]
    AgentTimeout { timeout_secs: u64 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for goldload operations.
pub type Result<T> = std::result::Result<T, GoldloadError>;
