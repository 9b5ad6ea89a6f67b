//! Error types for keyholder-proxy

use thiserror::Error;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame, sign-request body, or synthesized/peer failure.
    #[error("framing error: {0}")]
    Framing(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("policy error: {0}")]
    Policy(String),

    #[error("peer credential resolution failed: {0}")]
    PeerResolution(String),

    #[error("SSH key error: {0}")]
    SshKey(#[from] ssh_key::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("upstream agent unavailable: {0}")]
    UpstreamNotAvailable(String),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
