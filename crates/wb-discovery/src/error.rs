//! Error types for the discovery bridge.

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced outside the message-processing path.
///
/// The engine itself never returns these for a single bad message; they come
/// from configuration loading, the transport and payload encoding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<rumqttc::ClientError> for Error {
    fn from(err: rumqttc::ClientError) -> Self {
        Error::Transport(err.to_string())
    }
}
