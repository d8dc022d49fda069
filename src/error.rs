/// Raised when a level token has no telemetry severity.
///
/// This is a configuration bug in the producer, never a runtime condition
/// to tolerate: callers should not fall back to a default severity.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("No severity level found for '{level}'")]
pub struct UnknownLevelError {
    pub level: String,
}

impl UnknownLevelError {
    pub fn new(level: impl Into<String>) -> Self {
        UnknownLevelError { level: level.into() }
    }
}

/// Error type returned when starting a telemetry client.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("instrumentation key is empty")]
    MissingInstrumentationKey,

    #[error("telemetry client requires a running tokio runtime")]
    NoRuntime,

    #[error("telemetry client does not support {0}")]
    Unsupported(&'static str),

    #[cfg(feature = "http")]
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Error type returned by the `init` entrypoints.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to start telemetry client: {0}")]
    Client(#[from] ClientError),

    #[error("failed to set global subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}
