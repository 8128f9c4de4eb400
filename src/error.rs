use std::error::Error as StdError;

use thiserror::Error;

use crate::ports::PortIndex;

/// The demuxer's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The demuxer's crate-wide error type.
///
/// Every scheduler-facing operation returns `Result<()>`; the variants below are the shared
/// status vocabulary. "Not enough data yet" is never an error: it is reported as `Ok(())` and
/// the scheduler simply calls again once more input has arrived.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("component not ready")]
    NotReady,

    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    #[error("stream corrupt: container could not be parsed after {attempts} attempts")]
    StreamCorruptFatal { attempts: u32 },

    #[error("format not detected on port {0}")]
    FormatNotDetected(PortIndex),

    #[error("bad port index {0}")]
    BadPortIndex(u32),

    #[error("incorrect state operation: {0}")]
    IncorrectStateOperation(&'static str),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn resources(message: impl Into<String>) -> Self {
        Self::InsufficientResources(message.into())
    }

    /// Whether the pipeline should tear this component down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StreamCorruptFatal { .. }
                | Self::FormatNotDetected(_)
                | Self::InsufficientResources(_)
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}
