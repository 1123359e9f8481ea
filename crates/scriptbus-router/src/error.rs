use scriptbus_frame::{Failure, FrameError};
use scriptbus_transport::TransportError;

/// Errors that can occur in router operations.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Invalid router id, or an invalid/duplicate listener or target id.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The encoded frame exceeds the transport limit.
    #[error("frame too large ({size} bytes, max {max})")]
    Oversize { size: usize, max: usize },

    /// Malformed frame content or payload that cannot be (de)serialized.
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),

    /// No reply arrived within the invoke window.
    #[error("invoke timed out after {ticks} ticks")]
    Timeout { ticks: u32 },

    /// The handler replied with a failure and the caller asked to throw it.
    #[error("handler failure: {0}")]
    Failure(Failure),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(TransportError),
}

impl From<TransportError> for RouterError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::FrameTooLarge { size, max } => Self::Oversize { size, max },
            TransportError::InvalidEventId(id) => {
                Self::Configuration(format!("transport rejected event id {id:?}"))
            }
            other => Self::Transport(other),
        }
    }
}

impl RouterError {
    /// Map an id validation failure to a configuration error.
    pub(crate) fn configuration(err: FrameError) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
