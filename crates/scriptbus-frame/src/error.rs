/// Errors that can occur while building or parsing frames.
///
/// Inbound, every variant is a protocol error: the frame is dropped.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame body is empty (no type flag).
    #[error("empty frame body")]
    EmptyBody,

    /// The type flag is not one of the known flags.
    #[error("unknown frame type flag {0:?}")]
    UnknownFlag(char),

    /// A required field is missing from the body.
    #[error("frame is missing its {0}")]
    MissingField(&'static str),

    /// The chunk terminal marker is neither `t` nor `f`.
    #[error("invalid chunk terminal marker {0:?} (expected \"t\" or \"f\")")]
    InvalidTerminal(String),

    /// An event or router id failed validation.
    #[error("invalid id {id:?}: {reason}")]
    InvalidId { id: String, reason: &'static str },

    /// The per-fragment budget cannot hold even one character.
    #[error("fragment budget too small ({budget} bytes, need at least {min})")]
    FragmentBudget { budget: usize, min: usize },

    /// The payload could not be serialized or deserialized.
    #[error("payload json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
