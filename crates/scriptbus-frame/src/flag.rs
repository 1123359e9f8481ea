//! Frame type flags.
//!
//! The first character of every frame body selects how the rest is read.

/// Fire-and-forget send.
pub const F_SEND: char = 's';

/// Request that expects exactly one reply.
pub const F_INVOKE: char = 'i';

/// One chunk of a streamed send.
pub const F_SEND_STREAM: char = 'S';

/// One chunk of a streamed invoke.
pub const F_INVOKE_STREAM: char = 'I';

/// The logical message a frame (or a reassembled stream) carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Send,
    Invoke,
}

impl MessageKind {
    /// Flag used for a single-frame message of this kind.
    pub fn flag(self) -> char {
        match self {
            Self::Send => F_SEND,
            Self::Invoke => F_INVOKE,
        }
    }

    /// Flag used for the chunks of a streamed message of this kind.
    pub fn stream_flag(self) -> char {
        match self {
            Self::Send => F_SEND_STREAM,
            Self::Invoke => F_INVOKE_STREAM,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Invoke => "invoke",
        }
    }
}

/// Returns a human-readable name for a type flag.
pub fn flag_name(flag: char) -> &'static str {
    match flag {
        F_SEND => "SEND",
        F_INVOKE => "INVOKE",
        F_SEND_STREAM => "SEND_STREAM",
        F_INVOKE_STREAM => "INVOKE_STREAM",
        _ => "UNKNOWN",
    }
}
