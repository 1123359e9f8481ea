use crate::error::{FrameError, Result};
use crate::flag::{MessageKind, F_INVOKE, F_INVOKE_STREAM, F_SEND, F_SEND_STREAM};
use crate::stream::Chunk;

/// Field separator inside a frame body.
pub const SEPARATOR: char = ' ';

const TERMINAL: &str = "t";
const NON_TERMINAL: &str = "f";

/// A parsed frame body.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    /// `s<payload>`
    Send(String),
    /// `i<response-id> <payload>`
    Invoke { response_id: String, payload: String },
    /// `S|I<stream-id> <t|f> <fragment>`
    Chunk { kind: MessageKind, chunk: Chunk },
}

impl FrameBody {
    /// Type flag of this body.
    pub fn flag(&self) -> char {
        match self {
            Self::Send(_) => F_SEND,
            Self::Invoke { .. } => F_INVOKE,
            Self::Chunk { kind, .. } => kind.stream_flag(),
        }
    }
}

/// Encode a send body.
pub fn encode_send(payload: &str) -> String {
    let mut body = String::with_capacity(1 + payload.len());
    body.push(F_SEND);
    body.push_str(payload);
    body
}

/// Encode an invoke body.
pub fn encode_invoke(response_id: &str, payload: &str) -> String {
    let mut body = String::with_capacity(1 + invoke_content_len(response_id, payload));
    body.push(F_INVOKE);
    push_invoke_content(&mut body, response_id, payload);
    body
}

/// Encode a single-frame message from its content (the body after the flag).
pub fn encode_message(kind: MessageKind, content: &str) -> String {
    let mut body = String::with_capacity(1 + content.len());
    body.push(kind.flag());
    body.push_str(content);
    body
}

/// The part of an invoke body after the flag: `<response-id> <payload>`.
///
/// This is also what a streamed invoke carries across its chunks.
pub fn invoke_content(response_id: &str, payload: &str) -> String {
    let mut content = String::with_capacity(invoke_content_len(response_id, payload));
    push_invoke_content(&mut content, response_id, payload);
    content
}

fn invoke_content_len(response_id: &str, payload: &str) -> usize {
    response_id.len() + 1 + payload.len()
}

fn push_invoke_content(dst: &mut String, response_id: &str, payload: &str) {
    dst.push_str(response_id);
    dst.push(SEPARATOR);
    dst.push_str(payload);
}

/// Encode one chunk of a streamed message.
pub fn encode_chunk(kind: MessageKind, chunk: &Chunk) -> String {
    let mut body = String::with_capacity(chunk.encoded_len());
    body.push(kind.stream_flag());
    body.push_str(&chunk.stream_id);
    body.push(SEPARATOR);
    body.push_str(if chunk.terminal { TERMINAL } else { NON_TERMINAL });
    body.push(SEPARATOR);
    body.push_str(&chunk.fragment);
    body
}

/// Split on the first separator only.
///
/// Returns `None` when the separator does not occur.
pub fn split_first(content: &str) -> Option<(&str, &str)> {
    let at = content.find(SEPARATOR)?;
    Some((&content[..at], &content[at + SEPARATOR.len_utf8()..]))
}

/// Split invoke content into `(response_id, payload)`.
pub fn split_invoke(content: &str) -> Result<(&str, &str)> {
    let (response_id, payload) =
        split_first(content).ok_or(FrameError::MissingField("invoke payload"))?;
    if response_id.is_empty() {
        return Err(FrameError::MissingField("response id"));
    }
    Ok((response_id, payload))
}

/// Decode a raw frame body.
pub fn decode_body(body: &str) -> Result<FrameBody> {
    let flag = body.chars().next().ok_or(FrameError::EmptyBody)?;
    let rest = &body[flag.len_utf8()..];

    match flag {
        F_SEND => Ok(FrameBody::Send(rest.to_string())),
        F_INVOKE => {
            let (response_id, payload) = split_invoke(rest)?;
            Ok(FrameBody::Invoke {
                response_id: response_id.to_string(),
                payload: payload.to_string(),
            })
        }
        F_SEND_STREAM => Ok(FrameBody::Chunk {
            kind: MessageKind::Send,
            chunk: decode_chunk(rest)?,
        }),
        F_INVOKE_STREAM => Ok(FrameBody::Chunk {
            kind: MessageKind::Invoke,
            chunk: decode_chunk(rest)?,
        }),
        other => Err(FrameError::UnknownFlag(other)),
    }
}

fn decode_chunk(content: &str) -> Result<Chunk> {
    let (stream_id, rest) =
        split_first(content).ok_or(FrameError::MissingField("chunk terminal marker"))?;
    if stream_id.is_empty() {
        return Err(FrameError::MissingField("stream id"));
    }
    let (marker, fragment) =
        split_first(rest).ok_or(FrameError::MissingField("chunk fragment"))?;
    let terminal = match marker {
        TERMINAL => true,
        NON_TERMINAL => false,
        other => return Err(FrameError::InvalidTerminal(other.to_string())),
    };

    Ok(Chunk {
        stream_id: stream_id.to_string(),
        terminal,
        fragment: fragment.to_string(),
    })
}
