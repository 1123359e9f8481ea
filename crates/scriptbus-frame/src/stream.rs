//! Stream assembler: chunk splitting (outbound) and reassembly (inbound).

use std::collections::HashMap;

use tracing::trace;

use crate::error::{FrameError, Result};

/// Bytes a chunk body spends besides stream id and fragment:
/// type flag + separator + terminal marker + separator.
pub const CHUNK_OVERHEAD: usize = 4;

/// Smallest usable fragment budget: one character of any width.
const MIN_FRAGMENT_BUDGET: usize = 4;

/// One chunk of a streamed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Groups the chunks of one message.
    pub stream_id: String,
    /// Set on the last chunk only.
    pub terminal: bool,
    /// The slice of the serialized message this chunk carries.
    pub fragment: String,
}

impl Chunk {
    /// Length of the encoded chunk body.
    pub fn encoded_len(&self) -> usize {
        CHUNK_OVERHEAD + self.stream_id.len() + self.fragment.len()
    }
}

/// Fragment budget so that `event_id + chunk body` stays within `limit`.
///
/// Returns `None` when the id overhead alone leaves no room.
pub fn chunk_budget(limit: usize, event_id: &str, stream_id: &str) -> Option<usize> {
    limit.checked_sub(event_id.len() + CHUNK_OVERHEAD + stream_id.len())
}

/// Split `payload` into fragments of at most `budget` bytes.
///
/// Cuts only on UTF-8 character boundaries. An empty payload yields a
/// single empty fragment so the stream still has a terminal chunk.
pub fn split_fragments(payload: &str, budget: usize) -> Result<Vec<&str>> {
    if budget < MIN_FRAGMENT_BUDGET {
        return Err(FrameError::FragmentBudget {
            budget,
            min: MIN_FRAGMENT_BUDGET,
        });
    }
    if payload.is_empty() {
        return Ok(vec![""]);
    }

    let mut fragments = Vec::with_capacity(payload.len().div_ceil(budget));
    let mut start = 0;
    while start < payload.len() {
        let mut end = (start + budget).min(payload.len());
        while !payload.is_char_boundary(end) {
            end -= 1;
        }
        fragments.push(&payload[start..end]);
        start = end;
    }
    Ok(fragments)
}

/// Split `payload` into the ordered chunks of stream `stream_id`.
///
/// All chunks but the last are non-terminal.
pub fn chunk_payload(stream_id: &str, payload: &str, budget: usize) -> Result<Vec<Chunk>> {
    let fragments = split_fragments(payload, budget)?;
    let last = fragments.len() - 1;
    Ok(fragments
        .into_iter()
        .enumerate()
        .map(|(i, fragment)| Chunk {
            stream_id: stream_id.to_string(),
            terminal: i == last,
            fragment: fragment.to_string(),
        })
        .collect())
}

/// Partial-content buffers keyed by stream id.
///
/// A buffer is created on the first fragment of a stream and removed when
/// its terminal fragment arrives.
#[derive(Debug, Default)]
pub struct StreamBuffers {
    pending: HashMap<String, String>,
}

impl StreamBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk.
    ///
    /// Returns the reassembled content once the terminal chunk is pushed.
    pub fn push(&mut self, chunk: Chunk) -> Option<String> {
        let Chunk {
            stream_id,
            terminal,
            fragment,
        } = chunk;

        if terminal {
            let content = match self.pending.remove(&stream_id) {
                Some(mut buffer) => {
                    buffer.push_str(&fragment);
                    buffer
                }
                None => fragment,
            };
            trace!(stream_id = %stream_id, size = content.len(), "stream reassembled");
            return Some(content);
        }

        let buffer = self.pending.entry(stream_id).or_default();
        buffer.push_str(&fragment);
        trace!(size = buffer.len(), "stream fragment buffered");
        None
    }

    /// Drop a partially received stream.
    pub fn discard(&mut self, stream_id: &str) -> bool {
        self.pending.remove(stream_id).is_some()
    }

    pub fn contains(&self, stream_id: &str) -> bool {
        self.pending.contains_key(stream_id)
    }

    /// Number of streams awaiting their terminal chunk.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
