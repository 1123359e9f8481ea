//! Text framing, chunking and the failure envelope.
//!
//! Every frame body starts with a one-character type flag:
//! - `s<json>`: fire-and-forget send
//! - `i<response-id> <json>`: invoke, answered on `response-id`
//! - `S<stream-id> <t|f> <fragment>` / `I...`: one chunk of a streamed
//!   send / invoke, reassembled in arrival order until the `t` chunk
//!
//! Fields are split on the first space only; payloads may contain spaces.

pub mod codec;
pub mod error;
pub mod event_id;
pub mod failure;
pub mod flag;
pub mod serializer;
pub mod stream;

pub use codec::{
    decode_body, encode_chunk, encode_invoke, encode_message, encode_send, invoke_content,
    split_invoke, FrameBody, SEPARATOR,
};
pub use error::{FrameError, Result};
pub use event_id::{DELIMITER, MAX_ROUTER_ID_LEN, RESERVED_PREFIX};
pub use failure::{Failure, Reply, FAILURE_KEY};
pub use flag::{MessageKind, F_INVOKE, F_INVOKE_STREAM, F_SEND, F_SEND_STREAM};
pub use serializer::{JsonSerializer, Serializer};
pub use stream::{chunk_budget, chunk_payload, Chunk, StreamBuffers, CHUNK_OVERHEAD};
