//! Event id rules and id minting.
//!
//! An event id is `<namespace>:<local>`. Local names starting with
//! [`RESERVED_PREFIX`] belong to internally generated response listeners.

use crate::error::{FrameError, Result};

/// Separates namespace from local name.
pub const DELIMITER: char = ':';

/// Local-name prefix reserved for response listeners.
pub const RESERVED_PREFIX: &str = "__";

/// Maximum router id length in bytes.
pub const MAX_ROUTER_ID_LEN: usize = 32;

/// Separates router id from the counter in a stream id.
const STREAM_ID_DELIMITER: char = '.';

/// Split an event id into `(namespace, local)` at the first delimiter.
pub fn split(event_id: &str) -> Option<(&str, &str)> {
    let at = event_id.find(DELIMITER)?;
    Some((&event_id[..at], &event_id[at + DELIMITER.len_utf8()..]))
}

/// Validate an id used as a send/invoke target.
pub fn validate_target(event_id: &str) -> Result<()> {
    if event_id.contains(char::is_whitespace) {
        return Err(invalid(event_id, "event id must not contain whitespace"));
    }
    let (namespace, local) =
        split(event_id).ok_or_else(|| invalid(event_id, "missing namespace delimiter ':'"))?;
    if namespace.is_empty() {
        return Err(invalid(event_id, "namespace is empty"));
    }
    if local.is_empty() {
        return Err(invalid(event_id, "local name is empty"));
    }
    Ok(())
}

/// Validate an id an application wants to register a listener under.
pub fn validate_listener(event_id: &str) -> Result<()> {
    validate_target(event_id)?;
    if is_reserved(event_id) {
        return Err(invalid(
            event_id,
            "local names starting with \"__\" are reserved",
        ));
    }
    Ok(())
}

/// Returns true if the local name carries the reserved prefix.
pub fn is_reserved(event_id: &str) -> bool {
    split(event_id).is_some_and(|(_, local)| local.starts_with(RESERVED_PREFIX))
}

/// Validate a router id.
///
/// Router ids become the namespace of response ids and the prefix of stream
/// ids, so they must not contain the delimiter or whitespace.
pub fn validate_router_id(router_id: &str) -> Result<()> {
    if router_id.is_empty() {
        return Err(invalid(router_id, "router id is empty"));
    }
    if router_id.len() > MAX_ROUTER_ID_LEN {
        return Err(invalid(router_id, "router id longer than 32 bytes"));
    }
    if router_id.contains(DELIMITER) {
        return Err(invalid(router_id, "router id must not contain ':'"));
    }
    if router_id.contains(char::is_whitespace) {
        return Err(invalid(router_id, "router id must not contain whitespace"));
    }
    Ok(())
}

/// Response listener id for the `seq`-th invoke of a router.
pub fn response_id(router_id: &str, seq: u64) -> String {
    format!("{router_id}{DELIMITER}{RESERVED_PREFIX}{seq:x}")
}

/// Stream id for the `seq`-th stream of a router.
pub fn stream_id(router_id: &str, seq: u64) -> String {
    format!("{router_id}{STREAM_ID_DELIMITER}{seq:x}")
}

fn invalid(id: &str, reason: &'static str) -> FrameError {
    FrameError::InvalidId {
        id: id.to_string(),
        reason,
    }
}
