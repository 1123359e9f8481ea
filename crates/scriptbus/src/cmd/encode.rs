use scriptbus_frame::event_id::{response_id, stream_id, validate_router_id, validate_target};
use scriptbus_frame::{
    chunk_budget, chunk_payload, encode_chunk, encode_message, invoke_content, JsonSerializer,
    MessageKind, Serializer,
};
use serde_json::Value;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_frames, FrameRow, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = parse_json(&args.json)?;
    let frames = encode_frames(&args, &payload)?;
    tracing::debug!(
        event_id = %args.event_id,
        frames = frames.len(),
        "encoded message"
    );
    print_frames(&frames, format);
    Ok(SUCCESS)
}

pub(crate) fn parse_json(text: &str) -> CliResult<Value> {
    serde_json::from_str(text)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid JSON payload: {err}")))
}

/// The frames a router with id `args.router` would emit for its first
/// message of this kind.
fn encode_frames(args: &EncodeArgs, payload: &Value) -> CliResult<Vec<FrameRow>> {
    validate_target(&args.event_id).map_err(|err| frame_error("invalid event id", err))?;
    validate_router_id(&args.router).map_err(|err| frame_error("invalid router id", err))?;

    let json = JsonSerializer
        .serialize(payload)
        .map_err(|err| frame_error("serialize failed", err))?;
    let (kind, content) = if args.invoke {
        let reply_to = response_id(&args.router, 0);
        (MessageKind::Invoke, invoke_content(&reply_to, &json))
    } else {
        (MessageKind::Send, json)
    };

    let size = args.event_id.len() + 1 + content.len();
    if !args.stream && size <= args.max_frame_len {
        let body = encode_message(kind, &content);
        return Ok(vec![FrameRow::new(&args.event_id, body)]);
    }

    let stream = stream_id(&args.router, 0);
    let budget = chunk_budget(args.max_frame_len, &args.event_id, &stream).ok_or_else(|| {
        CliError::new(
            DATA_INVALID,
            format!(
                "frame limit {} leaves no room for chunks on {}",
                args.max_frame_len, args.event_id
            ),
        )
    })?;
    let chunks =
        chunk_payload(&stream, &content, budget).map_err(|err| frame_error("chunking failed", err))?;

    Ok(chunks
        .iter()
        .map(|chunk| FrameRow::new(&args.event_id, encode_chunk(kind, chunk)))
        .collect())
}
