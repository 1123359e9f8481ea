use scriptbus_frame::flag::flag_name;
use scriptbus_frame::{decode_body, FrameBody, JsonSerializer, Reply, Serializer};
use serde_json::{json, Value};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_fields, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let fields = decode_fields(&args.body)?;
    print_fields(&fields, format);
    Ok(SUCCESS)
}

fn decode_fields(body: &str) -> CliResult<Vec<(&'static str, Value)>> {
    let parsed = decode_body(body).map_err(|err| frame_error("decode failed", err))?;
    let mut fields = vec![("kind", json!(flag_name(parsed.flag())))];

    match parsed {
        FrameBody::Send(payload) => push_payload(&mut fields, &payload)?,
        FrameBody::Invoke {
            response_id,
            payload,
        } => {
            fields.push(("response_id", json!(response_id)));
            push_payload(&mut fields, &payload)?;
        }
        // Fragments are partial JSON; show them verbatim.
        FrameBody::Chunk { kind, chunk } => {
            fields.push(("message", json!(kind.name())));
            fields.push(("stream_id", json!(chunk.stream_id)));
            fields.push(("terminal", json!(chunk.terminal)));
            fields.push(("fragment", json!(chunk.fragment)));
        }
    }
    Ok(fields)
}

fn push_payload(fields: &mut Vec<(&'static str, Value)>, payload: &str) -> CliResult<()> {
    let value = JsonSerializer
        .deserialize(payload)
        .map_err(|err| frame_error("invalid payload", err))?;
    match Reply::from_wire(value) {
        Reply::Value(value) => fields.push(("payload", value)),
        Reply::Failure(failure) => fields.push(("failure", json!(failure.message()))),
    }
    Ok(())
}
