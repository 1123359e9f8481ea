use std::time::Duration;

use scriptbus_frame::{Failure, Reply};
use scriptbus_router::{BoxError, Router, RouterConfig, SendOptions};
use scriptbus_transport::{InboundFrame, MemoryTransport};
use serde_json::{json, Value};

use crate::cmd::encode::parse_json;
use crate::cmd::EchoArgs;
use crate::exit::{router_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_fields, print_frames, FrameRow, OutputFormat};

/// Event the in-process echo listener is registered on.
pub const ECHO_EVENT: &str = "echo:reply";

const SERVER_ID: &str = "echo";
const CLIENT_ID: &str = "cli";

pub fn run(args: EchoArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = parse_json(&args.json)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;

    let (reply, history) = runtime.block_on(round_trip(&args, payload))?;

    if args.frames {
        let frames: Vec<FrameRow> = history
            .into_iter()
            .map(|frame| FrameRow::new(frame.event_id, frame.body))
            .collect();
        print_frames(&frames, format);
    }

    match reply {
        Reply::Value(value) => {
            print_fields(&[("reply", value)], format);
            Ok(SUCCESS)
        }
        Reply::Failure(failure) => {
            print_fields(&[("failure", json!(failure.message()))], format);
            Ok(FAILURE)
        }
    }
}

async fn round_trip(args: &EchoArgs, payload: Value) -> CliResult<(Reply, Vec<InboundFrame>)> {
    let bus = MemoryTransport::with_max_frame_len(args.max_frame_len).recording();
    let config = RouterConfig::default()
        .with_invoke_timeout_ticks(args.timeout_ticks)
        .with_tick(Duration::from_millis(args.tick_ms));

    let server = Router::with_config(SERVER_ID, bus.clone(), config.clone())
        .map_err(|err| router_error("server setup failed", err))?;
    let fail = args.fail.clone();
    server
        .register_listener(ECHO_EVENT, move |payload: Value| {
            let fail = fail.clone();
            async move {
                let reply = match fail {
                    Some(message) => Reply::Failure(Failure::new(message)),
                    None => Reply::Value(payload),
                };
                Ok::<_, BoxError>(reply)
            }
        })
        .map_err(|err| router_error("server setup failed", err))?;

    let client = Router::with_config(CLIENT_ID, bus.clone(), config)
        .map_err(|err| router_error("client setup failed", err))?;

    let options = SendOptions::default();
    let outcome = if args.stream {
        client.invoke_stream(&args.event, &payload, options).await
    } else {
        client.invoke_auto(&args.event, &payload, options).await
    };
    client.destroy();
    server.destroy();

    let reply = outcome.map_err(|err| router_error("invoke failed", err))?;
    tracing::info!(event_id = %args.event, failure = reply.is_failure(), "echo round trip complete");
    Ok((reply, bus.history()))
}
