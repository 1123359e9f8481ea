//! Two routers on one in-process bus: a server echoing invokes and a client
//! calling it with a payload large enough to be streamed.
//!
//! Run with:
//!   cargo run --example echo-router

use scriptbus::router::{BoxError, Router, SendOptions};
use scriptbus::transport::MemoryTransport;
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bus = MemoryTransport::with_max_frame_len(256).recording();

    let server = Router::new("server", bus.clone())?;
    server.register_listener("echo:reply", |payload: Value| async move {
        Ok::<_, BoxError>(payload)
    })?;

    let client = Router::new("client", bus.clone())?;
    let payload = json!({ "text": "hello ".repeat(100) });
    let reply = client
        .invoke_auto("echo:reply", &payload, SendOptions::default())
        .await?;

    eprintln!(
        "Round trip ok: {} (frames on the bus: {})",
        reply.value() == Some(&payload),
        bus.history().len()
    );

    client.destroy();
    server.destroy();
    Ok(())
}
