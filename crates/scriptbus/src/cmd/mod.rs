use clap::{Args, Subcommand};
use scriptbus_router::DEFAULT_INVOKE_TIMEOUT_TICKS;
use scriptbus_transport::MAX_FRAME_LEN;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod echo;
pub mod encode;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the frames a send or invoke of a JSON payload produces.
    Encode(EncodeArgs),
    /// Parse a raw frame body.
    Decode(DecodeArgs),
    /// Invoke an echo listener through an in-process bus and print the reply.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Echo(args) => echo::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Target event id (namespace:name).
    pub event_id: String,
    /// JSON payload.
    pub json: String,
    /// Encode as an invoke carrying a response id.
    #[arg(long)]
    pub invoke: bool,
    /// Chunk even when the message fits in one frame.
    #[arg(long)]
    pub stream: bool,
    /// Router id used to mint response and stream ids.
    #[arg(long, default_value = "cli")]
    pub router: String,
    /// Frame limit in bytes (event id plus body).
    #[arg(long, env = "SCRIPTBUS_MAX_FRAME_LEN", default_value_t = MAX_FRAME_LEN)]
    pub max_frame_len: usize,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame body, starting with its type flag.
    pub body: String,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// JSON payload.
    pub json: String,
    /// Event id to invoke. Anything but the echo listener times out.
    #[arg(long, default_value = echo::ECHO_EVENT)]
    pub event: String,
    /// Stream the request even when it fits in one frame.
    #[arg(long)]
    pub stream: bool,
    /// Make the echo listener answer with this failure message.
    #[arg(long, value_name = "MESSAGE")]
    pub fail: Option<String>,
    /// Also print every frame that crossed the bus.
    #[arg(long)]
    pub frames: bool,
    /// Frame limit in bytes (event id plus body).
    #[arg(long, env = "SCRIPTBUS_MAX_FRAME_LEN", default_value_t = MAX_FRAME_LEN)]
    pub max_frame_len: usize,
    /// Invoke timeout in ticks.
    #[arg(long, default_value_t = DEFAULT_INVOKE_TIMEOUT_TICKS)]
    pub timeout_ticks: u32,
    /// Tick length in milliseconds.
    #[arg(long, env = "SCRIPTBUS_TICK_MS", default_value_t = 50)]
    pub tick_ms: u64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
