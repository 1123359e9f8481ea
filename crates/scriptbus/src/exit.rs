use std::fmt;

use scriptbus_frame::FrameError;
use scriptbus_router::RouterError;
use scriptbus_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = match err {
        TransportError::FrameTooLarge { .. } => DATA_INVALID,
        TransportError::InvalidEventId(_) => USAGE,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    let code = match err {
        FrameError::InvalidId { .. } => USAGE,
        _ => DATA_INVALID,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn router_error(context: &str, err: RouterError) -> CliError {
    match err {
        RouterError::Configuration(_) => CliError::new(USAGE, format!("{context}: {err}")),
        RouterError::Oversize { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        RouterError::Protocol(err) => frame_error(context, err),
        RouterError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        RouterError::Failure(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        RouterError::Transport(err) => transport_error(context, err),
    }
}
