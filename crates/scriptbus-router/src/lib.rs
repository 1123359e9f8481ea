//! Per-instance event routing over a shared transport.
//!
//! A [`Router`] gives one component a namespace on the bus: it registers
//! listeners, sends fire-and-forget messages, and invokes remote listeners
//! with request/response correlation and a tick-based timeout. Messages
//! that do not fit in one frame are chunked on the way out and reassembled
//! on the way in.

pub mod config;
pub mod error;
pub mod handler;
mod invoke;
pub mod router;
pub mod scheduler;

pub use config::{RouterConfig, SendOptions, DEFAULT_INVOKE_TIMEOUT_TICKS, DEFAULT_TICK};
pub use error::{Result, RouterError};
pub use handler::{BoxError, Handler, HandlerResult};
pub use router::{Router, RouterBuilder};
pub use scheduler::{Scheduler, TimerCallback, TimerHandle, TokioScheduler};
