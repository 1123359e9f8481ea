//! Bounded text-frame transport abstraction.
//!
//! The transport carries one frame at a time: an event id plus a short text
//! body, whose combined length is capped by [`MAX_FRAME_LEN`]. Everything
//! else in scriptbus builds on the [`Transport`] trait provided here.
//!
//! [`MemoryTransport`] is an in-process host bus that fans every frame out to
//! all current subscribers, in dispatch order.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use traits::{
    BoxFuture, InboundFrame, Subscription, SubscriptionGuard, Transport, MAX_FRAME_LEN,
};
