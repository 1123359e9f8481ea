//! Event routing over bounded-frame host transports.
//!
//! scriptbus lets independent components share one host message bus. Each
//! component owns a router that registers namespaced listeners, sends
//! fire-and-forget messages, and invokes remote listeners with correlated
//! replies and a timeout. Payloads larger than one frame are chunked and
//! reassembled transparently.
//!
//! # Crate Structure
//!
//! - [`transport`]: Host transport abstraction and the in-process bus
//! - [`frame`]: Frame body codec, failure envelope and chunking
//! - [`router`]: Per-instance router with invoke coordination

/// Re-export transport types.
pub mod transport {
    pub use scriptbus_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use scriptbus_frame::*;
}

/// Re-export router types.
pub mod router {
    pub use scriptbus_router::*;
}
