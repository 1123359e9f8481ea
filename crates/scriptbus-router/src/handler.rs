use std::future::Future;

use scriptbus_frame::Reply;
use scriptbus_transport::BoxFuture;
use serde_json::Value;

/// Error type handlers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler produces for one delivered payload.
pub type HandlerResult = std::result::Result<Reply, BoxError>;

/// An application listener.
///
/// Handlers may complete immediately or suspend; both go through the same
/// future-returning `handle`. For invoke frames, `Ok` is sent back as the reply
/// (a [`Failure`](scriptbus_frame::Failure) travels as an envelope) and
/// `Err` is answered with a failure carrying the error text.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, payload: Value) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, BoxError>> + Send + 'static,
    R: Into<Reply>,
{
    fn handle(&self, payload: Value) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(payload);
        Box::pin(async move { fut.await.map(Into::into) })
    }
}
