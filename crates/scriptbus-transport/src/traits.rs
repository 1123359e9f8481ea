use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;

use crate::error::Result;

/// Hard limit on `event_id.len() + body.len()` for a single frame, in bytes.
pub const MAX_FRAME_LEN: usize = 2048;

/// Boxed, sendable future used at the dyn-compatible trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One frame as delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// The event id the frame was addressed to.
    pub event_id: String,
    /// The raw frame body (type flag + content).
    pub body: String,
}

impl InboundFrame {
    /// Create a new inbound frame.
    pub fn new(event_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            body: body.into(),
        }
    }
}

/// A host transport that moves one bounded frame at a time.
pub trait Transport: Send + Sync + 'static {
    /// Maximum combined length of event id and body accepted by `dispatch`.
    fn max_frame_len(&self) -> usize {
        MAX_FRAME_LEN
    }

    /// Send one frame.
    ///
    /// Resolves once the host has accepted the frame. Unless `bypass` is set,
    /// frames whose `event_id.len() + body.len()` exceeds
    /// [`max_frame_len`](Transport::max_frame_len) are rejected.
    fn dispatch<'a>(&'a self, event_id: &'a str, body: &'a str, bypass: bool)
        -> BoxFuture<'a, Result<()>>;

    /// Subscribe to inbound delivery.
    ///
    /// Every frame dispatched after this call is delivered to the returned
    /// subscription, in dispatch order, until it is released.
    fn subscribe(&self) -> Subscription;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn max_frame_len(&self) -> usize {
        (**self).max_frame_len()
    }

    fn dispatch<'a>(
        &'a self,
        event_id: &'a str,
        body: &'a str,
        bypass: bool,
    ) -> BoxFuture<'a, Result<()>> {
        (**self).dispatch(event_id, body, bypass)
    }

    fn subscribe(&self) -> Subscription {
        (**self).subscribe()
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Host-side registration of a subscription.
///
/// Released exactly once, either explicitly or on drop.
pub struct SubscriptionGuard {
    release: Option<ReleaseFn>,
}

impl SubscriptionGuard {
    fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Whether the registration is still held.
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Release the registration. Returns `false` if already released.
    pub fn release(&mut self) -> bool {
        match self.release.take() {
            Some(release) => {
                release();
                true
            }
            None => false,
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("active", &self.is_active())
            .finish()
    }
}

/// An inbound delivery subscription.
///
/// Owns the host-side registration through its [`SubscriptionGuard`].
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<InboundFrame>,
    guard: SubscriptionGuard,
}

impl Subscription {
    /// Build a subscription from a delivery channel and a release hook.
    pub fn new(
        receiver: mpsc::UnboundedReceiver<InboundFrame>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            guard: SubscriptionGuard::new(release),
        }
    }

    /// Wait for the next delivered frame.
    ///
    /// Returns `None` once the host side has gone away.
    pub async fn recv(&mut self) -> Option<InboundFrame> {
        self.receiver.recv().await
    }

    /// Whether the host registration is still held.
    pub fn is_active(&self) -> bool {
        self.guard.is_active()
    }

    /// Release the host registration.
    ///
    /// Returns `false` if it had already been released.
    pub fn unsubscribe(&mut self) -> bool {
        let released = self.guard.release();
        self.receiver.close();
        released
    }

    /// Separate the frame receiver from the registration guard, so the
    /// registration can be released while another task drains frames.
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<InboundFrame>, SubscriptionGuard) {
        (self.receiver, self.guard)
    }
}

impl futures_core::Stream for Subscription {
    type Item = InboundFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
