//! Invoke coordination: correlation ids, reply slots and timeouts.
//!
//! Each invoke mints a response id and parks a one-shot reply slot under it
//! in the listener registry. The slot is settled by whichever comes first:
//! a frame arriving on the response id, or the timer. Both paths remove the
//! slot before settling it, so the loser finds nothing and is ignored.

use std::sync::Arc;

use scriptbus_frame::event_id as ids;
use scriptbus_frame::{codec, MessageKind, Reply};
use scriptbus_transport::TransportError;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::SendOptions;
use crate::error::{Result, RouterError};
use crate::router::{Delivery, Listener, Router};
use crate::scheduler::{Scheduler, TimerHandle};

/// Reply slot of one outstanding invoke.
pub(crate) struct PendingInvoke {
    timer: Option<TimerHandle>,
    reply_tx: oneshot::Sender<Result<Reply>>,
}

impl PendingInvoke {
    pub(crate) fn new(reply_tx: oneshot::Sender<Result<Reply>>) -> Self {
        Self {
            timer: None,
            reply_tx,
        }
    }

    /// Disarm the timer and hand the outcome to the waiting caller.
    pub(crate) fn settle(self, scheduler: &dyn Scheduler, outcome: Result<Reply>) {
        if let Some(timer) = self.timer {
            scheduler.cancel(timer);
        }
        // The caller may have gone away; nobody is left to tell.
        let _ = self.reply_tx.send(outcome);
    }
}

/// Removes the reply slot when the invoking future ends, however it ends.
///
/// A settled slot is already gone, so this only matters for send errors
/// and callers that drop the future early.
struct SlotGuard<'a> {
    router: &'a Router,
    response_id: &'a str,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let removed = {
            let mut state = self.router.state();
            match state.listeners.get(self.response_id) {
                Some(Listener::Response(_)) => state.listeners.remove(self.response_id),
                _ => None,
            }
        };
        if let Some(Listener::Response(pending)) = removed {
            if let Some(timer) = pending.timer {
                self.router.inner.scheduler.cancel(timer);
            }
            debug!(
                router = %self.router.inner.id,
                response_id = self.response_id,
                "invoke abandoned"
            );
        }
    }
}

impl Router {
    /// Invoke a remote listener with a single frame and wait for its reply.
    ///
    /// A reply that is a failure envelope comes back as [`Reply::Failure`],
    /// or as [`RouterError::Failure`] when `options.throw_failures` is set.
    /// Without a reply inside the configured window the call fails with
    /// [`RouterError::Timeout`]; the window starts before the frame is sent.
    pub async fn invoke<T>(&self, event_id: &str, payload: &T, options: SendOptions) -> Result<Reply>
    where
        T: Serialize + ?Sized,
    {
        self.invoke_with(event_id, payload, options, Delivery::Single)
            .await
    }

    /// Invoke with the request carried as a chunk stream.
    ///
    /// The timeout window starts once the last chunk has been dispatched.
    pub async fn invoke_stream<T>(
        &self,
        event_id: &str,
        payload: &T,
        options: SendOptions,
    ) -> Result<Reply>
    where
        T: Serialize + ?Sized,
    {
        self.invoke_with(event_id, payload, options, Delivery::Stream)
            .await
    }

    /// Invoke, streaming the request only when it does not fit in one frame.
    pub async fn invoke_auto<T>(
        &self,
        event_id: &str,
        payload: &T,
        options: SendOptions,
    ) -> Result<Reply>
    where
        T: Serialize + ?Sized,
    {
        self.invoke_with(event_id, payload, options, Delivery::Auto)
            .await
    }

    async fn invoke_with<T>(
        &self,
        event_id: &str,
        payload: &T,
        options: SendOptions,
        delivery: Delivery,
    ) -> Result<Reply>
    where
        T: Serialize + ?Sized,
    {
        if !options.force {
            ids::validate_target(event_id).map_err(RouterError::configuration)?;
        }
        let json = self.serialize(payload)?;
        let seq = self
            .inner
            .next_invoke
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let response_id = ids::response_id(&self.inner.id, seq);
        let content = codec::invoke_content(&response_id, &json);
        let chunked = self.plan(event_id, &content, delivery, options.force)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.state().listeners.insert(
            response_id.clone(),
            Listener::Response(PendingInvoke::new(reply_tx)),
        );
        let _slot = SlotGuard {
            router: self,
            response_id: &response_id,
        };

        if chunked {
            self.emit_stream(event_id, MessageKind::Invoke, &content, options.force)
                .await?;
            self.arm_timer(&response_id);
        } else {
            self.arm_timer(&response_id);
            let body = codec::encode_message(MessageKind::Invoke, &content);
            self.dispatch(event_id, &body, options.force).await?;
        }
        debug!(
            router = %self.inner.id,
            event_id,
            response_id = %response_id,
            streamed = chunked,
            "invoke dispatched"
        );

        let reply = reply_rx
            .await
            .map_err(|_| RouterError::Transport(TransportError::Shutdown))??;
        match reply {
            Reply::Failure(failure) if options.throw_failures => Err(RouterError::Failure(failure)),
            reply => Ok(reply),
        }
    }

    /// Start the invoke window for `response_id`.
    fn arm_timer(&self, response_id: &str) {
        let ticks = self.inner.config.invoke_timeout_ticks;
        let inner = Arc::downgrade(&self.inner);
        let expiring = response_id.to_string();
        let handle = self.inner.scheduler.after(
            ticks,
            Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    Router { inner }.expire(&expiring, ticks);
                }
            }),
        );

        let stored = match self.state().listeners.get_mut(response_id) {
            Some(Listener::Response(pending)) => {
                pending.timer = Some(handle);
                true
            }
            _ => false,
        };
        if !stored {
            self.inner.scheduler.cancel(handle);
        }
    }

    /// Timer path: settle the slot with a timeout if it is still open.
    fn expire(&self, response_id: &str, ticks: u32) {
        let removed = {
            let mut state = self.state();
            match state.listeners.get(response_id) {
                Some(Listener::Response(_)) => state.listeners.remove(response_id),
                _ => None,
            }
        };
        if let Some(Listener::Response(pending)) = removed {
            debug!(router = %self.inner.id, response_id, ticks, "invoke timed out");
            let _ = pending.reply_tx.send(Err(RouterError::Timeout { ticks }));
        }
    }
}
