use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{BoxFuture, InboundFrame, Subscription, Transport, MAX_FRAME_LEN};

/// In-process host bus.
///
/// Every dispatched frame is delivered to every current subscriber, in
/// dispatch order. Each subscriber gets its own unbounded queue, so delivery
/// to one subscription never waits on another.
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
    max_frame_len: usize,
}

#[derive(Default)]
struct Shared {
    next_subscriber: u64,
    subscribers: BTreeMap<u64, mpsc::UnboundedSender<InboundFrame>>,
    history: Vec<InboundFrame>,
    record: bool,
}

impl MemoryTransport {
    /// Create a bus with the default frame limit.
    pub fn new() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }

    /// Create a bus with an explicit frame limit.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            max_frame_len,
        }
    }

    /// Keep a copy of every dispatched frame, readable via [`history`](Self::history).
    pub fn recording(self) -> Self {
        self.lock().record = true;
        self
    }

    /// Frames dispatched so far (only populated when recording).
    pub fn history(&self) -> Vec<InboundFrame> {
        self.lock().history.clone()
    }

    /// Forget recorded frames.
    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Deliver a frame to all subscribers without any size check.
    ///
    /// Mirrors the host invoking the receive callback directly.
    pub fn deliver(&self, event_id: &str, body: &str) {
        let frame = InboundFrame::new(event_id, body);
        let mut shared = self.lock();
        if shared.record {
            shared.history.push(frame.clone());
        }
        shared
            .subscribers
            .retain(|_, tx| tx.send(frame.clone()).is_ok());
        trace!(
            event_id,
            size = body.len(),
            subscribers = shared.subscribers.len(),
            "frame delivered"
        );
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    fn dispatch<'a>(
        &'a self,
        event_id: &'a str,
        body: &'a str,
        bypass: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if event_id.is_empty() || event_id.contains(char::is_whitespace) {
                return Err(TransportError::InvalidEventId(event_id.to_string()));
            }
            let size = event_id.len() + body.len();
            if !bypass && size > self.max_frame_len {
                return Err(TransportError::FrameTooLarge {
                    size,
                    max: self.max_frame_len,
                });
            }
            self.deliver(event_id, body);
            Ok(())
        })
    }

    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut shared = self.lock();
            let id = shared.next_subscriber;
            shared.next_subscriber += 1;
            shared.subscribers.insert(id, tx);
            id
        };
        debug!(subscriber = id, "subscribed to memory transport");

        let shared = Arc::downgrade(&self.shared);
        Subscription::new(rx, move || {
            if let Some(shared) = shared.upgrade() {
                shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .subscribers
                    .remove(&id);
                debug!(subscriber = id, "unsubscribed from memory transport");
            }
        })
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("max_frame_len", &self.max_frame_len)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
