use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use scriptbus_frame::event_id as ids;
use scriptbus_frame::{
    codec, stream, Failure, FrameBody, FrameError, JsonSerializer, MessageKind, Reply, Serializer,
    StreamBuffers, CHUNK_OVERHEAD,
};
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use scriptbus_transport::{BoxFuture, InboundFrame, SubscriptionGuard, Transport};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::config::{RouterConfig, SendOptions};
use crate::error::{Result, RouterError};
use crate::handler::{BoxError, Handler, HandlerResult};
use crate::invoke::PendingInvoke;
use crate::scheduler::{Scheduler, TokioScheduler};

/// Per-instance event router.
///
/// Owns the listener registry and stream reassembly buffers of one
/// component. Cloning yields another handle to the same instance.
///
/// Inbound frames are delivered by a background task, one at a time and in
/// host order. Handlers are driven on that same task: each one starts before
/// the next frame is routed and none run in parallel, but a handler that
/// suspends lets later frames (including its own invoke replies) through.
#[derive(Clone)]
pub struct Router {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) id: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) serializer: Arc<dyn Serializer>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) config: RouterConfig,
    pub(crate) state: Mutex<State>,
    pub(crate) next_invoke: AtomicU64,
    next_stream: AtomicU64,
    valid: AtomicBool,
    subscription: Mutex<Option<SubscriptionGuard>>,
    handlers: mpsc::UnboundedSender<HandlerTask>,
    shutdown: CancellationToken,
}

/// A handler invocation plus whatever follows it (logging, the reply).
type HandlerTask = BoxFuture<'static, ()>;

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Default)]
pub(crate) struct State {
    pub(crate) listeners: HashMap<String, Listener>,
    streams: StreamBuffers,
}

pub(crate) enum Listener {
    /// Application handler.
    Handler(Arc<dyn Handler>),
    /// One-shot reply slot of an outstanding invoke.
    Response(PendingInvoke),
}

/// How an outbound message is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// One frame; oversize is an error unless forced.
    Single,
    /// Always chunked.
    Stream,
    /// One frame if it fits, chunked otherwise.
    Auto,
}

/// Builds a [`Router`] with non-default collaborators.
pub struct RouterBuilder {
    id: String,
    config: RouterConfig,
    serializer: Option<Arc<dyn Serializer>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl RouterBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config: RouterConfig::default(),
            serializer: None,
            scheduler: None,
        }
    }

    /// Override router behavior config.
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the payload serializer. Default: [`JsonSerializer`].
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Override the timer scheduler. Default: [`TokioScheduler`] with the
    /// configured tick.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Create the router and subscribe it to inbound delivery.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self, transport: impl Transport) -> Result<Router> {
        ids::validate_router_id(&self.id).map_err(RouterError::configuration)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            RouterError::Configuration("a router must be created inside a tokio runtime".into())
        })?;

        let transport: Arc<dyn Transport> = Arc::new(transport);
        let (receiver, guard) = transport.subscribe().into_parts();
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(TokioScheduler::new(self.config.tick)));
        let serializer = self
            .serializer
            .unwrap_or_else(|| Arc::new(JsonSerializer));

        let (handlers, handler_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            id: self.id,
            transport,
            serializer,
            scheduler,
            config: self.config,
            state: Mutex::new(State::default()),
            next_invoke: AtomicU64::new(0),
            next_stream: AtomicU64::new(0),
            valid: AtomicBool::new(true),
            subscription: Mutex::new(Some(guard)),
            handlers,
            shutdown: CancellationToken::new(),
        });

        runtime.spawn(deliver(
            Arc::downgrade(&inner),
            receiver,
            handler_rx,
            inner.shutdown.clone(),
        ));
        debug!(router = %inner.id, "router created");

        Ok(Router { inner })
    }
}

/// Inbound delivery loop: routes frames one at a time, in host order, and
/// drives the handlers they start.
///
/// A new handler is polled before the next frame is routed. Handlers already
/// running when the router shuts down are run to completion.
async fn deliver(
    inner: Weak<Inner>,
    mut receiver: mpsc::UnboundedReceiver<InboundFrame>,
    mut handler_rx: mpsc::UnboundedReceiver<HandlerTask>,
    shutdown: CancellationToken,
) {
    let mut running: FuturesUnordered<HandlerTask> = FuturesUnordered::new();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(task) = handler_rx.recv() => running.push(task),
            Some(()) = running.next(), if !running.is_empty() => {}
            frame = receiver.recv() => {
                let Some(frame) = frame else { break };
                let Some(inner) = inner.upgrade() else { break };
                if let Some(task) = (Router { inner }).route(&frame.event_id, &frame.body) {
                    running.push(task);
                }
            }
        }
    }
    while running.next().await.is_some() {}
}

impl Router {
    /// Create a router with default configuration.
    pub fn new(id: impl Into<String>, transport: impl Transport) -> Result<Self> {
        RouterBuilder::new(id).build(transport)
    }

    /// Create a router with explicit configuration.
    pub fn with_config(
        id: impl Into<String>,
        transport: impl Transport,
        config: RouterConfig,
    ) -> Result<Self> {
        RouterBuilder::new(id).config(config).build(transport)
    }

    pub fn builder(id: impl Into<String>) -> RouterBuilder {
        RouterBuilder::new(id)
    }

    /// Router id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// False once [`destroy`](Self::destroy) has run.
    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::SeqCst)
    }

    /// Effective frame limit.
    pub fn max_frame_len(&self) -> usize {
        self.inner
            .config
            .max_frame_len
            .unwrap_or_else(|| self.inner.transport.max_frame_len())
    }

    /// Unsubscribe from inbound delivery and mark the router invalid.
    ///
    /// Idempotent: returns `true` only for the call that tore it down.
    /// Outstanding invokes are not cancelled; their timers still run, and
    /// outbound calls stay usable.
    pub fn destroy(&self) -> bool {
        if !self.inner.valid.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some(mut guard) = lock(&self.inner.subscription).take() {
            guard.release();
        }
        self.inner.shutdown.cancel();
        debug!(router = %self.inner.id, "router destroyed");
        true
    }

    /// Register an application listener.
    ///
    /// Fails if the id lacks a namespace, uses the reserved prefix, or is
    /// already registered.
    pub fn register_listener<H: Handler>(&self, event_id: &str, handler: H) -> Result<()> {
        ids::validate_listener(event_id).map_err(RouterError::configuration)?;

        let mut state = self.state();
        if state.listeners.contains_key(event_id) {
            return Err(RouterError::Configuration(format!(
                "listener {event_id:?} is already registered"
            )));
        }
        state
            .listeners
            .insert(event_id.to_string(), Listener::Handler(Arc::new(handler)));
        debug!(router = %self.inner.id, event_id, "listener registered");
        Ok(())
    }

    /// Remove an application listener. Returns whether one was removed.
    pub fn remove_listener(&self, event_id: &str) -> bool {
        let mut state = self.state();
        if !matches!(state.listeners.get(event_id), Some(Listener::Handler(_))) {
            return false;
        }
        state.listeners.remove(event_id);
        debug!(router = %self.inner.id, event_id, "listener removed");
        true
    }

    pub fn has_listener(&self, event_id: &str) -> bool {
        matches!(
            self.state().listeners.get(event_id),
            Some(Listener::Handler(_))
        )
    }

    /// Number of registered application listeners.
    pub fn listener_count(&self) -> usize {
        self.state()
            .listeners
            .values()
            .filter(|listener| matches!(listener, Listener::Handler(_)))
            .count()
    }

    /// Number of invokes still waiting for a reply or timeout.
    pub fn pending_invokes(&self) -> usize {
        self.state()
            .listeners
            .values()
            .filter(|listener| matches!(listener, Listener::Response(_)))
            .count()
    }

    /// Number of inbound streams awaiting their terminal chunk.
    pub fn pending_streams(&self) -> usize {
        self.state().streams.len()
    }

    /// Send a payload as one frame.
    pub async fn send<T>(&self, event_id: &str, payload: &T, options: SendOptions) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.send_with(event_id, payload, options, Delivery::Single)
            .await
    }

    /// Send a payload as a chunk stream, whatever its size.
    pub async fn send_stream<T>(
        &self,
        event_id: &str,
        payload: &T,
        options: SendOptions,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.send_with(event_id, payload, options, Delivery::Stream)
            .await
    }

    /// Send a payload, chunking only when it does not fit in one frame.
    pub async fn send_auto<T>(
        &self,
        event_id: &str,
        payload: &T,
        options: SendOptions,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.send_with(event_id, payload, options, Delivery::Auto)
            .await
    }

    async fn send_with<T>(
        &self,
        event_id: &str,
        payload: &T,
        options: SendOptions,
        delivery: Delivery,
    ) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        if !options.force {
            ids::validate_target(event_id).map_err(RouterError::configuration)?;
        }
        let json = self.serialize(payload)?;
        if self.plan(event_id, &json, delivery, options.force)? {
            self.emit_stream(event_id, MessageKind::Send, &json, options.force)
                .await
        } else {
            self.dispatch(event_id, &codec::encode_send(&json), options.force)
                .await
        }
    }

    /// Inbound dispatch of one raw frame.
    ///
    /// Frames for unknown ids are dropped silently; malformed frames are
    /// logged and dropped. A handler this starts is handed to the router's
    /// delivery task; once the router is destroyed it is not run.
    pub fn route_event(&self, event_id: &str, body: &str) {
        if let Some(task) = self.route(event_id, body) {
            if self.inner.handlers.send(task).is_err() {
                trace!(router = %self.inner.id, event_id, "router shut down, handler not run");
            }
        }
    }

    /// Parse, reassemble and look up one frame; returns the handler run it
    /// starts, if any.
    fn route(&self, event_id: &str, body: &str) -> Option<HandlerTask> {
        if !self.state().listeners.contains_key(event_id) {
            self.drop_orphan(event_id, body);
            return None;
        }

        let parsed = match codec::decode_body(body) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.drop_malformed(event_id, &err);
                return None;
            }
        };

        match parsed {
            FrameBody::Send(payload) => self.deliver_send(event_id, &payload),
            FrameBody::Invoke {
                response_id,
                payload,
            } => self.deliver_invoke(event_id, response_id, &payload),
            FrameBody::Chunk { kind, chunk } => {
                let content = self.state().streams.push(chunk)?;
                match kind {
                    MessageKind::Send => self.deliver_send(event_id, &content),
                    MessageKind::Invoke => match codec::split_invoke(&content) {
                        Ok((response_id, payload)) => {
                            self.deliver_invoke(event_id, response_id.to_string(), payload)
                        }
                        Err(err) => {
                            self.drop_malformed(event_id, &err);
                            None
                        }
                    },
                }
            }
        }
    }

    /// A frame for an id nobody listens on. Chunks of a stream whose listener
    /// went away mid-stream still release its buffer.
    fn drop_orphan(&self, event_id: &str, body: &str) {
        if let Ok(FrameBody::Chunk { chunk, .. }) = codec::decode_body(body) {
            if self.state().streams.discard(&chunk.stream_id) {
                debug!(
                    router = %self.inner.id,
                    event_id,
                    stream_id = %chunk.stream_id,
                    "listener gone, partial stream discarded"
                );
                return;
            }
        }
        trace!(router = %self.inner.id, event_id, "no listener, frame dropped");
    }

    fn deliver_send(&self, event_id: &str, payload: &str) -> Option<HandlerTask> {
        let value = match self.inner.serializer.deserialize(payload) {
            Ok(value) => value,
            Err(err) => {
                self.drop_malformed(event_id, &err);
                return None;
            }
        };

        let found = {
            let mut state = self.state();
            match state.listeners.get(event_id) {
                Some(Listener::Handler(handler)) => Ok(Arc::clone(handler)),
                Some(Listener::Response(_)) => Err(state.listeners.remove(event_id)),
                None => return None,
            }
        };
        let handler = match found {
            Ok(handler) => handler,
            Err(Some(Listener::Response(pending))) => {
                debug!(router = %self.inner.id, response_id = event_id, "invoke reply received");
                pending.settle(self.inner.scheduler.as_ref(), Ok(Reply::from_wire(value)));
                return None;
            }
            Err(_) => return None,
        };

        let router_id = self.inner.id.clone();
        let event_id = event_id.to_string();
        Some(Box::pin(async move {
            match run_handler(handler, value).await {
                Ok(Reply::Failure(failure)) => {
                    warn!(router = %router_id, event_id = %event_id, %failure, "send handler returned a failure");
                }
                Ok(Reply::Value(_)) => {}
                Err(err) => {
                    error!(router = %router_id, event_id = %event_id, error = %err, "send handler failed");
                }
            }
        }))
    }

    fn deliver_invoke(
        &self,
        event_id: &str,
        response_id: String,
        payload: &str,
    ) -> Option<HandlerTask> {
        let value = match self.inner.serializer.deserialize(payload) {
            Ok(value) => value,
            Err(err) => {
                self.drop_malformed(event_id, &err);
                return None;
            }
        };

        let handler = {
            let state = self.state();
            match state.listeners.get(event_id) {
                Some(Listener::Handler(handler)) => Arc::clone(handler),
                Some(Listener::Response(_)) => {
                    debug!(router = %self.inner.id, event_id, "invoke addressed to a reply slot, dropped");
                    return None;
                }
                None => return None,
            }
        };

        let router = self.clone();
        let event_id = event_id.to_string();
        Some(Box::pin(async move {
            let reply = match run_handler(handler, value).await {
                Ok(reply) => reply,
                Err(err) => {
                    error!(router = %router.inner.id, event_id = %event_id, error = %err, "invoke handler failed");
                    Reply::Failure(Failure::new(err.to_string()))
                }
            };
            if let Err(err) = router.reply(&response_id, &reply).await {
                error!(
                    router = %router.inner.id,
                    event_id = %event_id,
                    response_id = %response_id,
                    error = %err,
                    "failed to send invoke reply"
                );
            }
        }))
    }

    /// Send exactly one reply frame (chunked when oversize).
    async fn reply(&self, response_id: &str, reply: &Reply) -> Result<()> {
        self.send_with(
            response_id,
            &reply.to_wire(),
            SendOptions::default(),
            Delivery::Auto,
        )
        .await
    }

    fn drop_malformed(&self, event_id: &str, err: &FrameError) {
        warn!(router = %self.inner.id, event_id, error = %err, "dropping malformed frame");
    }

    pub(crate) fn serialize<T>(&self, payload: &T) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        let value: Value = serde_json::to_value(payload).map_err(FrameError::from)?;
        Ok(self.inner.serializer.serialize(&value)?)
    }

    /// Decide whether a message with `content` goes out chunked.
    pub(crate) fn plan(
        &self,
        event_id: &str,
        content: &str,
        delivery: Delivery,
        force: bool,
    ) -> Result<bool> {
        let size = event_id.len() + 1 + content.len();
        let max = self.max_frame_len();
        match delivery {
            Delivery::Single if !force && size > max => Err(RouterError::Oversize { size, max }),
            Delivery::Single => Ok(false),
            Delivery::Stream => Ok(true),
            Delivery::Auto => Ok(size > max),
        }
    }

    pub(crate) async fn dispatch(&self, event_id: &str, body: &str, bypass: bool) -> Result<()> {
        self.inner
            .transport
            .dispatch(event_id, body, bypass)
            .await
            .map_err(RouterError::from)
    }

    /// Emit `content` as a chunk stream, one dispatch completing before the next.
    pub(crate) async fn emit_stream(
        &self,
        event_id: &str,
        kind: MessageKind,
        content: &str,
        bypass: bool,
    ) -> Result<()> {
        let seq = self.inner.next_stream.fetch_add(1, Ordering::Relaxed);
        let stream_id = ids::stream_id(&self.inner.id, seq);
        let max = self.max_frame_len();
        let oversize = RouterError::Oversize {
            size: event_id.len() + CHUNK_OVERHEAD + stream_id.len() + content.len(),
            max,
        };

        let Some(budget) = stream::chunk_budget(max, event_id, &stream_id) else {
            return Err(oversize);
        };
        let chunks = match stream::chunk_payload(&stream_id, content, budget) {
            Ok(chunks) => chunks,
            Err(FrameError::FragmentBudget { .. }) => return Err(oversize),
            Err(err) => return Err(err.into()),
        };

        let total = chunks.len();
        for chunk in &chunks {
            self.dispatch(event_id, &codec::encode_chunk(kind, chunk), bypass)
                .await?;
        }
        debug!(
            router = %self.inner.id,
            event_id,
            stream_id = %stream_id,
            kind = kind.name(),
            chunks = total,
            "stream emitted"
        );
        Ok(())
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.inner.state)
    }
}

/// Run a handler, turning a panic into an error.
async fn run_handler(handler: Arc<dyn Handler>, payload: Value) -> HandlerResult {
    let run = AssertUnwindSafe(async move { handler.handle(payload).await });
    match run.catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(BoxError::from(panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.inner.id)
            .field("valid", &self.is_valid())
            .field("listeners", &self.listener_count())
            .field("pending_invokes", &self.pending_invokes())
            .finish()
    }
}
