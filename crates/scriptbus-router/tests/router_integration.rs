//! End-to-end router behavior over the in-process bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scriptbus_frame::{Failure, Reply};
use scriptbus_router::{
    BoxError, Handler, Router, RouterConfig, RouterError, Scheduler, SendOptions, TimerCallback,
    TimerHandle,
};
use scriptbus_transport::{BoxFuture, MemoryTransport, Subscription, Transport};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Let spawned delivery and handler tasks run to quiescence.
async fn flush() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn forward(tx: mpsc::UnboundedSender<Value>) -> impl Handler {
    move |payload: Value| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(payload);
            Ok::<_, BoxError>(Value::Null)
        }
    }
}

fn echo() -> impl Handler {
    |payload: Value| async move { Ok::<_, BoxError>(payload) }
}

/// Echoes after sleeping for the number of milliseconds in the payload.
fn delayed_echo() -> impl Handler {
    |payload: Value| async move {
        let ms = payload.as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok::<_, BoxError>(payload)
    }
}

/// Bus wrapper whose dispatch takes `delay` to complete.
struct SlowTransport {
    inner: MemoryTransport,
    delay: Duration,
}

impl Transport for SlowTransport {
    fn max_frame_len(&self) -> usize {
        self.inner.max_frame_len()
    }

    fn dispatch<'a>(
        &'a self,
        event_id: &'a str,
        body: &'a str,
        bypass: bool,
    ) -> BoxFuture<'a, scriptbus_transport::Result<()>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.inner.dispatch(event_id, body, bypass).await
        })
    }

    fn subscribe(&self) -> Subscription {
        self.inner.subscribe()
    }
}

/// Scheduler whose timers only fire when the test says so.
#[derive(Default)]
struct ManualScheduler {
    next_id: AtomicU64,
    timers: Mutex<HashMap<u64, (u32, TimerCallback)>>,
}

impl ManualScheduler {
    fn armed_ticks(&self) -> Vec<u32> {
        self.timers.lock().unwrap().values().map(|(ticks, _)| *ticks).collect()
    }

    fn fire_all(&self) {
        let due: Vec<_> = self.timers.lock().unwrap().drain().collect();
        for (_, (_, callback)) in due {
            callback();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, ticks: u32, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.timers.lock().unwrap().insert(id, (ticks, callback));
        TimerHandle::new(id)
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        self.timers.lock().unwrap().remove(&handle.id()).is_some()
    }
}

#[tokio::test(start_paused = true)]
async fn send_emits_exactly_one_frame() {
    let bus = MemoryTransport::new().recording();
    let sender = Router::new("a", bus.clone()).unwrap();
    let receiver = Router::new("b", bus.clone()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    receiver.register_listener("demo:evt", forward(tx)).unwrap();

    sender
        .send("demo:evt", &json!({ "a": 1 }), SendOptions::default())
        .await
        .unwrap();
    flush().await;

    let history = bus.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_id, "demo:evt");
    assert_eq!(history[0].body, r#"s{"a":1}"#);
    assert_eq!(rx.try_recv().unwrap(), json!({ "a": 1 }));
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn send_rejects_bad_targets_and_oversize() {
    let bus = MemoryTransport::with_max_frame_len(32).recording();
    let router = Router::new("a", bus.clone()).unwrap();

    for bad in ["plain", "ns:", ":local", "ns:has space"] {
        assert!(matches!(
            router.send(bad, &1, SendOptions::default()).await,
            Err(RouterError::Configuration(_))
        ));
    }

    let big = "x".repeat(64);
    assert!(matches!(
        router.send("demo:evt", &big, SendOptions::default()).await,
        Err(RouterError::Oversize { max: 32, .. })
    ));
    assert!(bus.history().is_empty());

    router
        .send("demo:evt", &big, SendOptions::forced())
        .await
        .unwrap();
    let history = bus.history();
    assert_eq!(history.len(), 1);
    assert!(history[0].event_id.len() + history[0].body.len() > 32);
}

#[tokio::test(start_paused = true)]
async fn send_auto_chunks_only_when_needed() {
    let bus = MemoryTransport::with_max_frame_len(64).recording();
    let sender = Router::new("a", bus.clone()).unwrap();
    let receiver = Router::new("b", bus.clone()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    receiver.register_listener("demo:evt", forward(tx)).unwrap();

    sender
        .send_auto("demo:evt", &"small", SendOptions::default())
        .await
        .unwrap();
    flush().await;
    assert_eq!(bus.history().len(), 1);
    assert!(bus.history()[0].body.starts_with('s'));
    assert_eq!(rx.try_recv().unwrap(), json!("small"));
    bus.clear_history();

    let large = "é".repeat(150);
    sender
        .send_auto("demo:evt", &large, SendOptions::default())
        .await
        .unwrap();
    flush().await;

    let history = bus.history();
    assert!(history.len() >= 2);
    for (i, frame) in history.iter().enumerate() {
        assert!(frame.event_id.len() + frame.body.len() <= 64);
        assert!(frame.body.starts_with("Sa.0 "));
        let terminal = i == history.len() - 1;
        assert_eq!(frame.body.starts_with("Sa.0 t "), terminal);
    }
    assert_eq!(rx.try_recv().unwrap(), json!(large));
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn send_stream_chunks_even_small_payloads() {
    let bus = MemoryTransport::new().recording();
    let sender = Router::new("a", bus.clone()).unwrap();
    let receiver = Router::new("b", bus.clone()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    receiver.register_listener("demo:evt", forward(tx)).unwrap();

    sender
        .send_stream("demo:evt", &[1, 2, 3], SendOptions::default())
        .await
        .unwrap();
    flush().await;

    let history = bus.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].body, "Sa.0 t [1,2,3]");
    assert_eq!(rx.try_recv().unwrap(), json!([1, 2, 3]));
    assert_eq!(receiver.pending_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn interleaved_streams_reassemble_independently() {
    let bus = MemoryTransport::new();
    let receiver = Router::new("b", bus.clone()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    receiver.register_listener("demo:evt", forward(tx)).unwrap();

    bus.deliver("demo:evt", "Sx.0 f [1,");
    bus.deliver("demo:evt", "Sy.0 f {\"k\":");
    flush().await;
    assert_eq!(receiver.pending_streams(), 2);
    assert!(rx.try_recv().is_err());

    bus.deliver("demo:evt", "Sy.0 t \"v\"}");
    bus.deliver("demo:evt", "Sx.0 t 2]");
    flush().await;

    let mut delivered = vec![rx.try_recv().unwrap(), rx.try_recv().unwrap()];
    delivered.sort_by_key(|value| value.is_array());
    assert_eq!(delivered, vec![json!({ "k": "v" }), json!([1, 2])]);
    assert!(rx.try_recv().is_err());
    assert_eq!(receiver.pending_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn invoke_returns_handler_value() {
    let bus = MemoryTransport::new();
    let server = Router::new("server", bus.clone()).unwrap();
    let client = Router::new("client", bus).unwrap();
    server
        .register_listener("math:double", |payload: Value| async move {
            match payload.as_i64() {
                Some(n) => Ok::<_, BoxError>(json!(n * 2)),
                None => Err("expected a number".into()),
            }
        })
        .unwrap();

    let reply = client
        .invoke("math:double", &21, SendOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, Reply::Value(json!(42)));
    assert_eq!(client.pending_invokes(), 0);
}

#[tokio::test(start_paused = true)]
async fn inbound_invoke_is_answered_on_response_id() {
    let bus = MemoryTransport::new().recording();
    let server = Router::new("server", bus.clone()).unwrap();
    server.register_listener("svc:echo", echo()).unwrap();
    server
        .register_listener("svc:refuse", |_: Value| async move {
            Ok::<_, BoxError>(Failure::new("nope"))
        })
        .unwrap();

    bus.deliver("svc:echo", "iext:__1 {\"a\": \"b c\"}");
    bus.deliver("svc:refuse", "iext:__2 null");
    flush().await;

    let mut replies: Vec<(String, String)> = bus
        .history()
        .into_iter()
        .filter(|frame| frame.event_id.starts_with("ext:"))
        .map(|frame| (frame.event_id, frame.body))
        .collect();
    replies.sort();
    assert_eq!(
        replies,
        vec![
            ("ext:__1".to_string(), r#"s{"a":"b c"}"#.to_string()),
            ("ext:__2".to_string(), r#"s{"$failure":"nope"}"#.to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn invoke_times_out_after_twenty_ticks() {
    let bus = MemoryTransport::new();
    let client = Router::new("client", bus).unwrap();

    let start = Instant::now();
    let err = client
        .invoke("nobody:home", &Value::Null, SendOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Timeout { ticks: 20 }));
    assert_eq!(start.elapsed(), Duration::from_secs(1));
    assert_eq!(client.pending_invokes(), 0);
}

#[tokio::test(start_paused = true)]
async fn late_reply_after_timeout_is_ignored() {
    let bus = MemoryTransport::new();
    let server = Router::new("server", bus.clone()).unwrap();
    let client = Router::new("client", bus).unwrap();
    server.register_listener("svc:slow", delayed_echo()).unwrap();

    let err = client
        .invoke("svc:slow", &1500, SendOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Timeout { .. }));

    // The reply lands on a response id nobody is waiting on any more.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(client.pending_invokes(), 0);

    let reply = client
        .invoke("svc:slow", &10, SendOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, Reply::Value(json!(10)));
}

#[tokio::test(start_paused = true)]
async fn custom_timeout_window() {
    let bus = MemoryTransport::new();
    let config = RouterConfig::default()
        .with_invoke_timeout_ticks(4)
        .with_tick(Duration::from_millis(100));
    let client = Router::with_config("client", bus, config).unwrap();

    let start = Instant::now();
    let err = client
        .invoke("nobody:home", &1, SendOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Timeout { ticks: 4 }));
    assert_eq!(start.elapsed(), Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn concurrent_invokes_settle_out_of_order() {
    let bus = MemoryTransport::new().recording();
    let server = Router::new("server", bus.clone()).unwrap();
    let client = Router::new("client", bus.clone()).unwrap();
    server.register_listener("svc:slow", delayed_echo()).unwrap();

    let (slow, fast) = tokio::join!(
        client.invoke("svc:slow", &300, SendOptions::default()),
        client.invoke("svc:slow", &100, SendOptions::default()),
    );
    assert_eq!(slow.unwrap(), Reply::Value(json!(300)));
    assert_eq!(fast.unwrap(), Reply::Value(json!(100)));

    let history = bus.history();
    let reply_order: Vec<&str> = history
        .iter()
        .filter(|frame| frame.event_id.starts_with("client:__"))
        .map(|frame| frame.event_id.as_str())
        .collect();
    assert_eq!(reply_order, vec!["client:__1", "client:__0"]);
}

#[tokio::test(start_paused = true)]
async fn failures_are_values_unless_thrown() {
    let bus = MemoryTransport::new();
    let server = Router::new("server", bus.clone()).unwrap();
    let client = Router::new("client", bus).unwrap();
    server
        .register_listener("svc:fail", |_: Value| async move {
            Ok::<_, BoxError>(Failure::new("refused"))
        })
        .unwrap();

    let reply = client
        .invoke("svc:fail", &json!({}), SendOptions::default())
        .await
        .unwrap();
    assert!(reply.is_failure());
    assert_eq!(reply.into_result().unwrap_err().message(), "refused");

    match client
        .invoke("svc:fail", &json!({}), SendOptions::throwing())
        .await
    {
        Err(RouterError::Failure(failure)) => assert_eq!(failure.message(), "refused"),
        other => panic!("expected a thrown failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn handler_errors_and_panics_become_failures() {
    let bus = MemoryTransport::new();
    let server = Router::new("server", bus.clone()).unwrap();
    let client = Router::new("client", bus).unwrap();
    server
        .register_listener("svc:err", |_: Value| async move {
            Err::<Value, BoxError>("bad input".into())
        })
        .unwrap();
    server
        .register_listener("svc:panic", |_: Value| async move {
            if true {
                panic!("boom");
            }
            Ok::<_, BoxError>(Value::Null)
        })
        .unwrap();

    let reply = client
        .invoke("svc:err", &1, SendOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, Reply::Failure(Failure::new("bad input")));

    let reply = client
        .invoke("svc:panic", &1, SendOptions::default())
        .await
        .unwrap();
    let failure = reply.into_result().unwrap_err();
    assert!(failure.message().contains("panicked"));
}

#[tokio::test(start_paused = true)]
async fn large_requests_and_replies_are_streamed() {
    let bus = MemoryTransport::with_max_frame_len(96).recording();
    let server = Router::new("server", bus.clone()).unwrap();
    let client = Router::new("client", bus.clone()).unwrap();
    server.register_listener("svc:echo", echo()).unwrap();

    let payload = json!({ "text": "lorem ipsum ".repeat(40) });
    let reply = client
        .invoke_auto("svc:echo", &payload, SendOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, Reply::Value(payload));

    let history = bus.history();
    assert!(history.iter().all(|f| f.event_id.len() + f.body.len() <= 96));
    assert!(history
        .iter()
        .any(|f| f.event_id == "svc:echo" && f.body.starts_with('I')));
    assert!(history
        .iter()
        .any(|f| f.event_id == "client:__0" && f.body.starts_with('S')));
}

#[tokio::test(start_paused = true)]
async fn invoke_stream_window_starts_after_last_chunk() {
    let bus = MemoryTransport::with_max_frame_len(64);
    let server = Router::new("s", bus.clone()).unwrap();
    server.register_listener("svc:echo", echo()).unwrap();
    let slow = SlowTransport {
        inner: bus.clone(),
        delay: Duration::from_millis(400),
    };
    let client = Router::new("c", slow).unwrap();

    // Three chunks at 400ms each outlast the one second window.
    let payload = "x".repeat(120);
    let start = Instant::now();
    let reply = client
        .invoke_stream("svc:echo", &payload, SendOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, Reply::Value(json!(payload)));
    assert!(start.elapsed() >= Duration::from_millis(1200));
}

#[tokio::test(start_paused = true)]
async fn invoke_window_starts_before_dispatch() {
    let bus = MemoryTransport::new();
    let server = Router::new("s", bus.clone()).unwrap();
    server.register_listener("svc:echo", echo()).unwrap();
    let slow = SlowTransport {
        inner: bus.clone(),
        delay: Duration::from_millis(1500),
    };
    let client = Router::new("c", slow).unwrap();

    let err = client
        .invoke("svc:echo", &1, SendOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Timeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn destroy_unsubscribes_once() {
    let bus = MemoryTransport::new();
    let sender = Router::new("a", bus.clone()).unwrap();
    let receiver = Router::new("b", bus.clone()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    receiver.register_listener("demo:evt", forward(tx)).unwrap();
    assert_eq!(bus.subscriber_count(), 2);

    assert!(receiver.destroy());
    assert!(!receiver.destroy());
    assert!(!receiver.is_valid());
    assert_eq!(bus.subscriber_count(), 1);

    sender
        .send("demo:evt", &1, SendOptions::default())
        .await
        .unwrap();
    flush().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn destroy_leaves_pending_invokes_to_their_timers() {
    let bus = MemoryTransport::new();
    let client = Router::new("client", bus).unwrap();

    let destroyer = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.destroy()
    };
    let (outcome, destroyed) = tokio::join!(
        client.invoke("nobody:home", &1, SendOptions::default()),
        destroyer
    );
    assert!(destroyed);
    assert!(matches!(outcome, Err(RouterError::Timeout { .. })));
}

#[tokio::test(start_paused = true)]
async fn malformed_and_unknown_frames_are_dropped() {
    let bus = MemoryTransport::new();
    let receiver = Router::new("b", bus.clone()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    receiver.register_listener("demo:evt", forward(tx)).unwrap();

    for body in ["", "x{}", "s{oops", "i", "i {}", "Sr.0 maybe 1", "Sr.0"] {
        bus.deliver("demo:evt", body);
    }
    bus.deliver("other:evt", "s1");
    bus.deliver("demo:evt", "s[1]");
    flush().await;

    assert_eq!(rx.try_recv().unwrap(), json!([1]));
    assert!(rx.try_recv().is_err());
    assert_eq!(receiver.pending_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn failing_send_handlers_are_logged_without_reply() {
    let bus = MemoryTransport::new().recording();
    let router = Router::new("b", bus.clone()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    router
        .register_listener("demo:err", |_: Value| async move {
            Err::<Value, BoxError>("bad input".into())
        })
        .unwrap();
    router
        .register_listener("demo:panic", |_: Value| async move {
            if true {
                panic!("boom");
            }
            Ok::<_, BoxError>(Value::Null)
        })
        .unwrap();
    router
        .register_listener("demo:fail", |_: Value| async move {
            Ok::<_, BoxError>(Failure::new("nope"))
        })
        .unwrap();
    router.register_listener("demo:ok", forward(tx)).unwrap();

    bus.deliver("demo:err", "s1");
    bus.deliver("demo:panic", "s2");
    bus.deliver("demo:fail", "s3");
    bus.deliver("demo:ok", "s4");
    flush().await;

    assert_eq!(rx.try_recv().unwrap(), json!(4));
    let history = bus.history();
    assert_eq!(history.len(), 4, "no frame besides the four deliveries");
    assert!(history.iter().all(|frame| frame.body.starts_with('s')));

    bus.deliver("demo:panic", "s5");
    bus.deliver("demo:ok", "s6");
    flush().await;
    assert_eq!(rx.try_recv().unwrap(), json!(6));
    assert!(router.is_valid());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn handlers_run_one_at_a_time_in_delivery_order() {
    let bus = MemoryTransport::new();
    let router = Router::new("b", bus.clone()).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let active = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicBool::new(false));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let (seen, running, clash) = (order.clone(), active.clone(), overlapped.clone());
    router
        .register_listener("demo:evt", move |payload: Value| {
            let (seen, running, clash) = (seen.clone(), running.clone(), clash.clone());
            let done_tx = done_tx.clone();
            async move {
                if running.fetch_add(1, Ordering::SeqCst) > 0 {
                    clash.store(true, Ordering::SeqCst);
                }
                if payload == json!(0) {
                    // Blocks the thread without yielding to the router.
                    std::thread::sleep(Duration::from_millis(200));
                }
                seen.lock().unwrap().push(payload);
                running.fetch_sub(1, Ordering::SeqCst);
                let _ = done_tx.send(());
                Ok::<_, BoxError>(Value::Null)
            }
        })
        .unwrap();

    bus.deliver("demo:evt", "s0");
    bus.deliver("demo:evt", "s1");
    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
            .await
            .unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![json!(0), json!(1)]);
    assert!(!overlapped.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn suspended_handler_does_not_hold_up_later_frames() {
    let bus = MemoryTransport::new();
    let router = Router::new("b", bus.clone()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let record = tx.clone();
    router
        .register_listener("demo:slow", move |payload: Value| {
            let record = record.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                let _ = record.send(payload);
                Ok::<_, BoxError>(Value::Null)
            }
        })
        .unwrap();
    router.register_listener("demo:fast", forward(tx)).unwrap();

    bus.deliver("demo:slow", "s0");
    bus.deliver("demo:fast", "s1");
    flush().await;
    assert_eq!(rx.try_recv().unwrap(), json!(1));
    assert!(rx.try_recv().is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(rx.try_recv().unwrap(), json!(0));
}

#[tokio::test(start_paused = true)]
async fn handler_can_invoke_through_its_own_router() {
    let bus = MemoryTransport::new();
    let server = Router::new("server", bus.clone()).unwrap();
    let relay = Router::new("relay", bus.clone()).unwrap();
    let client = Router::new("client", bus).unwrap();
    server.register_listener("svc:echo", echo()).unwrap();

    let upstream = relay.clone();
    relay
        .register_listener("svc:relay", move |payload: Value| {
            let upstream = upstream.clone();
            async move {
                match upstream
                    .invoke("svc:echo", &payload, SendOptions::default())
                    .await
                {
                    Ok(reply) => Ok::<_, BoxError>(reply),
                    Err(err) => Err(err.into()),
                }
            }
        })
        .unwrap();

    let reply = client
        .invoke("svc:relay", &"via relay", SendOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, Reply::Value(json!("via relay")));
}

#[tokio::test(start_paused = true)]
async fn stream_buffer_released_once_listener_is_gone() {
    let bus = MemoryTransport::new();
    let client = Router::with_config(
        "client",
        bus.clone(),
        RouterConfig::default().with_invoke_timeout_ticks(2),
    )
    .unwrap();

    let caller = client.clone();
    let call = tokio::spawn(async move {
        caller
            .invoke("nobody:home", &1, SendOptions::default())
            .await
    });
    flush().await;
    bus.deliver("client:__0", "Sserver.0 f [1,");
    flush().await;
    assert_eq!(client.pending_streams(), 1);

    let outcome = call.await.unwrap();
    assert!(matches!(outcome, Err(RouterError::Timeout { ticks: 2 })));
    bus.deliver("client:__0", "Sserver.0 t 2]");
    flush().await;
    assert_eq!(client.pending_streams(), 0);

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.register_listener("demo:evt", forward(tx)).unwrap();
    bus.deliver("demo:evt", "Sx.0 f [1,");
    flush().await;
    assert_eq!(client.pending_streams(), 1);

    assert!(client.remove_listener("demo:evt"));
    bus.deliver("demo:evt", "Sx.0 f 2,");
    flush().await;
    assert_eq!(client.pending_streams(), 0);
    bus.deliver("demo:evt", "Sx.0 t 3]");
    flush().await;
    assert_eq!(client.pending_streams(), 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn timeout_is_driven_by_scheduler_ticks() {
    let scheduler = Arc::new(ManualScheduler::default());
    let client = Router::builder("client")
        .scheduler(scheduler.clone())
        .build(MemoryTransport::new())
        .unwrap();

    let caller = client.clone();
    let call = tokio::spawn(async move {
        caller
            .invoke("nobody:home", &1, SendOptions::default())
            .await
    });
    while scheduler.armed_ticks().is_empty() {
        tokio::task::yield_now().await;
    }
    assert_eq!(scheduler.armed_ticks(), vec![20]);
    assert_eq!(client.pending_invokes(), 1);

    scheduler.fire_all();
    let outcome = call.await.unwrap();
    assert!(matches!(outcome, Err(RouterError::Timeout { ticks: 20 })));
    assert_eq!(client.pending_invokes(), 0);
}

#[tokio::test]
async fn reply_disarms_its_timer() {
    let bus = MemoryTransport::new();
    let scheduler = Arc::new(ManualScheduler::default());
    let server = Router::new("server", bus.clone()).unwrap();
    server.register_listener("svc:echo", echo()).unwrap();
    let client = Router::builder("client")
        .scheduler(scheduler.clone())
        .build(bus)
        .unwrap();

    let reply = client
        .invoke("svc:echo", &"hi", SendOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, Reply::Value(json!("hi")));
    assert!(scheduler.armed_ticks().is_empty());
}
