//! Hangup listener supervision against the mock switch.

mod common;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::{MockSession, MockSwitch};
use freeswitch_call_control::{
    Connector, EslClient, EslError, EslEvent, EslEventStream, EslEventType, EslResult,
    EventFormat, EventHandler, EventListener, FixedDelay, ListenerHandle, ListenerState,
    TcpConnector,
};
use tokio::sync::mpsc;

const RETRY: Duration = Duration::from_millis(50);

/// Fails the first `failures` dials, then dials for real.
struct FlakyConnector {
    inner: TcpConnector,
    failures: AtomicU32,
    attempts: Mutex<Vec<Instant>>,
}

impl FlakyConnector {
    fn new(inner: TcpConnector, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures: AtomicU32::new(failures),
            attempts: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self) -> Vec<Instant> {
        self.attempts
            .lock()
            .unwrap()
            .clone()
    }
}

impl Connector for FlakyConnector {
    fn connect(&self) -> impl Future<Output = EslResult<(EslClient, EslEventStream)>> + Send {
        self.attempts
            .lock()
            .unwrap()
            .push(Instant::now());
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let inner = self
            .inner
            .clone();
        async move {
            if fail {
                Err(EslError::ConnectionClosed)
            } else {
                inner
                    .connect()
                    .await
            }
        }
    }
}

/// Forwards every dispatched event to the test.
struct Collect(mpsc::UnboundedSender<EslEvent>);

impl EventHandler for Collect {
    fn handle(&self, event: EslEvent) -> impl Future<Output = ()> + Send {
        let tx = self
            .0
            .clone();
        async move {
            let _ = tx.send(event);
        }
    }
}

fn hangup(uuid: &str, cause: &str) -> EslEvent {
    let mut event = EslEvent::with_type(EslEventType::ChannelHangup);
    event.set_header("Unique-ID", uuid);
    event.set_header("Hangup-Cause", cause);
    event.set_header("variable_billsec", "42");
    event
}

/// Accept the listener's connection and acknowledge its subscription.
async fn accept_subscription(switch: &MockSwitch, handle: &ListenerHandle) -> MockSession {
    let mut session = switch
        .accept()
        .await;
    let command = session
        .read_command()
        .await
        .expect("listener subscribes");
    assert_eq!(command, "event plain CHANNEL_HANGUP HEARTBEAT");
    assert_ne!(handle.state(), ListenerState::Subscribed);
    session
        .reply("+OK event listener enabled plain")
        .await;

    let mut state = handle.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == ListenerState::Subscribed),
    )
    .await
    .expect("listener subscribed")
    .unwrap();
    session
}

async fn wait_in_flight(handle: &ListenerHandle, expected: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while handle.in_flight() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("in-flight count reached");
}

#[tokio::test]
async fn retries_until_dial_succeeds() {
    let switch = MockSwitch::bind().await;
    let connector = FlakyConnector::new(TcpConnector::for_events(&switch.config()), 3);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = EventListener::new(connector.clone(), Collect(tx))
        .with_policy(FixedDelay::new(RETRY))
        .spawn();
    let mut session = accept_subscription(&switch, &handle).await;

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 4);
    for pair in attempts.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= RETRY);
    }

    let mut heartbeat = EslEvent::with_type(EslEventType::Heartbeat);
    heartbeat.set_header("Unique-ID", "not-a-call");
    session
        .send_event(&heartbeat)
        .await;
    session
        .send_event(&hangup("abc-123", "NORMAL_CLEARING"))
        .await;

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("hangup dispatched")
        .unwrap();
    assert_eq!(event.event_type(), Some(EslEventType::ChannelHangup));
    assert_eq!(event.unique_id(), Some("abc-123"));
    assert_eq!(event.hangup_cause(), Some("NORMAL_CLEARING"));

    assert!(handle.shutdown().await);
    assert!(rx
        .try_recv()
        .is_err());
}

#[tokio::test]
async fn reconnects_after_connection_loss() {
    let switch = MockSwitch::bind().await;
    let connector = FlakyConnector::new(TcpConnector::for_events(&switch.config()), 0);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = EventListener::new(connector.clone(), Collect(tx))
        .with_policy(FixedDelay::new(RETRY))
        .spawn();

    let first = accept_subscription(&switch, &handle).await;
    let mut state = handle.subscribe_state();
    first
        .close()
        .await;
    state
        .wait_for(|s| *s != ListenerState::Subscribed)
        .await
        .unwrap();

    let mut second = accept_subscription(&switch, &handle).await;
    assert_eq!(
        connector
            .attempts()
            .len(),
        2
    );

    second
        .send_event(&hangup("def-456", "USER_BUSY"))
        .await;
    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("hangup dispatched")
        .unwrap();
    assert_eq!(event.unique_id(), Some("def-456"));

    assert!(handle.shutdown().await);
}

#[tokio::test]
async fn json_subscription_dispatches_hangups() {
    let switch = MockSwitch::bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = EventListener::new(TcpConnector::for_events(&switch.config()), Collect(tx))
        .with_policy(FixedDelay::new(RETRY))
        .with_format(EventFormat::Json)
        .spawn();

    let mut session = switch
        .accept()
        .await;
    assert_eq!(
        session
            .read_command()
            .await
            .as_deref(),
        Some("event json CHANNEL_HANGUP HEARTBEAT")
    );
    session
        .reply("+OK event listener enabled json")
        .await;
    session
        .send_json_event(
            r#"{"Event-Name":"CHANNEL_HANGUP","Unique-ID":"json-1","Hangup-Cause":"NO_ANSWER"}"#,
        )
        .await;

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("hangup dispatched")
        .unwrap();
    assert_eq!(event.unique_id(), Some("json-1"));
    assert_eq!(event.hangup_cause(), Some("NO_ANSWER"));

    assert!(handle.shutdown().await);
}

#[tokio::test]
async fn lowercase_event_name_is_not_dispatched() {
    let switch = MockSwitch::bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = EventListener::new(TcpConnector::for_events(&switch.config()), Collect(tx))
        .with_policy(FixedDelay::new(RETRY))
        .spawn();

    let mut session = accept_subscription(&switch, &handle).await;
    let mut lowercase = EslEvent::new();
    lowercase.set_header("Event-Name", "channel_hangup");
    lowercase.set_header("Unique-ID", "lower-1");
    session
        .send_event(&lowercase)
        .await;
    session
        .send_event(&hangup("upper-1", "NORMAL_CLEARING"))
        .await;

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("hangup dispatched")
        .unwrap();
    assert_eq!(event.unique_id(), Some("upper-1"));

    assert!(handle.shutdown().await);
    assert!(rx
        .try_recv()
        .is_err());
}

/// Sleeps, then records that it finished.
struct Slow {
    delay: Duration,
    finished: Arc<AtomicBool>,
}

impl EventHandler for Slow {
    fn handle(&self, _event: EslEvent) -> impl Future<Output = ()> + Send {
        let delay = self.delay;
        let finished = self
            .finished
            .clone();
        async move {
            tokio::time::sleep(delay).await;
            finished.store(true, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn shutdown_drains_running_handlers() {
    let switch = MockSwitch::bind().await;
    let finished = Arc::new(AtomicBool::new(false));
    let handle = EventListener::new(
        TcpConnector::for_events(&switch.config()),
        Slow {
            delay: Duration::from_millis(200),
            finished: finished.clone(),
        },
    )
    .with_policy(FixedDelay::new(RETRY))
    .spawn();

    let mut session = accept_subscription(&switch, &handle).await;
    session
        .send_event(&hangup("abc", "NORMAL_CLEARING"))
        .await;
    wait_in_flight(&handle, 1).await;

    assert!(handle.shutdown().await);
    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn shutdown_gives_up_on_stuck_handlers() {
    let switch = MockSwitch::bind().await;
    let finished = Arc::new(AtomicBool::new(false));
    let handle = EventListener::new(
        TcpConnector::for_events(&switch.config()),
        Slow {
            delay: Duration::from_secs(30),
            finished: finished.clone(),
        },
    )
    .with_policy(FixedDelay::new(RETRY))
    .with_shutdown_timeout(Duration::from_millis(50))
    .spawn();

    let mut session = accept_subscription(&switch, &handle).await;
    session
        .send_event(&hangup("abc", "NORMAL_CLEARING"))
        .await;
    wait_in_flight(&handle, 1).await;

    assert!(!handle.shutdown().await);
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn handlers_are_bounded() {
    let switch = MockSwitch::bind().await;
    let finished = Arc::new(AtomicBool::new(false));
    let handle = EventListener::new(
        TcpConnector::for_events(&switch.config()),
        Slow {
            delay: Duration::from_millis(300),
            finished: finished.clone(),
        },
    )
    .with_policy(FixedDelay::new(RETRY))
    .with_max_in_flight(1)
    .spawn();

    let mut session = accept_subscription(&switch, &handle).await;
    session
        .send_event(&hangup("one", "NORMAL_CLEARING"))
        .await;
    session
        .send_event(&hangup("two", "NORMAL_CLEARING"))
        .await;
    wait_in_flight(&handle, 1).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.in_flight(), 1);

    assert!(handle.shutdown().await);
}
