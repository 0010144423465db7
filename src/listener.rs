//! Supervised hangup-event listener
//!
//! [`EventListener`] keeps one subscribed event connection open, reconnecting
//! on failure according to a [`ReconnectPolicy`], and hands every
//! `CHANNEL_HANGUP` to an [`EventHandler`] on its own task. Handler tasks are
//! bounded by a semaphore and tracked so shutdown can drain them.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use crate::{
    commands::Connector,
    connection::{EslClient, EslEventStream},
    constants::{DEFAULT_MAX_IN_FLIGHT_HANDLERS, DEFAULT_RETRY_DELAY, DEFAULT_SHUTDOWN_TIMEOUT},
    error::EslError,
    event::{EslEvent, EslEventType, EventFormat},
};

/// Events the listener subscribes to. `HEARTBEAT` only keeps the liveness
/// timer fed and is never dispatched.
pub const SUBSCRIBED_EVENTS: &[EslEventType] =
    &[EslEventType::ChannelHangup, EslEventType::Heartbeat];

/// Consumer of hangup notifications.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, event: EslEvent) -> impl Future<Output = ()> + Send;
}

/// Decides how long to wait before the next connection attempt.
pub trait ReconnectPolicy: Send + Sync + 'static {
    /// `failures` is the number of consecutive failures so far (at least 1).
    /// `None` stops the listener.
    fn next_delay(&self, failures: u32) -> Option<Duration>;
}

/// Same delay every time, optionally giving up after `max_attempts`
/// consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl ReconnectPolicy for FixedDelay {
    fn next_delay(&self, failures: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if failures >= max => None,
            _ => Some(self.delay),
        }
    }
}

/// Doubling delay from `initial` up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, failures: u32) -> Option<Duration> {
        if matches!(self.max_attempts, Some(max) if failures >= max) {
            return None;
        }
        let factor = 1u32
            .checked_shl(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);
        Some(
            self.initial
                .saturating_mul(factor)
                .min(self.max),
        )
    }
}

/// Where the listener currently is in its connect/subscribe cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not connected; waiting out a reconnect delay or not started yet.
    Disconnected,
    /// Dialing and authenticating.
    Connecting,
    /// Subscribed and reading events.
    Subscribed,
    /// Shut down or gave up. Terminal.
    Stopped,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerState::Disconnected => "disconnected",
            ListenerState::Connecting => "connecting",
            ListenerState::Subscribed => "subscribed",
            ListenerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Long-running hangup listener. Configure, then [`spawn`](Self::spawn).
pub struct EventListener<C, H> {
    connector: C,
    handler: Arc<H>,
    policy: Arc<dyn ReconnectPolicy>,
    format: EventFormat,
    max_in_flight: usize,
    shutdown_timeout: Duration,
}

impl<C: Connector, H: EventHandler> EventListener<C, H> {
    pub fn new(connector: C, handler: H) -> Self {
        Self {
            connector,
            handler: Arc::new(handler),
            policy: Arc::new(FixedDelay::default()),
            format: EventFormat::Plain,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT_HANDLERS,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: impl ReconnectPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn with_format(mut self, format: EventFormat) -> Self {
        self.format = format;
        self
    }

    /// Cap on concurrently running handlers. Values below 1 are raised to 1.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// How long [`ListenerHandle::shutdown`] waits for running handlers.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Start the listener on the current runtime.
    pub fn spawn(self) -> ListenerHandle {
        let (state_tx, state_rx) = watch::channel(ListenerState::Disconnected);
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let worker = ListenerWorker {
            connector: self.connector,
            handler: self.handler,
            policy: self.policy,
            format: self.format,
            permits: Arc::new(Semaphore::new(self.max_in_flight)),
            tracker: tracker.clone(),
            state_tx,
            cancel: cancel.clone(),
        };
        let join = tokio::spawn(worker.run());

        ListenerHandle {
            cancel,
            state_rx,
            tracker,
            join,
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

/// Control handle of a running [`EventListener`].
///
/// Dropping the handle does not stop the listener; call
/// [`shutdown`](Self::shutdown).
pub struct ListenerHandle {
    cancel: CancellationToken,
    state_rx: watch::Receiver<ListenerState>,
    tracker: TaskTracker,
    join: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl ListenerHandle {
    pub fn state(&self) -> ListenerState {
        *self
            .state_rx
            .borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state_rx
            .clone()
    }

    /// Handler tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.tracker
            .len()
    }

    /// True once the listener stopped on its own or was shut down.
    pub fn is_finished(&self) -> bool {
        self.join
            .is_finished()
    }

    /// Stop reconnecting, close the connection and wait up to the shutdown
    /// timeout for running handlers.
    ///
    /// Returns `false` if handlers were still running when the timeout hit.
    pub async fn shutdown(self) -> bool {
        info!("[LISTENER] Shutting down");
        self.cancel
            .cancel();
        if let Err(e) = self
            .join
            .await
        {
            warn!("[LISTENER] Listener task ended abnormally: {}", e);
        }

        self.tracker
            .close();
        let pending = self
            .tracker
            .len();
        if pending > 0 {
            debug!("[LISTENER] Waiting for {} handler(s)", pending);
        }
        match tokio::time::timeout(
            self.shutdown_timeout,
            self.tracker
                .wait(),
        )
        .await
        {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "[LISTENER] {} handler(s) still running after {:?}",
                    self.tracker
                        .len(),
                    self.shutdown_timeout
                );
                false
            }
        }
    }
}

/// How one connection ended.
enum SessionEnd {
    Cancelled,
    /// The subscription command itself failed.
    SubscribeFailed(EslError),
    /// The connection died after subscribing.
    Lost(EslError),
}

struct ListenerWorker<C, H> {
    connector: C,
    handler: Arc<H>,
    policy: Arc<dyn ReconnectPolicy>,
    format: EventFormat,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    state_tx: watch::Sender<ListenerState>,
    cancel: CancellationToken,
}

impl<C: Connector, H: EventHandler> ListenerWorker<C, H> {
    fn set_state(&self, state: ListenerState) {
        debug!("[LISTENER] -> {}", state);
        self.state_tx
            .send_replace(state);
    }

    async fn run(self) {
        // Consecutive failures since the last successful subscription.
        let mut failures: u32 = 0;

        loop {
            self.set_state(ListenerState::Connecting);
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            match connected {
                Ok((client, events)) => {
                    let end = self
                        .serve(&client, events)
                        .await;
                    client
                        .close()
                        .await;
                    match end {
                        SessionEnd::Cancelled => break,
                        SessionEnd::SubscribeFailed(e) => {
                            failures += 1;
                            warn!(
                                "[LISTENER] Failed to subscribe to events (attempt {}): {}",
                                failures, e
                            );
                        }
                        SessionEnd::Lost(e) => {
                            failures = 1;
                            warn!("[LISTENER] Event connection lost: {}", e);
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        "[LISTENER] Failed to connect to FreeSWITCH (attempt {}): {}",
                        failures, e
                    );
                }
            }

            self.set_state(ListenerState::Disconnected);
            let Some(delay) = self
                .policy
                .next_delay(failures)
            else {
                error!(
                    "[LISTENER] Giving up after {} consecutive failures",
                    failures
                );
                break;
            };
            debug!("[LISTENER] Reconnecting in {:?}", delay);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ListenerState::Stopped);
        info!("[LISTENER] Stopped");
    }

    /// Subscribe, then pump events until the connection fails or shutdown
    /// is requested.
    async fn serve(&self, client: &EslClient, mut events: EslEventStream) -> SessionEnd {
        let subscribed = tokio::select! {
            _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
            result = client.subscribe_events(self.format, SUBSCRIBED_EVENTS) => result,
        };
        if let Err(e) = subscribed {
            return SessionEnd::SubscribeFailed(e);
        }
        self.set_state(ListenerState::Subscribed);
        info!("[LISTENER] Listening for hangup events");

        loop {
            let item = tokio::select! {
                _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
                item = events.read_event() => item,
            };
            match item {
                Ok(event) => {
                    if !self
                        .dispatch(event)
                        .await
                    {
                        return SessionEnd::Cancelled;
                    }
                }
                Err(EslError::QueueFull) => {
                    warn!(
                        "[LISTENER] Fell behind, {} event(s) dropped so far",
                        client.dropped_event_count()
                    );
                }
                Err(e) => return SessionEnd::Lost(e),
            }
        }
    }

    /// Hand a hangup event to the handler on its own task. Waits for a free
    /// slot when the in-flight limit is reached.
    ///
    /// Returns `false` if shutdown was requested while waiting.
    async fn dispatch(&self, event: EslEvent) -> bool {
        match event.event_type() {
            Some(event_type) if event_type.is_hangup() => {}
            Some(EslEventType::Heartbeat) => {
                trace!("[LISTENER] Heartbeat");
                return true;
            }
            other => {
                debug!("[LISTENER] Ignoring event {:?}", other);
                return true;
            }
        }

        let permit = tokio::select! {
            _ = self.cancel.cancelled() => return false,
            permit = self.permits.clone().acquire_owned() => permit,
        };
        let Ok(permit) = permit else {
            return false;
        };

        trace!(
            "[LISTENER] Dispatching hangup of {}",
            event
                .unique_id()
                .unwrap_or("<unknown>")
        );
        let handler = self
            .handler
            .clone();
        self.tracker
            .spawn(async move {
                handler
                    .handle(event)
                    .await;
                drop(permit);
            });
        true
    }
}
