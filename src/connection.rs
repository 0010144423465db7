//! Authenticated ESL connection: command writer plus background reader task

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    command::{EslCommand, EslResponse},
    constants::{
        DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_TIMEOUT_MS, HEADER_CONTENT_DISPOSITION,
        MAX_EVENT_QUEUE_SIZE, SOCKET_BUF_SIZE,
    },
    error::{EslError, EslResult},
    event::{EslEvent, EslEventType, EventFormat},
    protocol::{EslMessage, EslParser, MessageType},
};

/// Connection status published by the reader task.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// ESL session is active.
    Connected,
    /// ESL session ended.
    Disconnected(DisconnectReason),
}

/// Why the reader task stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Server sent `text/disconnect-notice`
    ServerNotice,
    /// No inbound traffic within the liveness timeout
    HeartbeatExpired,
    /// Socket or framing error, stored as text since `io::Error` is not `Clone`
    IoError(String),
    /// Clean EOF
    ConnectionClosed,
    /// [`EslClient::close`] or [`EslClient::abort`] was called
    ClientRequested,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ServerNotice => write!(f, "server sent disconnect notice"),
            DisconnectReason::HeartbeatExpired => write!(f, "liveness timeout expired"),
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::ClientRequested => write!(f, "client requested disconnect"),
        }
    }
}

/// Per-connection timing and queue settings.
#[derive(Debug, Clone)]
pub struct EslConnectOptions {
    /// Bound on TCP dial and on each read of the auth handshake. Default: 2s.
    pub connect_timeout: Duration,
    /// Bound on waiting for a command reply. Default: 5s.
    pub command_timeout: Duration,
    /// Disconnect when nothing arrives for this long. `None` disables.
    pub liveness_timeout: Option<Duration>,
    /// Capacity of the event channel. Default: 1000.
    pub event_queue_size: usize,
}

impl Default for EslConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            liveness_timeout: None,
            event_queue_size: MAX_EVENT_QUEUE_SIZE,
        }
    }
}

struct SharedState {
    pending_reply: Mutex<Option<oneshot::Sender<EslMessage>>>,
    event_overflow: AtomicBool,
    dropped_event_count: AtomicU64,
    cancel: CancellationToken,
}

/// Command half of a connection (`Clone + Send`).
///
/// Commands are serialized through the writer mutex; the reader task routes
/// each reply to the single pending oneshot slot.
#[derive(Clone)]
pub struct EslClient {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    shared: Arc<SharedState>,
    status_rx: watch::Receiver<ConnectionStatus>,
    command_timeout: Duration,
}

impl std::fmt::Debug for EslClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EslClient")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Event half of a connection (`!Clone`).
pub struct EslEventStream {
    rx: mpsc::Receiver<Result<EslEvent, EslError>>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl std::fmt::Debug for EslEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EslEventStream")
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

async fn tcp_connect_with_timeout(host: &str, port: u16, limit: Duration) -> EslResult<TcpStream> {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            debug!("[CONNECT] TCP connection established");
            Ok(stream)
        }
        Ok(Err(e)) => {
            warn!("[CONNECT] TCP connect to {}:{} failed: {}", host, port, e);
            Err(EslError::Io(e))
        }
        Err(_) => {
            warn!(
                "[CONNECT] TCP connect to {}:{} timed out after {}ms",
                host,
                port,
                millis(limit)
            );
            Err(EslError::Timeout {
                timeout_ms: millis(limit),
            })
        }
    }
}

/// Read one frame during the handshake, before the stream is split.
async fn recv_message(
    stream: &mut TcpStream,
    parser: &mut EslParser,
    read_buffer: &mut [u8],
    limit: Duration,
) -> EslResult<EslMessage> {
    loop {
        if let Some(message) = parser.parse_message()? {
            trace!("[RECV] {:?}", message.message_type);
            return Ok(message);
        }

        let bytes_read = match timeout(limit, stream.read(read_buffer)).await {
            Ok(Ok(0)) => return Err(EslError::ConnectionClosed),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(EslError::Io(e)),
            Err(_) => {
                return Err(EslError::Timeout {
                    timeout_ms: millis(limit),
                })
            }
        };
        trace!("[RECV] Read {} bytes from socket", bytes_read);
        parser.add_data(&read_buffer[..bytes_read])?;
    }
}

async fn authenticate(
    stream: &mut TcpStream,
    parser: &mut EslParser,
    password: &str,
    limit: Duration,
) -> EslResult<()> {
    let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];

    debug!("[AUTH] Waiting for auth request from FreeSWITCH");
    let greeting = recv_message(stream, parser, &mut read_buffer, limit).await?;
    if greeting.message_type != MessageType::AuthRequest {
        return Err(EslError::protocol_error(format!(
            "Expected auth request, got {:?}",
            greeting.message_type
        )));
    }

    let auth = EslCommand::Auth {
        password: password.to_string(),
    };
    let wire = auth.to_wire_format()?;
    debug!("[AUTH] Sending {}", auth.describe());
    stream
        .write_all(wire.as_bytes())
        .await?;

    let response = recv_message(stream, parser, &mut read_buffer, limit)
        .await?
        .into_response();
    if !response.is_success() {
        return Err(EslError::auth_failed(
            response
                .reply_text()
                .unwrap_or("authentication rejected"),
        ));
    }

    debug!("[AUTH] Authentication accepted");
    Ok(())
}

/// Non-blocking hand-off to the event channel.
///
/// A full channel drops the item and arms a one-shot `QueueFull` notice that
/// is delivered ahead of the next event. Returns `false` once the receiver is
/// gone.
fn dispatch_event(
    event_tx: &mpsc::Sender<Result<EslEvent, EslError>>,
    shared: &SharedState,
    item: Result<EslEvent, EslError>,
) -> bool {
    use mpsc::error::TrySendError;

    if shared
        .event_overflow
        .load(Ordering::Relaxed)
    {
        match event_tx.try_send(Err(EslError::QueueFull)) {
            Ok(()) => shared
                .event_overflow
                .store(false, Ordering::Relaxed),
            Err(TrySendError::Closed(_)) => return false,
            Err(TrySendError::Full(_)) => {}
        }
    }

    match event_tx.try_send(item) {
        Ok(()) => true,
        Err(TrySendError::Closed(_)) => false,
        Err(TrySendError::Full(_)) => {
            shared
                .event_overflow
                .store(true, Ordering::Relaxed);
            shared
                .dropped_event_count
                .fetch_add(1, Ordering::Relaxed);
            warn!("[RECV] Event queue full, dropping event");
            true
        }
    }
}

/// Resolves when the liveness deadline passes; never resolves when disabled.
async fn liveness_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn reader_loop(
    reader: OwnedReadHalf,
    parser: EslParser,
    shared: Arc<SharedState>,
    status_tx: watch::Sender<ConnectionStatus>,
    event_tx: mpsc::Sender<Result<EslEvent, EslError>>,
    liveness: Option<Duration>,
) {
    let inner = std::panic::AssertUnwindSafe(reader_loop_inner(
        reader,
        parser,
        shared.clone(),
        &event_tx,
        liveness,
    ));
    let reason = match futures_util::FutureExt::catch_unwind(inner).await {
        Ok(reason) => reason,
        Err(_) => {
            tracing::error!("[RECV] reader task panicked");
            DisconnectReason::IoError("reader task panicked".to_string())
        }
    };

    debug!("[RECV] Reader exiting: {}", reason);
    // Fail any command still waiting for a reply instead of letting it time out.
    shared
        .pending_reply
        .lock()
        .await
        .take();
    let _ = status_tx.send(ConnectionStatus::Disconnected(reason));
    // Close the event channel only after the reason is observable.
    drop(event_tx);
}

async fn reader_loop_inner(
    mut reader: OwnedReadHalf,
    mut parser: EslParser,
    shared: Arc<SharedState>,
    event_tx: &mpsc::Sender<Result<EslEvent, EslError>>,
    liveness: Option<Duration>,
) -> DisconnectReason {
    let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];
    let mut last_recv = Instant::now();

    loop {
        match parser.parse_message() {
            Ok(Some(message)) => {
                match message.message_type {
                    MessageType::Event => {
                        let format = message.event_format();
                        let event = parser.parse_event(message, format);
                        if !dispatch_event(event_tx, &shared, event) {
                            debug!("[RECV] Event receiver dropped");
                            return DisconnectReason::ClientRequested;
                        }
                    }
                    MessageType::CommandReply | MessageType::ApiResponse => {
                        match shared
                            .pending_reply
                            .lock()
                            .await
                            .take()
                        {
                            Some(tx) => {
                                let _ = tx.send(message);
                            }
                            None => warn!(
                                "[RECV] {:?} arrived with no command pending",
                                message.message_type
                            ),
                        }
                    }
                    MessageType::Disconnect => {
                        let disposition = message
                            .headers
                            .get(HEADER_CONTENT_DISPOSITION)
                            .map(String::as_str);
                        if disposition == Some("linger") {
                            debug!("[RECV] Disconnect notice with linger disposition, ignoring");
                            continue;
                        }
                        info!("[RECV] Disconnect notice from server");
                        return DisconnectReason::ServerNotice;
                    }
                    MessageType::AuthRequest | MessageType::Unknown(_) => {
                        debug!("[RECV] Ignoring {:?}", message.message_type);
                    }
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("[RECV] Parser error: {}", e);
                return DisconnectReason::IoError(e.to_string());
            }
        }

        let deadline = liveness.map(|d| last_recv + d);
        tokio::select! {
            _ = shared.cancel.cancelled() => {
                return DisconnectReason::ClientRequested;
            }
            _ = liveness_deadline(deadline) => {
                warn!(
                    "[RECV] No traffic for {}ms, giving up on connection",
                    last_recv.elapsed().as_millis()
                );
                return DisconnectReason::HeartbeatExpired;
            }
            read = reader.read(&mut read_buffer) => match read {
                Ok(0) => {
                    info!("[RECV] Connection closed (EOF)");
                    return DisconnectReason::ConnectionClosed;
                }
                Ok(n) => {
                    last_recv = Instant::now();
                    if let Err(e) = parser.add_data(&read_buffer[..n]) {
                        warn!("[RECV] Buffer error: {}", e);
                        return DisconnectReason::IoError(e.to_string());
                    }
                }
                Err(e) => {
                    warn!("[RECV] Read error: {}", e);
                    return DisconnectReason::IoError(e.to_string());
                }
            }
        }
    }
}

impl EslClient {
    /// Dial FreeSWITCH in inbound mode and authenticate with `password`.
    ///
    /// Fails with [`EslError::Io`] or [`EslError::Timeout`] when the switch
    /// is unreachable and [`EslError::AuthFailed`] when the password is
    /// rejected.
    pub async fn connect(
        host: &str,
        port: u16,
        password: &str,
        options: &EslConnectOptions,
    ) -> EslResult<(Self, EslEventStream)> {
        info!("[CONNECT] Connecting to FreeSWITCH at {}:{}", host, port);

        let mut stream = tcp_connect_with_timeout(host, port, options.connect_timeout).await?;
        let mut parser = EslParser::new();
        authenticate(&mut stream, &mut parser, password, options.connect_timeout).await?;

        info!("[CONNECT] Authenticated to FreeSWITCH at {}:{}", host, port);
        Ok(Self::split_and_spawn(stream, parser, options))
    }

    fn split_and_spawn(
        stream: TcpStream,
        parser: EslParser,
        options: &EslConnectOptions,
    ) -> (Self, EslEventStream) {
        let (read_half, write_half) = stream.into_split();

        let shared = Arc::new(SharedState {
            pending_reply: Mutex::new(None),
            event_overflow: AtomicBool::new(false),
            dropped_event_count: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        });
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);
        let (event_tx, event_rx) = mpsc::channel(
            options
                .event_queue_size
                .max(1),
        );

        tokio::spawn(reader_loop(
            read_half,
            parser,
            shared.clone(),
            status_tx,
            event_tx,
            options.liveness_timeout,
        ));

        let client = EslClient {
            writer: Arc::new(Mutex::new(write_half)),
            shared,
            status_rx: status_rx.clone(),
            command_timeout: options.command_timeout,
        };
        let events = EslEventStream {
            rx: event_rx,
            status_rx,
        };
        (client, events)
    }

    /// Send a command and wait for its reply.
    ///
    /// The writer lock is held for the whole exchange; ESL answers commands
    /// strictly in order and there is only one reply slot.
    pub async fn send_command(&self, command: EslCommand) -> EslResult<EslResponse> {
        self.send_command_with_timeout(command, self.command_timeout)
            .await
    }

    /// [`send_command`](Self::send_command) with its own deadline instead of
    /// the connection's `command_timeout`.
    ///
    /// The deadline covers writing the command as well as waiting for the
    /// reply. On expiry the connection should be treated as dead.
    pub async fn send_command_with_timeout(
        &self,
        command: EslCommand,
        limit: Duration,
    ) -> EslResult<EslResponse> {
        if !self.is_connected() {
            return Err(EslError::NotConnected);
        }

        let wire = command.to_wire_format()?;
        debug!("[SEND] {}", command.describe());

        let mut writer = self
            .writer
            .lock()
            .await;

        let (tx, rx) = oneshot::channel();
        *self
            .shared
            .pending_reply
            .lock()
            .await = Some(tx);

        let exchange = async {
            writer
                .write_all(wire.as_bytes())
                .await?;
            rx.await
                .map_err(|_| EslError::ConnectionClosed)
        };
        let result = match timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "[SEND] No reply to '{}' within {}ms",
                    command.describe(),
                    millis(limit)
                );
                Err(EslError::Timeout {
                    timeout_ms: millis(limit),
                })
            }
        };
        if result.is_err() {
            self.shared
                .pending_reply
                .lock()
                .await
                .take();
        }
        drop(writer);

        let response = result?.into_response();
        debug!("[RECV] Reply success={}", response.is_success());
        Ok(response)
    }

    /// Run a blocking `api` command; its output is the response body.
    pub async fn api(&self, command: &str) -> EslResult<EslResponse> {
        self.api_with_timeout(command, self.command_timeout)
            .await
    }

    /// [`api`](Self::api) with its own reply deadline, for commands such as
    /// `originate` that FreeSWITCH answers only once the call is set up.
    pub async fn api_with_timeout(&self, command: &str, limit: Duration) -> EslResult<EslResponse> {
        self.send_command_with_timeout(
            EslCommand::Api {
                command: command.to_string(),
            },
            limit,
        )
        .await
    }

    /// Subscribe this connection to `events` in the given `format`.
    ///
    /// A negative reply is logged and otherwise ignored; only transport
    /// failures are returned.
    pub async fn subscribe_events(
        &self,
        format: EventFormat,
        events: &[EslEventType],
    ) -> EslResult<()> {
        let names = events
            .iter()
            .map(EslEventType::as_str)
            .collect::<Vec<_>>()
            .join(" ");

        let response = self
            .send_command(EslCommand::Events {
                format,
                events: names.clone(),
            })
            .await?;
        if response.is_success() {
            info!("[SUBSCRIBE] Subscribed to '{}' ({})", names, format);
        } else {
            warn!(
                "[SUBSCRIBE] Subscription to '{}' not acknowledged: {}",
                names,
                response
                    .reply_text()
                    .unwrap_or_default()
            );
        }
        Ok(())
    }

    /// Stop the reader task and shut down the write half.
    ///
    /// Safe to call more than once and on an already-dead connection.
    pub async fn close(&self) {
        if self
            .shared
            .cancel
            .is_cancelled()
        {
            return;
        }
        debug!("[CONNECT] Closing connection");
        self.abort();
        if let Err(e) = self
            .writer
            .lock()
            .await
            .shutdown()
            .await
        {
            debug!("[CONNECT] Write half shutdown: {}", e);
        }
    }

    /// Stop the reader task without waiting. The socket is released once
    /// every clone of this client is dropped.
    pub fn abort(&self) {
        self.shared
            .cancel
            .cancel();
    }

    /// Number of events dropped because the event channel was full.
    pub fn dropped_event_count(&self) -> u64 {
        self.shared
            .dropped_event_count
            .load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            *self
                .status_rx
                .borrow(),
            ConnectionStatus::Connected
        )
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_rx
            .borrow()
            .clone()
    }
}

impl EslEventStream {
    /// Next item from the reader task, `None` once the connection ended.
    ///
    /// `Err(EslError::QueueFull)` reports dropped events; frame parse errors
    /// are surfaced the same way.
    pub async fn recv(&mut self) -> Option<Result<EslEvent, EslError>> {
        self.rx
            .recv()
            .await
    }

    /// Wait for the next event.
    ///
    /// When the connection has ended the error carries the
    /// [`DisconnectReason`] reported by the reader task.
    pub async fn read_event(&mut self) -> EslResult<EslEvent> {
        match self.recv().await {
            Some(item) => item,
            None => Err(match self.status() {
                ConnectionStatus::Disconnected(reason) => EslError::Disconnected(reason),
                ConnectionStatus::Connected => EslError::ConnectionClosed,
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            *self
                .status_rx
                .borrow(),
            ConnectionStatus::Connected
        )
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_rx
            .borrow()
            .clone()
    }
}

impl futures_util::Stream for EslEventStream {
    type Item = Result<EslEvent, EslError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
    }
}
