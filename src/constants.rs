//! Protocol constants and configuration defaults

use std::time::Duration;

/// Default FreeSWITCH ESL port for inbound connections
pub const DEFAULT_ESL_PORT: u16 = 8021;

/// Default ESL password shipped with FreeSWITCH
pub const DEFAULT_ESL_PASSWORD: &str = "ClueCon";

/// Socket buffer size for reading from TCP stream (64KB) - standard TCP receive window
pub const SOCKET_BUF_SIZE: usize = 65536;

/// Buffer allocation size (64KB) - used for both initial allocation and growth increments
pub const BUF_CHUNK: usize = 64 * 1024;

/// Maximum single message size (8MB) - validates Content-Length header
/// No legitimate ESL message should exceed this (largest is sofia status ~1-2MB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Maximum total buffer size (16MB) - should hold 2 max messages + overhead.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Protocol message terminator
pub const HEADER_TERMINATOR: &str = "\n\n";

/// Content-Type header values
pub const CONTENT_TYPE_AUTH_REQUEST: &str = "auth/request";
pub const CONTENT_TYPE_COMMAND_REPLY: &str = "command/reply";
pub const CONTENT_TYPE_API_RESPONSE: &str = "api/response";
pub const CONTENT_TYPE_TEXT_EVENT_PLAIN: &str = "text/event-plain";
pub const CONTENT_TYPE_TEXT_EVENT_JSON: &str = "text/event-json";
pub const CONTENT_TYPE_DISCONNECT_NOTICE: &str = "text/disconnect-notice";

/// Protocol framing header: message kind.
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
/// Protocol framing header: body length.
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
/// Protocol framing header: command reply status.
pub const HEADER_REPLY_TEXT: &str = "Reply-Text";
/// Protocol framing header: disconnect notice disposition.
pub const HEADER_CONTENT_DISPOSITION: &str = "Content-Disposition";

/// Hangup cause reported for a normally cleared call
pub const NORMAL_CLEARING: &str = "NORMAL_CLEARING";

/// TCP connect timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Command reply timeout in milliseconds
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5000;

/// Reply deadline for `api originate`. FreeSWITCH answers only once the
/// A-leg picks up or its own originate timeout (60s) expires.
pub const DEFAULT_ORIGINATE_TIMEOUT: Duration = Duration::from_secs(90);

/// Event connection liveness window. Must exceed the HEARTBEAT interval
/// (20s by default in FreeSWITCH).
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between reconnect attempts of the event listener
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on concurrently running hangup handlers
pub const DEFAULT_MAX_IN_FLIGHT_HANDLERS: usize = 64;

/// How long shutdown waits for in-flight handlers to finish
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of queued events before dropping
pub const MAX_EVENT_QUEUE_SIZE: usize = 1000;
