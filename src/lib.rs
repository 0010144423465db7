//! Call control over the FreeSWITCH Event Socket (ESL)
//!
//! Places calls, queries live call state and follows call hangups on a
//! FreeSWITCH instance through its inbound Event Socket.
//!
//! # Architecture
//!
//! - [`EslClient`] / [`EslEventStream`]: one authenticated ESL connection,
//!   split into a cloneable command side and a background event reader.
//! - [`CommandClient`]: `originate` and `uuid_dump`, each on a fresh
//!   short-lived connection.
//! - [`EventListener`]: a supervised, reconnecting subscription to
//!   `CHANNEL_HANGUP` that hands each event to an [`EventHandler`].
//! - [`CallManager`]: both of the above behind one handle built from a
//!   [`SwitchConfig`].
//!
//! # Examples
//!
//! ## Placing a call
//!
//! ```rust,no_run
//! use freeswitch_call_control::{CallManager, SwitchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = CallManager::new(SwitchConfig::from_env()?);
//!
//!     let call_id = manager.originate("1000", "1001").await?;
//!     let status = manager.call_status(call_id.as_str()).await?;
//!     println!("{}", serde_json::to_string_pretty(&status)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Following hangups
//!
//! ```rust,no_run
//! use freeswitch_call_control::{CallManager, HangupLogger, SwitchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = CallManager::new(SwitchConfig::from_env()?);
//!     let listener = manager.spawn_listener(HangupLogger);
//!
//!     tokio::signal::ctrl_c().await?;
//!     listener.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Raw ESL
//!
//! ```rust,no_run
//! use freeswitch_call_control::{EslClient, EslConnectOptions, EslError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EslError> {
//!     let (client, _events) =
//!         EslClient::connect("localhost", 8021, "ClueCon", &EslConnectOptions::default()).await?;
//!
//!     let response = client.api("status").await?;
//!     println!("Status: {}", response.body().unwrap_or("No body"));
//!     client.close().await;
//!     Ok(())
//! }
//! ```

#[macro_use]
mod macros;

pub mod call;
pub mod channel;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod hangup;
pub mod headers;
pub mod listener;
pub mod manager;
pub mod response;
pub mod variables;

pub(crate) mod buffer;
pub(crate) mod command;
pub mod constants;
pub(crate) mod protocol;

pub use call::{CallId, CallStatus};
pub use channel::{CallDirection, ChannelState};
pub use command::{EslCommand, EslResponse, ReplyStatus};
pub use commands::{CommandClient, CommandSession, Connector, TcpConnector};
pub use config::SwitchConfig;
pub use connection::{
    ConnectionStatus, DisconnectReason, EslClient, EslConnectOptions, EslEventStream,
};
pub use constants::DEFAULT_ESL_PORT;
pub use error::{ConfigError, EslError, EslResult, FailureKind, OriginateError, StatusError};
pub use event::{EslEvent, EslEventType, EventFormat};
pub use hangup::{CallOutcome, HangupLogger, HangupSummary};
pub use headers::EventHeader;
pub use listener::{
    EventHandler, EventListener, ExponentialBackoff, FixedDelay, ListenerHandle, ListenerState,
    ReconnectPolicy,
};
pub use manager::CallManager;
pub use variables::ChannelVariable;
