//! Call origination and status queries, each on its own short-lived connection

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    call::{CallId, CallStatus},
    config::SwitchConfig,
    connection::{EslClient, EslConnectOptions, EslEventStream},
    constants::DEFAULT_ORIGINATE_TIMEOUT,
    error::{EslResult, OriginateError, StatusError},
    headers::EventHeader,
    response::{parse_call_id, parse_key_values},
    variables::ChannelVariable,
};

/// Source of authenticated ESL connections.
///
/// [`TcpConnector`] dials the configured switch; tests substitute their own
/// to inject dial failures.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = EslResult<(EslClient, EslEventStream)>> + Send;
}

impl<C: Connector> Connector for Arc<C> {
    fn connect(&self) -> impl Future<Output = EslResult<(EslClient, EslEventStream)>> + Send {
        (**self).connect()
    }
}

/// Dials `host:port` and authenticates with the shared secret.
#[derive(Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    password: String,
    options: EslConnectOptions,
}

impl std::fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl TcpConnector {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        password: impl Into<String>,
        options: EslConnectOptions,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            options,
        }
    }

    /// Connector for short-lived command connections.
    pub fn for_commands(config: &SwitchConfig) -> Self {
        Self::new(
            &config.host,
            config.port,
            &config.password,
            config.command_options(),
        )
    }

    /// Connector for the long-lived event connection.
    pub fn for_events(config: &SwitchConfig) -> Self {
        Self::new(
            &config.host,
            config.port,
            &config.password,
            config.event_options(),
        )
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> impl Future<Output = EslResult<(EslClient, EslEventStream)>> + Send {
        EslClient::connect(&self.host, self.port, &self.password, &self.options)
    }
}

/// A connection that is closed when dropped.
///
/// Every exit path of a command, including early returns and cancellation,
/// releases the socket.
pub struct CommandSession {
    client: EslClient,
    _events: EslEventStream,
}

impl CommandSession {
    pub fn new(client: EslClient, events: EslEventStream) -> Self {
        Self {
            client,
            _events: events,
        }
    }

    /// Close now and wait for the write half to shut down.
    pub async fn close(self) {
        self.client
            .close()
            .await;
    }
}

impl Deref for CommandSession {
    type Target = EslClient;

    fn deref(&self) -> &EslClient {
        &self.client
    }
}

impl Drop for CommandSession {
    fn drop(&mut self) {
        self.client
            .abort();
    }
}

/// `originate` dial string bridging `caller` to `callee`.
///
/// Both numbers are substituted verbatim.
pub fn originate_command(caller: &str, callee: &str, domain: &str) -> String {
    format!(
        "originate {{{}={}}}user/{}@{} &bridge(user/{}@{})",
        ChannelVariable::OriginationCallerIdNumber,
        caller,
        caller,
        domain,
        callee,
        domain
    )
}

pub fn uuid_dump_command(uuid: &str) -> String {
    format!("uuid_dump {}", uuid)
}

/// Build a [`CallStatus`] from `uuid_dump` output.
///
/// Header names must match exactly; anything missing stays `None`, as does
/// a `variable_billsec` that is not an integer.
pub fn call_status_from_dump(uuid: &str, body: &str) -> CallStatus {
    let fields = parse_key_values(body);
    let field = |name: &str| {
        fields
            .get(name)
            .cloned()
    };

    CallStatus {
        uuid: uuid.to_string(),
        caller: field(EventHeader::CallerCallerIdNumber.as_str()),
        callee: field(EventHeader::CallerDestinationNumber.as_str()),
        state: field(EventHeader::ChannelState.as_str()),
        call_direction: field(EventHeader::CallDirection.as_str()),
        created_time: field(EventHeader::CallerChannelCreatedTime.as_str()),
        answered_time: field(EventHeader::CallerChannelAnsweredTime.as_str()),
        duration: fields
            .get(&ChannelVariable::Billsec.header_name())
            .and_then(|v| v.parse().ok()),
    }
}

/// Issues call-control commands, one fresh connection per call.
#[derive(Debug, Clone)]
pub struct CommandClient<C = TcpConnector> {
    connector: C,
    endpoint_domain: String,
    originate_timeout: Duration,
}

impl CommandClient<TcpConnector> {
    pub fn from_config(config: &SwitchConfig) -> Self {
        Self::new(
            TcpConnector::for_commands(config),
            config
                .endpoint_domain
                .clone(),
        )
        .with_originate_timeout(config.originate_timeout)
    }
}

impl<C: Connector> CommandClient<C> {
    pub fn new(connector: C, endpoint_domain: impl Into<String>) -> Self {
        Self {
            connector,
            endpoint_domain: endpoint_domain.into(),
            originate_timeout: DEFAULT_ORIGINATE_TIMEOUT,
        }
    }

    /// Reply deadline for `originate`. Other commands keep the connection's
    /// `command_timeout`.
    pub fn with_originate_timeout(mut self, timeout: Duration) -> Self {
        self.originate_timeout = timeout;
        self
    }

    pub fn endpoint_domain(&self) -> &str {
        &self.endpoint_domain
    }

    async fn open(&self) -> EslResult<CommandSession> {
        let (client, events) = self
            .connector
            .connect()
            .await?;
        Ok(CommandSession::new(client, events))
    }

    /// Place a call from `caller` and bridge it to `callee`.
    ///
    /// Returns the UUID FreeSWITCH assigned to the new channel.
    pub async fn originate(&self, caller: &str, callee: &str) -> Result<CallId, OriginateError> {
        let session = self
            .open()
            .await
            .map_err(OriginateError::Connect)?;

        let command = originate_command(caller, callee, &self.endpoint_domain);
        let result = session
            .api_with_timeout(&command, self.originate_timeout)
            .await;
        session
            .close()
            .await;

        let body = result
            .map_err(|e| {
                warn!("Failed to originate call: {}", e);
                OriginateError::Send(e)
            })?
            .body_string();

        match parse_call_id(&body) {
            Some(call_id) => {
                info!("Originated call {} ({} -> {})", call_id, caller, callee);
                Ok(call_id)
            }
            None => {
                warn!("Originate returned no call ID: {:?}", body.trim());
                Err(OriginateError::NoCallId { body })
            }
        }
    }

    /// Snapshot of a live call, from `uuid_dump`.
    pub async fn call_status(&self, uuid: &str) -> Result<CallStatus, StatusError> {
        let session = self
            .open()
            .await
            .map_err(StatusError::Connect)?;

        let result = session
            .api(&uuid_dump_command(uuid))
            .await;
        session
            .close()
            .await;

        let body = result
            .map_err(StatusError::Send)?
            .body_string();
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed.starts_with("-ERR") {
            debug!("uuid_dump {} returned {:?}", uuid, trimmed);
            return Err(StatusError::NotFound {
                uuid: uuid.to_string(),
            });
        }

        Ok(call_status_from_dump(uuid, &body))
    }
}
