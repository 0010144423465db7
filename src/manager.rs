//! One handle over the command client and the hangup listener

use tracing::info;

use crate::{
    call::{CallId, CallStatus},
    commands::{CommandClient, TcpConnector},
    config::SwitchConfig,
    error::{OriginateError, StatusError},
    listener::{EventHandler, EventListener, ListenerHandle},
};

/// Call control for a single FreeSWITCH instance.
///
/// Cheap to clone; the configuration is read-only after construction.
#[derive(Debug, Clone)]
pub struct CallManager {
    config: SwitchConfig,
    commands: CommandClient<TcpConnector>,
}

impl CallManager {
    pub fn new(config: SwitchConfig) -> Self {
        let commands = CommandClient::from_config(&config);
        Self { config, commands }
    }

    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    pub fn command_client(&self) -> &CommandClient<TcpConnector> {
        &self.commands
    }

    /// See [`CommandClient::originate`].
    pub async fn originate(&self, caller: &str, callee: &str) -> Result<CallId, OriginateError> {
        self.commands
            .originate(caller, callee)
            .await
    }

    /// See [`CommandClient::call_status`].
    pub async fn call_status(&self, uuid: &str) -> Result<CallStatus, StatusError> {
        self.commands
            .call_status(uuid)
            .await
    }

    /// Start a hangup listener on its own event connection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_listener<H: EventHandler>(&self, handler: H) -> ListenerHandle {
        let config = &self.config;
        info!(
            "[LISTENER] Starting hangup listener for {}:{}",
            config.host, config.port
        );
        EventListener::new(TcpConnector::for_events(config), handler)
            .with_policy(config.reconnect_policy())
            .with_format(config.event_format)
            .with_max_in_flight(config.max_in_flight_handlers)
            .with_shutdown_timeout(config.shutdown_timeout)
            .spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hangup::HangupLogger;
    use crate::listener::ListenerState;
    use std::time::Duration;

    #[test]
    fn manager_keeps_config() {
        let manager = CallManager::new(SwitchConfig {
            endpoint_domain: "pbx.example.com".into(),
            ..Default::default()
        });
        assert_eq!(manager.config().port, 8021);
        assert_eq!(
            manager
                .command_client()
                .endpoint_domain(),
            "pbx.example.com"
        );
    }

    #[tokio::test]
    async fn originate_against_closed_port_is_connect_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let port = listener
            .local_addr()
            .unwrap()
            .port();
        drop(listener);

        let manager = CallManager::new(SwitchConfig {
            port,
            ..Default::default()
        });
        let err = manager
            .originate("1000", "1001")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::Connect);
    }

    #[tokio::test]
    async fn listener_shuts_down_while_retrying() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let port = listener
            .local_addr()
            .unwrap()
            .port();
        drop(listener);

        let manager = CallManager::new(SwitchConfig {
            port,
            retry_delay: Duration::from_secs(3600),
            ..Default::default()
        });
        let handle = manager.spawn_listener(HangupLogger);
        let state = handle.subscribe_state();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_ne!(handle.state(), ListenerState::Subscribed);

        assert!(handle.shutdown().await);
        assert_eq!(*state.borrow(), ListenerState::Stopped);
    }
}
