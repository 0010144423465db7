//! Switch address, credentials and tuning knobs

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{
    connection::EslConnectOptions,
    constants::{
        DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_ESL_PASSWORD, DEFAULT_ESL_PORT,
        DEFAULT_LIVENESS_TIMEOUT, DEFAULT_MAX_IN_FLIGHT_HANDLERS, DEFAULT_ORIGINATE_TIMEOUT,
        DEFAULT_RETRY_DELAY, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_TIMEOUT_MS, MAX_EVENT_QUEUE_SIZE,
    },
    error::ConfigError,
    event::EventFormat,
    listener::FixedDelay,
};

pub const ENV_HOST: &str = "FS_HOST";
pub const ENV_PORT: &str = "FS_PORT";
pub const ENV_PASSWORD: &str = "FS_PASSWORD";
pub const ENV_DOMAIN: &str = "FS_DOMAIN";

/// Everything needed to reach one FreeSWITCH instance.
///
/// Read-only once built; shared by the command client and the listener.
#[derive(Clone)]
pub struct SwitchConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Domain used in `user/<ext>@<domain>` dial strings.
    pub endpoint_domain: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    /// Reply deadline for `originate`, which blocks until the call is answered.
    pub originate_timeout: Duration,
    /// Event connection only. `None` disables the check.
    pub liveness_timeout: Option<Duration>,
    pub retry_delay: Duration,
    /// Give up after this many consecutive failed connects. `None` retries forever.
    pub max_retries: Option<u32>,
    pub max_in_flight_handlers: usize,
    pub shutdown_timeout: Duration,
    pub event_format: EventFormat,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_ESL_PORT,
            password: DEFAULT_ESL_PASSWORD.to_string(),
            endpoint_domain: "127.0.0.1".to_string(),
            connect_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            originate_timeout: DEFAULT_ORIGINATE_TIMEOUT,
            liveness_timeout: Some(DEFAULT_LIVENESS_TIMEOUT),
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retries: None,
            max_in_flight_handlers: DEFAULT_MAX_IN_FLIGHT_HANDLERS,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            event_format: EventFormat::Plain,
        }
    }
}

impl fmt::Debug for SwitchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"[REDACTED]")
            .field("endpoint_domain", &self.endpoint_domain)
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .field("originate_timeout", &self.originate_timeout)
            .field("liveness_timeout", &self.liveness_timeout)
            .field("retry_delay", &self.retry_delay)
            .field("max_retries", &self.max_retries)
            .field("max_in_flight_handlers", &self.max_in_flight_handlers)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("event_format", &self.event_format)
            .finish()
    }
}

fn parse_var<T>(key: &str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}

impl SwitchConfig {
    /// Defaults overridden by `FS_HOST`, `FS_PORT`, `FS_PASSWORD` and `FS_DOMAIN`.
    ///
    /// Without `FS_DOMAIN` the dial-string domain follows the host.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(host) = lookup(ENV_HOST) {
            config.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            config.port = parse_var(ENV_PORT, port)?;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            config.password = password;
        }
        config.endpoint_domain = lookup(ENV_DOMAIN).unwrap_or_else(|| config.host.clone());
        config.validate()?;
        Ok(config)
    }

    /// Reject values no connection could work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: String, reason: &str| ConfigError {
            key: key.to_string(),
            value,
            reason: reason.to_string(),
        };
        if self
            .host
            .trim()
            .is_empty()
        {
            return Err(invalid(ENV_HOST, self.host.clone(), "must not be empty"));
        }
        if self.port == 0 {
            return Err(invalid(ENV_PORT, "0".to_string(), "must be non-zero"));
        }
        if self
            .endpoint_domain
            .trim()
            .is_empty()
        {
            return Err(invalid(
                ENV_DOMAIN,
                self.endpoint_domain
                    .clone(),
                "must not be empty",
            ));
        }
        if self.max_in_flight_handlers == 0 {
            return Err(invalid(
                "max_in_flight_handlers",
                "0".to_string(),
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Options for short-lived command connections.
    pub fn command_options(&self) -> EslConnectOptions {
        EslConnectOptions {
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
            liveness_timeout: None,
            event_queue_size: MAX_EVENT_QUEUE_SIZE,
        }
    }

    /// Options for the long-lived event connection.
    pub fn event_options(&self) -> EslConnectOptions {
        EslConnectOptions {
            liveness_timeout: self.liveness_timeout,
            ..self.command_options()
        }
    }

    pub fn reconnect_policy(&self) -> FixedDelay {
        FixedDelay {
            delay: self.retry_delay,
            max_attempts: self.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_stock_freeswitch() {
        let config = SwitchConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8021);
        assert_eq!(config.password, "ClueCon");
        assert_eq!(config.endpoint_domain, "127.0.0.1");
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.max_retries, None);
        assert_eq!(config.originate_timeout, Duration::from_secs(90));
        assert!(config.originate_timeout > config.command_timeout);
    }

    #[test]
    fn env_overrides() {
        let config = SwitchConfig::from_lookup(lookup_from(&[
            ("FS_HOST", "10.0.0.5"),
            ("FS_PORT", "8022"),
            ("FS_PASSWORD", "s3cret"),
            ("FS_DOMAIN", "pbx.example.com"),
        ]))
        .unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 8022);
        assert_eq!(config.password, "s3cret");
        assert_eq!(config.endpoint_domain, "pbx.example.com");
    }

    #[test]
    fn domain_follows_host() {
        let config = SwitchConfig::from_lookup(lookup_from(&[("FS_HOST", "192.168.1.246")])).unwrap();
        assert_eq!(config.endpoint_domain, "192.168.1.246");
    }

    #[test]
    fn invalid_port_rejected() {
        let err = SwitchConfig::from_lookup(lookup_from(&[("FS_PORT", "eighty")])).unwrap_err();
        assert_eq!(err.key, "FS_PORT");
        assert_eq!(err.value, "eighty");

        let err = SwitchConfig::from_lookup(lookup_from(&[("FS_PORT", "0")])).unwrap_err();
        assert_eq!(err.key, "FS_PORT");
    }

    #[test]
    fn debug_redacts_password() {
        let config = SwitchConfig {
            password: "hunter2".to_string(),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn options_split_by_connection_role() {
        let config = SwitchConfig::default();
        assert_eq!(config.command_options().liveness_timeout, None);
        assert_eq!(
            config
                .event_options()
                .liveness_timeout,
            Some(DEFAULT_LIVENESS_TIMEOUT)
        );
        assert_eq!(
            config
                .event_options()
                .command_timeout,
            config.command_timeout
        );
    }
}
