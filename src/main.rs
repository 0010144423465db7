use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use freeswitch_call_control::{
    config::{ENV_DOMAIN, ENV_HOST, ENV_PASSWORD, ENV_PORT},
    constants::{DEFAULT_ESL_PASSWORD, DEFAULT_ESL_PORT},
    CallManager, EventFormat, HangupLogger, ListenerHandle, ListenerState, SwitchConfig,
};

#[derive(Parser)]
#[command(name = "fs-call-control")]
#[command(about = "Originate calls, query call status and log hangups on FreeSWITCH")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    switch: SwitchArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SwitchArgs {
    /// FreeSWITCH host
    #[arg(long, env = ENV_HOST, default_value = "127.0.0.1", global = true)]
    host: String,

    /// ESL port
    #[arg(long, env = ENV_PORT, default_value_t = DEFAULT_ESL_PORT, global = true)]
    port: u16,

    /// ESL password
    #[arg(long, env = ENV_PASSWORD, default_value = DEFAULT_ESL_PASSWORD, hide_env_values = true, global = true)]
    password: String,

    /// Domain for user/<ext>@<domain> dial strings (defaults to the host)
    #[arg(long, env = ENV_DOMAIN, global = true)]
    domain: Option<String>,

    /// Dial timeout in milliseconds
    #[arg(long, default_value_t = 2000, global = true)]
    connect_timeout_ms: u64,

    /// Command reply timeout in milliseconds
    #[arg(long, default_value_t = 5000, global = true)]
    command_timeout_ms: u64,

    /// Seconds to wait for an originated call to be answered
    #[arg(long, default_value_t = 90, global = true)]
    originate_timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Log every call hangup until interrupted
    Listen {
        /// Seconds between reconnect attempts
        #[arg(long, default_value_t = 5)]
        retry_delay: u64,

        /// Stop after this many consecutive failures (retry forever if unset)
        #[arg(long)]
        max_retries: Option<u32>,

        /// Seconds without traffic before the event connection is dropped (0 disables)
        #[arg(long, default_value_t = 60)]
        liveness_timeout: u64,

        /// Event encoding: plain or json
        #[arg(long, default_value_t = EventFormat::Plain)]
        format: EventFormat,
    },
    /// Place a call from CALLER and bridge it to CALLEE
    Originate { caller: String, callee: String },
    /// Print the status of a live call as JSON
    Status { uuid: String },
}

impl SwitchArgs {
    fn into_config(self) -> Result<SwitchConfig> {
        let endpoint_domain = self
            .domain
            .unwrap_or_else(|| self.host.clone());
        let config = SwitchConfig {
            host: self.host,
            port: self.port,
            password: self.password,
            endpoint_domain,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            originate_timeout: Duration::from_secs(self.originate_timeout),
            ..Default::default()
        };
        config
            .validate()
            .context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment and flags still apply.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = cli
        .switch
        .into_config()?;

    match cli.command {
        Commands::Listen {
            retry_delay,
            max_retries,
            liveness_timeout,
            format,
        } => {
            config.retry_delay = Duration::from_secs(retry_delay);
            config.max_retries = max_retries;
            config.liveness_timeout =
                (liveness_timeout > 0).then(|| Duration::from_secs(liveness_timeout));
            config.event_format = format;
            listen(config).await
        }
        Commands::Originate { caller, callee } => {
            let call_id = CallManager::new(config)
                .originate(&caller, &callee)
                .await?;
            println!("{}", call_id);
            Ok(())
        }
        Commands::Status { uuid } => {
            let status = CallManager::new(config)
                .call_status(&uuid)
                .await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

async fn listen(config: SwitchConfig) -> Result<()> {
    info!("Using {:?}", config);
    let manager = CallManager::new(config);
    let listener = manager.spawn_listener(HangupLogger);

    let interrupted = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            info!("Interrupted, shutting down");
            true
        }
        _ = wait_stopped(&listener) => false,
    };

    if !listener
        .shutdown()
        .await
    {
        anyhow::bail!("hangup handlers did not finish in time");
    }
    if !interrupted {
        anyhow::bail!("gave up reconnecting to FreeSWITCH");
    }
    Ok(())
}

async fn wait_stopped(listener: &ListenerHandle) {
    let mut state = listener.subscribe_state();
    let _ = state
        .wait_for(|s| *s == ListenerState::Stopped)
        .await;
}
