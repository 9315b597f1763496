//! AMP plugin adapter entry point.
//!
//! Connects to the AMP broker, announces the loopback SUT's labels, and then
//! serves stimuli until the broker ends the session or the user presses
//! Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! amp-adapter --channel <CHANNEL> --name <NAME> --url <wss://...> --token <TOKEN>
//!
//! Options:
//!   --log-level <LEVEL>           error|warn|info|debug|trace or 1|2|3|4|8|15 [default: info]
//!   --extra-logs                  Also trace the WebSocket library
//!   --headless <BOOL>             Run the SUT without a visible UI [default: true]
//!   --accept-invalid-certs        Skip TLS certificate validation
//!   --abort-on-stimulus-failure   End the session when a stimulus fails
//!   --config <PATH>               TOML file with the same settings
//! ```
//!
//! # Precedence
//!
//! Command-line flags win over environment variables (`AMP_CHANNEL`,
//! `AMP_NAME`, `AMP_URL`, `AMP_TOKEN`, `AMP_LOG_LEVEL`, `AMP_CONFIG`), which
//! win over the config file, which wins over built-in defaults.  `RUST_LOG`,
//! when set, replaces the log filter derived from `--log-level`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

use amp_adapter::application::{AdapterCore, Handler, ResponseSink};
use amp_adapter::domain::{AdapterConfig, LogLevel, StimulusFailurePolicy};
use amp_adapter::infrastructure::handler::loopback_handler;
use amp_adapter::infrastructure::{load_config, BrokerConnection};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// AMP plugin adapter.
#[derive(Debug, Parser)]
#[command(
    name = "amp-adapter",
    about = "Plugin adapter connecting a system under test to the AMP test broker",
    version
)]
struct Cli {
    /// Broker channel to register on.
    #[arg(long, env = "AMP_CHANNEL")]
    channel: Option<String>,

    /// Adapter name; the session is announced as `<channel>@<name>`.
    #[arg(long, env = "AMP_NAME")]
    name: Option<String>,

    /// Broker WebSocket URL (`ws://` or `wss://`).
    #[arg(long, env = "AMP_URL")]
    url: Option<String>,

    /// Broker auth token, sent as a bearer token.
    #[arg(long, env = "AMP_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Minimum log level.
    #[arg(long, env = "AMP_LOG_LEVEL")]
    log_level: Option<LogLevel>,

    /// Also emit trace logs from the WebSocket library.
    #[arg(long)]
    extra_logs: bool,

    /// Run the SUT headless.
    #[arg(long)]
    headless: Option<bool>,

    /// Skip TLS certificate validation (test brokers only).
    #[arg(long)]
    accept_invalid_certs: bool,

    /// End the session when the SUT fails to execute a stimulus, instead of
    /// confirming it anyway.
    #[arg(long)]
    abort_on_stimulus_failure: bool,

    /// TOML config file.
    #[arg(long, env = "AMP_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Loads the config file (if any), applies the command-line overrides,
    /// and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if a
    /// required setting is missing or invalid after merging.
    fn into_adapter_config(self) -> anyhow::Result<(AdapterConfig, Url)> {
        let base = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => AdapterConfig::default(),
        };
        let config = self.apply_to(base);
        let url = config.validate().context("invalid adapter configuration")?;
        Ok((config, url))
    }

    /// Overrides every field of `config` that was given on the command line.
    fn apply_to(self, mut config: AdapterConfig) -> AdapterConfig {
        if let Some(channel) = self.channel {
            config.channel = channel;
        }
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(url) = self.url {
            config.broker.url = url;
        }
        if let Some(token) = self.token {
            config.broker.token = token;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(headless) = self.headless {
            config.headless = headless;
        }
        config.broker.extra_logs |= self.extra_logs;
        config.broker.accept_invalid_certs |= self.accept_invalid_certs;
        if self.abort_on_stimulus_failure {
            config.stimulus_failure = StimulusFailurePolicy::Abort;
        }
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and merged with the config file.
/// 2. `tracing_subscriber` is initialised from the configured log level
///    (or `RUST_LOG`).
/// 3. The loopback handler, the broker connection, and the adapter core are
///    wired together; the handler gets the response sink, the core gets the
///    handler and the connection's handle.
/// 4. A Ctrl+C listener is spawned that asks the event loop to end the
///    session.
/// 5. [`BrokerConnection::run`] drives the session until it closes.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, url) = cli.into_adapter_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_directives())),
        )
        .init();

    info!(
        "AMP plugin adapter starting as '{}' against {url}",
        config.session_name()
    );

    // ── Wiring ────────────────────────────────────────────────────────────────
    let (sink, sut_events) = ResponseSink::channel();
    let handler: Arc<dyn Handler> = Arc::new(loopback_handler(sink, config.headless));
    let (connection, link) = BrokerConnection::new(url, &config.broker);
    let core = AdapterCore::new(
        config.session_name(),
        handler,
        Arc::new(link),
        config.stimulus_failure,
    );

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, closing the session");
                let _ = shutdown_tx.send(());
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    connection.run(core, sut_events, shutdown_rx).await?;

    info!("AMP plugin adapter stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
