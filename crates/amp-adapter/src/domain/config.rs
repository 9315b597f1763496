//! Adapter configuration types.
//!
//! [`AdapterConfig`] is the single source of truth for all runtime settings.
//! It is deserialised from an optional TOML file, then overridden field by
//! field from the command line (see `main.rs`).
//!
//! ```toml
//! channel = "web"
//! name = "shop-checkout"
//! log_level = "debug"
//! stimulus_failure = "abort"
//!
//! [broker]
//! url = "wss://broker.example.test/api/adapter"
//! token = "..."
//! accept_invalid_certs = false
//! ```
//!
//! Every field has a serde default, so a partial file (or none at all) is
//! valid input.  [`AdapterConfig::validate`] is what enforces the required
//! fields once all sources have been merged.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Error type for loading and validating the adapter configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required setting is empty after merging file and command line.
    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    /// The broker URL is not a usable WebSocket URL.
    #[error("invalid broker url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

// ── Log level ─────────────────────────────────────────────────────────────────

/// Minimum severity written to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[serde(alias = "warning")]
    Warn,
    #[default]
    Info,
    Debug,
    #[serde(alias = "all")]
    Trace,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log level '{0}' (expected error, warn, info, debug, trace or 1, 2, 3, 4, 8, 15)")]
pub struct UnknownLogLevel(String);

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    /// Accepts level names as well as the numeric masks used by older adapter
    /// launch scripts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" | "1" => Ok(Self::Error),
            "warn" | "warning" | "2" => Ok(Self::Warn),
            "info" | "3" | "4" => Ok(Self::Info),
            "debug" | "8" => Ok(Self::Debug),
            "trace" | "all" | "15" => Ok(Self::Trace),
            _ => Err(UnknownLogLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(name)
    }
}

// ── Stimulus failure policy ───────────────────────────────────────────────────

/// What the adapter does when the handler fails to execute a stimulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StimulusFailurePolicy {
    /// Log the failure and still send the stimulus confirmation.
    #[default]
    Confirm,
    /// Report the failure to the broker and end the session.
    Abort,
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdapterConfig {
    /// Broker channel the adapter registers on.
    #[serde(default)]
    pub channel: String,
    /// Adapter name within the channel.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub log_level: LogLevel,
    /// Whether the SUT runs without a visible UI.
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default)]
    pub stimulus_failure: StimulusFailurePolicy,
    #[serde(default)]
    pub broker: BrokerConfig,
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BrokerConfig {
    /// `ws://` or `wss://` endpoint of the broker.
    #[serde(default)]
    pub url: String,
    /// Sent as `Authorization: Bearer <token>`.
    #[serde(default)]
    pub token: String,
    /// Skip TLS certificate validation.  Only for test brokers.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Also emit trace-level logs from the WebSocket library.
    #[serde(default)]
    pub extra_logs: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            name: String::new(),
            log_level: LogLevel::default(),
            headless: default_true(),
            stimulus_failure: StimulusFailurePolicy::default(),
            broker: BrokerConfig::default(),
        }
    }
}

impl AdapterConfig {
    /// Parses a TOML document; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the TOML is malformed.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Name the adapter announces itself with: `<channel>@<name>`.
    pub fn session_name(&self) -> String {
        format!("{}@{}", self.channel, self.name)
    }

    /// `tracing_subscriber::EnvFilter` directives for this configuration.
    pub fn log_directives(&self) -> String {
        let mut directives = self.log_level.to_string();
        if self.broker.extra_logs {
            directives.push_str(",tungstenite=trace,tokio_tungstenite=trace");
        }
        directives
    }

    /// Checks that every required setting is present and returns the parsed
    /// broker URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for an empty channel, name, url or
    /// token, and [`ConfigError::InvalidUrl`] if the URL does not parse or its
    /// scheme is not `ws`/`wss`.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        if self.channel.trim().is_empty() {
            return Err(ConfigError::Missing("channel"));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::Missing("name"));
        }
        if self.broker.url.trim().is_empty() {
            return Err(ConfigError::Missing("url"));
        }
        if self.broker.token.is_empty() {
            return Err(ConfigError::Missing("token"));
        }

        let url = Url::parse(&self.broker.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.broker.url.clone(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConfigError::InvalidUrl {
                url: self.broker.url.clone(),
                reason: format!("unsupported scheme '{other}', expected ws or wss"),
            }),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AdapterConfig {
        AdapterConfig {
            channel: "web".into(),
            name: "shop".into(),
            broker: BrokerConfig {
                url: "wss://broker.example.test/api".into(),
                token: "secret".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_toml_gives_defaults() {
        // Arrange / Act
        let cfg = AdapterConfig::from_toml_str("").unwrap();

        // Assert
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert!(cfg.headless);
        assert_eq!(cfg.stimulus_failure, StimulusFailurePolicy::Confirm);
        assert!(!cfg.broker.accept_invalid_certs);
        assert!(!cfg.broker.extra_logs);
    }

    #[test]
    fn test_full_toml_is_parsed() {
        let toml = r#"
            channel = "web"
            name = "shop"
            log_level = "warning"
            headless = false
            stimulus_failure = "abort"

            [broker]
            url = "ws://localhost:9000"
            token = "t0k3n"
            accept_invalid_certs = true
            extra_logs = true
        "#;

        let cfg = AdapterConfig::from_toml_str(toml).unwrap();

        assert_eq!(cfg.session_name(), "web@shop");
        assert_eq!(cfg.log_level, LogLevel::Warn);
        assert!(!cfg.headless);
        assert_eq!(cfg.stimulus_failure, StimulusFailurePolicy::Abort);
        assert_eq!(cfg.broker.token, "t0k3n");
        assert!(cfg.broker.accept_invalid_certs);
    }

    #[test]
    fn test_malformed_toml_returns_parse_error() {
        let result = AdapterConfig::from_toml_str("log_level = [");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let cfg = valid_config();

        let text = toml::to_string_pretty(&cfg).expect("serialize");
        let restored = AdapterConfig::from_toml_str(&text).unwrap();

        assert_eq!(cfg, restored);
    }

    // ── Log level ─────────────────────────────────────────────────────────────

    #[test]
    fn test_log_level_accepts_names_and_masks() {
        let cases = [
            ("error", LogLevel::Error),
            ("1", LogLevel::Error),
            ("WARNING", LogLevel::Warn),
            ("2", LogLevel::Warn),
            ("info", LogLevel::Info),
            ("4", LogLevel::Info),
            ("8", LogLevel::Debug),
            ("15", LogLevel::Trace),
            ("all", LogLevel::Trace),
        ];
        for (input, expected) in cases {
            assert_eq!(input.parse::<LogLevel>(), Ok(expected), "input {input}");
        }
    }

    #[test]
    fn test_log_level_rejects_unknown() {
        assert!("verbose".parse::<LogLevel>().is_err());
        assert!("7".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_directives_add_transport_tracing_when_requested() {
        let mut cfg = valid_config();
        cfg.log_level = LogLevel::Debug;
        assert_eq!(cfg.log_directives(), "debug");

        cfg.broker.extra_logs = true;
        assert_eq!(
            cfg.log_directives(),
            "debug,tungstenite=trace,tokio_tungstenite=trace"
        );
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn test_validate_accepts_wss_url() {
        let url = valid_config().validate().unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.host_str(), Some("broker.example.test"));
    }

    #[test]
    fn test_validate_rejects_http_scheme() {
        let mut cfg = valid_config();
        cfg.broker.url = "https://broker.example.test".into();

        let result = cfg.validate();

        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_validate_rejects_unparseable_url() {
        let mut cfg = valid_config();
        cfg.broker.url = "not a url".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_validate_reports_first_missing_setting() {
        let mut cfg = valid_config();
        cfg.broker.token.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::Missing("token"))));

        cfg.name.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::Missing("name"))));
    }
}
