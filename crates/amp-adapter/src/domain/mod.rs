//! Domain layer for amp-adapter.
//!
//! Pure configuration types with no dependencies on I/O, networking, or the
//! async runtime.  The infrastructure layer fills them in from the TOML file
//! and the command line; everything else only reads them.

pub mod config;

pub use config::{AdapterConfig, BrokerConfig, ConfigError, LogLevel, StimulusFailurePolicy};
