//! TOML config file loading.
//!
//! The file is optional and only read when `--config <path>` is given; an
//! explicitly named file that does not exist is an error rather than a
//! silent fallback to defaults.

use std::path::Path;

use crate::domain::{AdapterConfig, ConfigError};

/// Loads an [`AdapterConfig`] from `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AdapterConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    AdapterConfig::from_toml_str(&content)
}
