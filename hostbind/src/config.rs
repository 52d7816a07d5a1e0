//! Dispatcher configuration
//!
//! Settings come from defaults, a TOML document, or `HOSTBIND_*` environment
//! variables. Environment values that fail to parse are ignored and the
//! default is kept.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::canonical::{DEFAULT_COMPACTION_INTERVAL, DEFAULT_COMPACTION_THRESHOLD};

/// Default cap on the number of parameters a synthesized delegate may have.
pub const DEFAULT_MAX_DELEGATE_ARITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-type canonical table size at which compaction becomes eligible
    pub compaction_threshold: usize,
    /// Minimum seconds between two compactions of one per-type table
    pub compaction_interval_secs: u64,
    /// Retry failed instance lookups against registered extension members
    pub extension_fallback: bool,
    /// Canonicalize enum and immutable struct results before returning them
    pub canonicalize_results: bool,
    pub max_delegate_arity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            compaction_interval_secs: DEFAULT_COMPACTION_INTERVAL.as_secs(),
            extension_fallback: true,
            canonicalize_results: false,
            max_delegate_arity: DEFAULT_MAX_DELEGATE_ARITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
    #[error("invalid dispatcher config: {0}")]
    Parse(String),
}

impl DispatchConfig {
    pub fn compaction_interval(&self) -> Duration {
        Duration::from_secs(self.compaction_interval_secs)
    }

    /// Defaults overridden by any `HOSTBIND_*` variables that are set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("HOSTBIND_COMPACTION_THRESHOLD") {
            config.compaction_threshold = v;
        }
        if let Some(v) = env_parse("HOSTBIND_COMPACTION_INTERVAL_SECS") {
            config.compaction_interval_secs = v;
        }
        if let Some(v) = env_flag("HOSTBIND_EXTENSION_FALLBACK") {
            config.extension_fallback = v;
        }
        if let Some(v) = env_flag("HOSTBIND_CANONICALIZE_RESULTS") {
            config.canonicalize_results = v;
        }
        if let Some(v) = env_parse("HOSTBIND_MAX_DELEGATE_ARITY") {
            config.max_delegate_arity = v;
        }
        config
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&source)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    let val = env::var(key).ok()?;
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
