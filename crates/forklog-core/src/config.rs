//! Engine configuration.
//!
//! Loaded from a JSON document shipped with the host app, or from `FORKLOG_*`
//! environment variables for embedding in tools and tests.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

const ENV_DB_PATH: &str = "FORKLOG_DB_PATH";
const ENV_LEDGER_URL: &str = "FORKLOG_LEDGER_URL";
const ENV_LEDGER_TIMEOUT_SECS: &str = "FORKLOG_LEDGER_TIMEOUT_SECS";

const DEFAULT_LEDGER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_INFERENCE_LIMIT: u32 = 20;
const DEFAULT_INFERENCE_WINDOW_SECS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Local entry database file.
    pub database_path: PathBuf,
    /// Hosted ledger API base URL; `None` keeps the engine local-only.
    #[serde(default)]
    pub ledger_base_url: Option<String>,
    #[serde(default = "default_ledger_timeout_secs")]
    pub ledger_timeout_secs: u64,
    /// Inference calls allowed per account within one window.
    #[serde(default = "default_inference_limit")]
    pub inference_limit_per_window: u32,
    #[serde(default = "default_inference_window_secs")]
    pub inference_window_secs: u64,
}

const fn default_ledger_timeout_secs() -> u64 {
    DEFAULT_LEDGER_TIMEOUT_SECS
}

const fn default_inference_limit() -> u32 {
    DEFAULT_INFERENCE_LIMIT
}

const fn default_inference_window_secs() -> u64 {
    DEFAULT_INFERENCE_WINDOW_SECS
}

impl EngineConfig {
    /// Local-only configuration with defaults for everything else.
    pub fn local(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ledger_base_url: None,
            ledger_timeout_secs: DEFAULT_LEDGER_TIMEOUT_SECS,
            inference_limit_per_window: DEFAULT_INFERENCE_LIMIT,
            inference_window_secs: DEFAULT_INFERENCE_WINDOW_SECS,
        }
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid engine config JSON: {error}")))?;
        config.validated()
    }

    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no variables are set and an error when only a
    /// partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    #[must_use]
    pub const fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_timeout_secs)
    }

    #[must_use]
    pub const fn inference_window(&self) -> Duration {
        Duration::from_secs(self.inference_window_secs)
    }

    fn validated(mut self) -> Result<Self> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("database_path must not be empty".to_string()));
        }
        if self.ledger_timeout_secs == 0 {
            return Err(Error::Config(
                "ledger_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.inference_window_secs == 0 {
            return Err(Error::Config(
                "inference_window_secs must be greater than zero".to_string(),
            ));
        }
        self.ledger_base_url = match normalize_text_option(self.ledger_base_url) {
            Some(url) if is_http_url(&url) => Some(url.trim_end_matches('/').to_string()),
            Some(_) => {
                return Err(Error::Config(
                    "ledger_base_url must include http:// or https://".to_string(),
                ))
            }
            None => None,
        };
        Ok(self)
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<EngineConfig>> {
    let database_path = normalize_text_option(lookup(ENV_DB_PATH));
    let ledger_base_url = normalize_text_option(lookup(ENV_LEDGER_URL));
    let ledger_timeout = normalize_text_option(lookup(ENV_LEDGER_TIMEOUT_SECS));

    if database_path.is_none() && ledger_base_url.is_none() && ledger_timeout.is_none() {
        return Ok(None);
    }

    let Some(database_path) = database_path else {
        return Err(Error::Config(format!(
            "engine configuration is incomplete. Missing: {ENV_DB_PATH}"
        )));
    };
    if ledger_timeout.is_some() && ledger_base_url.is_none() {
        return Err(Error::Config(format!(
            "{ENV_LEDGER_TIMEOUT_SECS} is set but {ENV_LEDGER_URL} is missing"
        )));
    }

    let ledger_timeout_secs = match ledger_timeout {
        Some(raw) => raw.parse::<u64>().map_err(|error| {
            Error::Config(format!(
                "{ENV_LEDGER_TIMEOUT_SECS} must be a whole number of seconds: {error}"
            ))
        })?,
        None => DEFAULT_LEDGER_TIMEOUT_SECS,
    };

    EngineConfig {
        ledger_base_url,
        ledger_timeout_secs,
        ..EngineConfig::local(database_path)
    }
    .validated()
    .map(Some)
}
