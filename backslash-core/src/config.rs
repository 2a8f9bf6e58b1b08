//! # Configuration Module
//!
//! Handles loading the client configuration from `backslash.toml` and the
//! environment.
//!
//! ## Configuration Loading Flow (block diagram)
//!
//! ```text
//! +-------------------+     +-------------------+     +-------------------+
//! | BACKSLASH_CONFIG  | --> | Path resolution   | --> | backslash.toml    |
//! | (optional)        |     | or default ./     |     |                   |
//! +-------------------+     +-------------------+     +-------------------+
//!                                                              |
//!                                                              v
//! +-------------------+     +-------------------+     +-------------------+
//! | .env + env vars   | --> | BACKSLASH_URL     | --> | Config struct     |
//! |                   |     | BACKSLASH_RUN_... |     | (overrides file)  |
//! +-------------------+     +-------------------+     +-------------------+
//! ```
//!
//! ## Configuration Structure
//!
//! ```toml
//! url = "https://backslash.example.com"
//! run_token = "my-run-token"
//! timeout = "60s"
//! page_size = 100
//!
//! [headers]
//! x-team = "infra"
//!
//! [retry]
//! window = "30s"
//! min_sleep = "3s"
//! max_sleep = "10s"
//!
//! [payload]
//! compress_threshold = 4096
//! max_uncompressed_size = 10485760
//! max_compressed_size = 5242880
//! ```

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::{collections::HashMap, io::Read, path::Path, time::Duration};
use tracing::*;
use url::Url;

use crate::{Error, Result};

/// Environment variable name for specifying the config file path.
const BACKSLASH_CONFIG_ENV: &str = "BACKSLASH_CONFIG";
const BACKSLASH_URL_ENV: &str = "BACKSLASH_URL";
const BACKSLASH_RUN_TOKEN_ENV: &str = "BACKSLASH_RUN_TOKEN";
const BACKSLASH_TIMEOUT_ENV: &str = "BACKSLASH_TIMEOUT";

static CONFIG: Lazy<Config> = Lazy::new(|| {
    let _ = dotenv::dotenv();
    Config::load().unwrap_or_else(|e| {
        error!("{e}; falling back to the default configuration");
        Config::default()
    })
});

/// Process-wide configuration, loaded on first access.
pub fn get_config() -> &'static Config {
    &CONFIG
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Backslash server.
    #[serde(default = "default_url")]
    pub url: String,
    /// Run token sent with every request.
    #[serde(default)]
    pub run_token: Option<String>,
    /// Timeout of a single HTTP attempt.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Page size used by lazy queries.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Additional headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub payload: PayloadConfig,
}

fn default_url() -> String {
    "http://localhost".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_page_size() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Config {
            url: default_url(),
            run_token: None,
            timeout: default_timeout(),
            page_size: default_page_size(),
            headers: HashMap::new(),
            retry: RetryConfig::default(),
            payload: PayloadConfig::default(),
        }
    }
}

impl Config {
    /// Configuration pointing at `url`, everything else defaulted.
    pub fn new(url: impl Into<String>, run_token: Option<String>) -> Config {
        Config {
            url: url.into(),
            run_token,
            ..Default::default()
        }
    }

    /// Load configuration from path.
    fn load_from(path: &Path) -> Result<Config> {
        let Ok(mut file) = std::fs::File::open(path) else {
            let mut cfg = Config::default();
            cfg.load_env()?;
            return Ok(cfg);
        };

        let mut buf = String::new();
        file.read_to_string(&mut buf)
            .map_err(|e| Error::LoadError(e.to_string()))?;

        let mut cfg: Config = toml::from_str(&buf).map_err(|e| {
            Error::LoadError(format!(
                "failed to deserialize backslash.toml into backslash::Config: {e}"
            ))
        })?;

        debug!("backslash.toml was successfully loaded: {cfg:#?}");

        cfg.load_env()?;

        Ok(cfg)
    }

    /// Load configuration.
    ///
    /// Loading order:
    /// 1. If `BACKSLASH_CONFIG` env var is set, load from that path
    /// 2. Otherwise, load from `backslash.toml` in the current directory
    pub fn load() -> Result<Config> {
        match std::env::var(BACKSLASH_CONFIG_ENV) {
            Ok(path) => {
                let path = Path::new(&path);

                if path.extension().is_none_or(|ext| ext != "toml")
                    && !path.to_string_lossy().contains(std::path::MAIN_SEPARATOR)
                    && !path.to_string_lossy().contains('/')
                {
                    return Err(Error::LoadError(format!(
                        "{BACKSLASH_CONFIG_ENV} should be a path to a config file, not a config value. Got: {path:?}"
                    )));
                }

                if !path.exists() {
                    return Err(Error::LoadError(format!(
                        "Config file specified by {BACKSLASH_CONFIG_ENV} not found: {path:?}"
                    )));
                }

                debug!("Loading config from {BACKSLASH_CONFIG_ENV}={path:?}");
                Config::load_from(path)
            }
            Err(_) => Config::load_from(Path::new("backslash.toml")),
        }
    }

    /// Environment variables take precedence over the file.
    fn load_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(BACKSLASH_URL_ENV) {
            self.url = url;
        }
        if let Ok(token) = std::env::var(BACKSLASH_RUN_TOKEN_ENV) {
            self.run_token = Some(token);
        }
        if let Ok(timeout) = std::env::var(BACKSLASH_TIMEOUT_ENV) {
            self.timeout = humantime_serde::re::humantime::parse_duration(&timeout).map_err(|e| {
                Error::LoadError(format!("{BACKSLASH_TIMEOUT_ENV}={timeout:?} is invalid: {e}"))
            })?;
        }
        Ok(())
    }

    /// Server URL, with `http://` assumed when no scheme is given.
    pub fn base_url(&self) -> Result<Url> {
        if self.url.starts_with("http") {
            Ok(Url::parse(&self.url)?)
        } else {
            Ok(Url::parse(&format!("http://{}", self.url))?)
        }
    }

    pub fn run_token(&self) -> Result<&str> {
        self.run_token
            .as_deref()
            .ok_or_else(|| Error::ValueNotFound("run_token".into()))
    }
}

/// Retry window applied to transient failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total time during which failed attempts are retried.
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,
    /// Lower bound of the random sleep between attempts.
    #[serde(default = "default_min_sleep", with = "humantime_serde")]
    pub min_sleep: Duration,
    /// Upper bound (exclusive) of the random sleep between attempts.
    #[serde(default = "default_max_sleep", with = "humantime_serde")]
    pub max_sleep: Duration,
}

fn default_window() -> Duration {
    Duration::from_secs(30)
}

fn default_min_sleep() -> Duration {
    Duration::from_secs(3)
}

fn default_max_sleep() -> Duration {
    Duration::from_secs(10)
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            window: default_window(),
            min_sleep: default_min_sleep(),
            max_sleep: default_max_sleep(),
        }
    }
}

/// Size limits of outgoing call parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PayloadConfig {
    /// Encoded JSON longer than this is gzip-compressed.
    #[serde(default = "default_compress_threshold")]
    pub compress_threshold: usize,
    /// Upper bound of the estimated in-memory size of the parameters.
    #[serde(default = "default_max_uncompressed_size")]
    pub max_uncompressed_size: usize,
    /// Upper bound of the body actually sent.
    #[serde(default = "default_max_compressed_size")]
    pub max_compressed_size: usize,
}

fn default_compress_threshold() -> usize {
    4 * 1024
}

fn default_max_uncompressed_size() -> usize {
    10 * 1024 * 1024
}

fn default_max_compressed_size() -> usize {
    5 * 1024 * 1024
}

impl Default for PayloadConfig {
    fn default() -> Self {
        PayloadConfig {
            compress_threshold: default_compress_threshold(),
            max_uncompressed_size: default_max_uncompressed_size(),
            max_compressed_size: default_max_compressed_size(),
        }
    }
}
