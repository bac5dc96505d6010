//! Client configuration.
//!
//! Set once before the client is built. Values come from code, from a TOML
//! file, or from `REPORTING_*` environment variables, in that order of
//! increasing precedence when `ClientConfig::load` is used.

use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MIN_TIMEOUT_SECS: u64 = 10;
pub const MAX_TIMEOUT_SECS: u64 = 300;

pub const ENV_CONFIG_PATH: &str = "REPORTING_CONFIG";
pub const ENV_BASE_URL: &str = "REPORTING_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "REPORTING_TIMEOUT_SECS";
pub const ENV_SSL_VERIFY: &str = "REPORTING_SSL_VERIFY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no base address configured (set `base_url` or REPORTING_BASE_URL)")]
    MissingBaseUrl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root address of the reporting engine, e.g. `https://reports:40263`.
    pub base_url: String,
    /// Requested timeout; the effective value is `timeout()`.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// When false, any certificate is accepted.
    #[serde(default = "default_ssl_verify")]
    pub ssl_verify: bool,
    /// Host URI to expected certificate thumbprint. Consulted only when
    /// standard chain validation fails.
    #[serde(default)]
    pub thumbprints: BTreeMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_ssl_verify() -> bool {
    true
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            ssl_verify: true,
            thumbprints: BTreeMap::new(),
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_ssl_verify(mut self, verify: bool) -> Self {
        self.ssl_verify = verify;
        self
    }

    pub fn with_thumbprint(mut self, host_uri: impl Into<String>, thumbprint: impl Into<String>) -> Self {
        self.thumbprints.insert(host_uri.into(), thumbprint.into());
        self
    }

    /// Effective request timeout, clamped to [10, 300] seconds.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(clamp_timeout(self.timeout_secs))
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Loads configuration: the file at `path` (or at `$REPORTING_CONFIG`)
    /// when present, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from),
        };

        let mut cfg = Self::new(String::new());
        if let Some(p) = file.filter(|p| p.exists()) {
            let s = fs::read_to_string(&p).map_err(|source| ConfigError::Read { path: p.clone(), source })?;
            cfg = Self::from_toml_str(&s)?;
            tracing::debug!(path = %p.display(), "loaded client config file");
        }
        cfg.apply_overrides(|key| env::var(key).ok());

        if cfg.base_url.trim().is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        Ok(cfg)
    }

    /// Applies `REPORTING_*` overrides looked up through `lookup`.
    /// Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(v) = lookup(ENV_TIMEOUT_SECS) {
            match v.trim().parse::<u64>() {
                Ok(n) => self.timeout_secs = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid REPORTING_TIMEOUT_SECS"),
            }
        }
        if let Some(v) = lookup(ENV_SSL_VERIFY) {
            match parse_flag(&v) {
                Some(flag) => self.ssl_verify = flag,
                None => tracing::warn!(value = %v, "ignoring invalid REPORTING_SSL_VERIFY"),
            }
        }
    }
}

/// Accepts `true`/`false`/`1`/`0`, case-insensitive, surrounding whitespace ignored.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

pub fn clamp_timeout(secs: u64) -> u64 {
    secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
}
