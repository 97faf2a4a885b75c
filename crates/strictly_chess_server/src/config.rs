//! Server configuration.
//!
//! Loaded from a TOML file when one exists, then overridden by
//! `STRICTLY_CHESS_*` environment variables, then by command-line flags.

use crate::error::ConfigError;
use derive_getters::Getters;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "STRICTLY_CHESS_";

/// Which [`crate::StateStore`] backs the server.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StoreKind {
    /// In-process map; state is lost on exit.
    Memory,
    /// SQLite file shared by every process pointing at it.
    Sqlite,
}

/// Server and synchronization settings.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    host: String,
    /// Port to bind.
    port: u16,
    /// Store backend.
    store: StoreKind,
    /// SQLite file, used when `store = "sqlite"`.
    db_path: String,
    /// Shortest refresh interval for pollers.
    poll_min_ms: u64,
    /// Longest refresh interval for pollers.
    poll_max_ms: u64,
    /// Re-validations of a move after losing a version race.
    max_conflict_retries: u32,
    /// Upper bound on a long-poll wait.
    long_poll_timeout_ms: u64,
}

#[instrument]
fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 3000,
            store: StoreKind::Memory,
            db_path: "strictly_chess.db".to_string(),
            poll_min_ms: 500,
            poll_max_ms: 5000,
            max_conflict_retries: 3,
            long_poll_timeout_ms: 25_000,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!(host = %config.host, port = config.port, store = %config.store, "Config loaded");
        Ok(config)
    }

    /// File if present, defaults otherwise; then environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unreadable file or a malformed override.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let base = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            debug!("No config file, using defaults");
            Self::default()
        };
        base.apply_env(|key| std::env::var(key).ok())
    }

    /// Applies `STRICTLY_CHESS_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a numeric or enum override does not parse.
    #[instrument(skip(self, lookup))]
    pub fn apply_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(host) = var("HOST") {
            self.host = host;
        }
        if let Some(db_path) = var("DB_PATH") {
            self.db_path = db_path;
        }
        override_parsed(&mut self.port, "PORT", var("PORT"))?;
        override_parsed(&mut self.store, "STORE", var("STORE"))?;
        override_parsed(&mut self.poll_min_ms, "POLL_MIN_MS", var("POLL_MIN_MS"))?;
        override_parsed(&mut self.poll_max_ms, "POLL_MAX_MS", var("POLL_MAX_MS"))?;
        override_parsed(
            &mut self.max_conflict_retries,
            "MAX_CONFLICT_RETRIES",
            var("MAX_CONFLICT_RETRIES"),
        )?;
        override_parsed(
            &mut self.long_poll_timeout_ms,
            "LONG_POLL_TIMEOUT_MS",
            var("LONG_POLL_TIMEOUT_MS"),
        )?;
        Ok(self)
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Shortest poll interval.
    pub fn poll_min(&self) -> Duration {
        Duration::from_millis(self.poll_min_ms)
    }

    /// Longest poll interval.
    pub fn poll_max(&self) -> Duration {
        Duration::from_millis(self.poll_max_ms)
    }

    /// Long-poll cap.
    pub fn long_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.long_poll_timeout_ms)
    }
}

fn override_parsed<T>(
    field: &mut T,
    name: &str,
    value: Option<String>,
) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = value {
        *field = raw.parse().map_err(|e| {
            ConfigError::new(format!("Invalid {}{} '{}': {}", ENV_PREFIX, name, raw, e))
        })?;
    }
    Ok(())
}
