//! Configuration management for the chat relay.
//!
//! The relay reads a single JSON file, by default `~/.chat-relay/config.json`.
//! `RELAY_CONFIG` points at an alternative file.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Server
//! - `RELAY_HOST` → server.host
//! - `RELAY_PORT` → server.port
//!
//! ## Store
//! - `RELAY_STORE_BACKEND` → store.backend
//! - `REDIS_HOST` → store.host
//! - `REDIS_PORT` → store.port
//! - `REDIS_PASSWORD` → store.password
//! - `REDIS_DB` → store.database
//!
//! ## Upstream
//! - `RELAY_UPSTREAM_URL` → upstream.url
//! - `RELAY_UPSTREAM_TOKEN` (or `JWT_TOKEN`) → upstream.token
//! - `RELAY_MODEL` → upstream.model
//! - `RELAY_UPSTREAM_TIMEOUT_SECS` → upstream.timeout_secs
//!
//! ## Purge / Observability
//! - `RELAY_PURGE_INTERVAL_SECS` → purge.interval_secs
//! - `RELAY_LOG_LEVEL` → observability.log_level
//! - `RELAY_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".chat-relay"),
        |dirs| dirs.home_dir().join(".chat-relay"),
    )
}

/// Get the configuration file path.
///
/// `RELAY_CONFIG` wins over the default location.
pub fn config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Server
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default "127.0.0.1" (local only).
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

// ============================================================================
// Store
// ============================================================================

/// Session store configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend type (redis, memory)
    #[serde(default = "default_store_backend")]
    pub backend: String,

    #[serde(default = "default_redis_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    #[serde(default)]
    pub password: Option<String>,

    /// Logical Redis database index
    #[serde(default)]
    pub database: i64,
}

impl StoreConfig {
    /// Password to authenticate with, treating an empty string as none.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            database: 0,
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}

fn default_store_backend() -> String {
    "redis".into()
}

fn default_redis_host() -> String {
    "127.0.0.1".into()
}

fn default_redis_port() -> u16 {
    6379
}

// ============================================================================
// Upstream
// ============================================================================

/// Upstream completion API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Full URL of the chat completions endpoint.
    #[serde(default = "default_upstream_url")]
    pub url: String,

    /// Bearer token sent in the `Authorization` header.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            token: None,
            model: default_model(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_upstream_url() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_upstream_timeout() -> u64 {
    30
}

// ============================================================================
// Purge
// ============================================================================

/// Session purge schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeConfig {
    /// Seconds between blanket purges of the session store
    #[serde(default = "default_purge_interval")]
    pub interval_secs: u64,
}

impl PurgeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_purge_interval(),
        }
    }
}

fn default_purge_interval() -> u64 {
    3600
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure for the relay.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub purge: PurgeConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// A missing file yields defaults.
    ///
    /// Runs before logging is initialized, so it does not log; callers report
    /// which file was used once a subscriber is installed.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// A numeric variable that does not parse is an error, not a fallback to
    /// the file or default value.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("RELAY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_var(&lookup, "RELAY_PORT")? {
            self.server.port = port;
        }

        if let Some(backend) = lookup("RELAY_STORE_BACKEND") {
            self.store.backend = backend;
        }
        if let Some(host) = lookup("REDIS_HOST") {
            self.store.host = host;
        }
        if let Some(port) = parse_var(&lookup, "REDIS_PORT")? {
            self.store.port = port;
        }
        if let Some(password) = lookup("REDIS_PASSWORD") {
            self.store.password = Some(password);
        }
        if let Some(db) = parse_var(&lookup, "REDIS_DB")? {
            self.store.database = db;
        }

        if let Some(url) = lookup("RELAY_UPSTREAM_URL") {
            self.upstream.url = url;
        }
        if let Some(token) = lookup("RELAY_UPSTREAM_TOKEN").or_else(|| lookup("JWT_TOKEN")) {
            self.upstream.token = Some(token);
        }
        if let Some(model) = lookup("RELAY_MODEL") {
            self.upstream.model = model;
        }
        if let Some(secs) = parse_var(&lookup, "RELAY_UPSTREAM_TIMEOUT_SECS")? {
            self.upstream.timeout_secs = secs;
        }

        if let Some(secs) = parse_var(&lookup, "RELAY_PURGE_INTERVAL_SECS")? {
            self.purge.interval_secs = secs;
        }

        if let Some(level) = lookup("RELAY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("RELAY_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        Ok(())
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e| anyhow::anyhow!("Invalid value '{}' for {}: {}", raw, key, e))
}
