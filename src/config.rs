// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables by the deployment (Cloud Run
//! secret bindings) and read once at startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default period between scheduled sync runs.
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 30;
/// Hard ceiling for one scheduled sync run.
pub const DEFAULT_SYNC_RUN_TIMEOUT_MINUTES: u64 = 10;
/// Pause between two users inside one sync run.
pub const DEFAULT_USER_DELAY_SECS: u64 = 2;
/// Per-call timeout for trophy API fetches.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
/// Upper bound for the sync interval and run ceiling.
pub const MAX_SYNC_PERIOD_MINUTES: u64 = 7 * 24 * 60;
/// Number of recently earned trophies requested per user.
pub const DEFAULT_FETCH_LIMIT: u32 = 50;

/// Which credentials a trophy check needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceMode {
    /// Every user must have linked their own credential bundle.
    Authenticated,
    /// Users without a bundle are checked with the shared public token.
    Public,
}

impl FromStr for DataSourceMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "authenticated" | "auth" => Ok(Self::Authenticated),
            "public" => Ok(Self::Public),
            _ => Err(ConfigError::Invalid("DATA_SOURCE_MODE")),
        }
    }
}

/// Persistence backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local store; state is lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND")),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// GCP project ID
    pub gcp_project_id: String,
    /// GCP region (KMS key location)
    pub gcp_region: String,
    /// Server port
    pub port: u16,
    /// Persistence backend
    pub store_backend: StoreBackend,
    /// Whether checks require per-user credentials
    pub data_source_mode: DataSourceMode,

    // --- Sync tuning ---
    pub sync_interval: Duration,
    pub sync_run_timeout: Duration,
    pub user_delay: Duration,
    pub fetch_timeout: Duration,
    pub fetch_limit: u32,

    // --- Secrets ---
    /// Discord bot token used for channel lookups and message sends
    pub discord_bot_token: String,
    /// HMAC key shared with the command gateway (raw bytes)
    pub command_signing_key: Vec<u8>,
    /// Basic auth value for the PSN OAuth client
    pub psn_client_auth: String,
    /// Shared token used for public-mode checks
    pub psn_public_token: Option<String>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            data_source_mode: DataSourceMode::Authenticated,
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_MINUTES * 60),
            sync_run_timeout: Duration::from_secs(DEFAULT_SYNC_RUN_TIMEOUT_MINUTES * 60),
            user_delay: Duration::from_secs(DEFAULT_USER_DELAY_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            discord_bot_token: "test_bot_token".to_string(),
            command_signing_key: b"test_signing_key_32_bytes_min!!!".to_vec(),
            psn_client_auth: "test_client_auth".to_string(),
            psn_public_token: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honoured for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-west1".to_string()),
            port: parse_or("PORT", 8080)?,
            store_backend: parse_or("STORE_BACKEND", StoreBackend::Firestore)?,
            data_source_mode: parse_or("DATA_SOURCE_MODE", DataSourceMode::Authenticated)?,

            sync_interval: parse_minutes("SYNC_INTERVAL_MINUTES", DEFAULT_SYNC_INTERVAL_MINUTES)?,
            sync_run_timeout: parse_minutes(
                "SYNC_RUN_TIMEOUT_MINUTES",
                DEFAULT_SYNC_RUN_TIMEOUT_MINUTES,
            )?,
            user_delay: Duration::from_secs(parse_or(
                "SYNC_USER_DELAY_SECS",
                DEFAULT_USER_DELAY_SECS,
            )?),
            fetch_timeout: nonzero_secs(
                "FETCH_TIMEOUT_SECS",
                parse_or("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?,
            )?,
            fetch_limit: parse_or("FETCH_LIMIT", DEFAULT_FETCH_LIMIT)?,

            discord_bot_token: required("DISCORD_BOT_TOKEN")?,
            command_signing_key: required("COMMAND_SIGNING_KEY")?.into_bytes(),
            psn_client_auth: required("PSN_CLIENT_AUTH")?,
            psn_public_token: env::var("PSN_PUBLIC_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }
}

/// Read a required secret, trimming stray whitespace from secret bindings.
fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(key))
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Parse a whole-minute period that must be non-zero and at most a week.
fn parse_minutes(key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    minutes_in_range(key, parse_or(key, default)?)
}

fn minutes_in_range(key: &'static str, minutes: u64) -> Result<Duration, ConfigError> {
    if minutes == 0 || minutes > MAX_SYNC_PERIOD_MINUTES {
        return Err(ConfigError::Invalid(key));
    }
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or(ConfigError::Invalid(key))
}

fn nonzero_secs(key: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid(key));
    }
    Ok(Duration::from_secs(secs))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
