//! Runtime configuration.
//!
//! Values come from an optional `offer_sync.toml` and `OFFER_SYNC__*`
//! environment variables (double underscore separates nesting, e.g.
//! `OFFER_SYNC__GEOCODE__API_KEY`). Anything absent takes its default.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("config error: {0}")]
pub struct ConfigError(#[from] config::ConfigError);

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub geocode: GeocodeConfig,
}

impl SyncConfig {
    /// Load from `offer_sync.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("offer_sync")
    }

    /// Load from the named config file (extension inferred) and the environment.
    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix("OFFER_SYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        debug!(channel = ?config.channel, endpoint = %config.geocode.endpoint, "configuration loaded");
        Ok(config)
    }
}

/// Sync Channel connection policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    /// Delay before the single retry of a failed subscribe.
    #[serde(default = "defaults::retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Retries before a subscribe failure is surfaced. Bounded; 1 by default.
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,
    /// Result cap applied to queries that set none.
    #[serde(default = "defaults::max_results")]
    pub max_results: usize,
}

impl ChannelConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: defaults::retry_delay_ms(),
            max_retries: defaults::max_retries(),
            max_results: defaults::max_results(),
        }
    }
}

/// Geocoding provider settings.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct GeocodeConfig {
    #[serde(default = "defaults::geocode_endpoint")]
    pub endpoint: String,
    /// Pre-shared provider credential.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Concurrent provider calls allowed (provider rate limit).
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,
}

impl GeocodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::geocode_endpoint(),
            api_key: None,
            max_concurrent: defaults::max_concurrent(),
            timeout_ms: defaults::timeout_ms(),
        }
    }
}

// Keep the credential out of logs.
impl std::fmt::Debug for GeocodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodeConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_concurrent", &self.max_concurrent)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

mod defaults {
    pub fn retry_delay_ms() -> u64 {
        500
    }

    pub fn max_retries() -> u32 {
        1
    }

    pub fn max_results() -> usize {
        200
    }

    pub fn geocode_endpoint() -> String {
        "https://maps.googleapis.com/maps/api/geocode/json".into()
    }

    pub fn max_concurrent() -> usize {
        4
    }

    pub fn timeout_ms() -> u64 {
        10_000
    }
}
