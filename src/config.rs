//! Configuration management for Throttle.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! `THROTTLE_*` environment variables (nested keys separated by `__`, for
//! example `THROTTLE_RATE_LIMITING__RATE=100`).

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, ThrottleError};

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "THROTTLE";

/// Main configuration for the Throttle service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3002))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum requests allowed per client within one window
    #[serde(default = "default_rate")]
    pub rate: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often idle clients are swept from memory, in seconds
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            window_secs: default_window_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_rate() -> u64 {
    60
}

fn default_window_secs() -> u64 {
    60
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

impl RateLimitingConfig {
    /// The limiter window as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// The sweeper interval as a `Duration`.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl ThrottleConfig {
    /// Load configuration from defaults, an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = defaults()?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        finish(builder)
    }

    /// Load configuration from a file path, without environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        finish(defaults()?.add_source(File::from(path).format(FileFormat::Yaml)))
    }

    /// Parse configuration from a YAML document layered over the defaults.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        finish(defaults()?.add_source(File::from_str(contents, FileFormat::Yaml)))
    }

    /// Render the effective configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ThrottleError::Config(e.to_string()))
    }

    /// Reject settings the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;
        if rl.rate == 0 {
            return Err(ThrottleError::Config(
                "rate_limiting.rate must be greater than zero".to_string(),
            ));
        }
        if rl.window_secs == 0 {
            return Err(ThrottleError::Config(
                "rate_limiting.window_secs must be greater than zero".to_string(),
            ));
        }
        if rl.cleanup_interval_secs == 0 {
            return Err(ThrottleError::Config(
                "rate_limiting.cleanup_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder().add_source(Config::try_from(&ThrottleConfig::default())?))
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<ThrottleConfig> {
    let config: ThrottleConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
