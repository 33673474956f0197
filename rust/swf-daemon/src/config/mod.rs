//! Configuration management for the workflow daemon.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. An optional config file (`config/swf-daemon.{toml,yaml,json}` or an
//!    explicit path)
//! 3. `SWF__`-prefixed environment variables, `__` separating sections
//!    (`SWF__ENGINE__POLL_TIMEOUT_SECS=20`)
//!
//! ```rust,ignore
//! use swf_daemon::config::{AppConfig, ConfigValidator};
//!
//! let config = AppConfig::load(None)?;
//! ConfigValidator::validate(&config)?;
//! ```

pub mod seeds;
pub mod error;
pub mod validator;

pub use seeds::{ActivityTypeSeed, BootstrapConfig, DomainSeed, WorkflowTypeSeed};
pub use error::{ConfigResult, ConfigurationError};
pub use validator::ConfigValidator;

use serde::{Deserialize, Serialize};
use swf_engine::config::EngineConfig;

/// Environment prefix for overrides.
pub const ENV_PREFIX: &str = "SWF";

/// Default config file, looked up relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config/swf-daemon";

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Engine tunables (poll timeout, history page size, sweep interval).
    #[serde(default)]
    pub engine: EngineConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Domains and types registered at startup.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    /// Load and validate configuration.
    ///
    /// `path` replaces the default config file; unlike the default it must
    /// exist.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let config = Self::load_unchecked(path)?;
        ConfigValidator::validate(&config)
            .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n\n{e}"))?;
        Ok(config)
    }

    /// Load configuration without validation.
    pub fn load_unchecked(path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let file = match path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = config::Config::builder()
            .set_default("logging.level", default_log_level())?
            .set_default("logging.json", false)?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
